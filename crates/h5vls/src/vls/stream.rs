//! Sequential decoding of a 1-dimensional VLS array, one block of
//! pointers at a time.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::ReadOptions;
use crate::reader::get_1d_length;

use super::open::{Heap, PointerArray};
use super::pointer::{pointer_in_range, Pointer};

/// Cursor over the strings of a VLS array.
///
/// `next` and `jump` only move the cursor; the block holding the current
/// string is loaded by `get` or `steal`.
pub trait StringStream {
    /// Total number of strings.
    fn length(&self) -> u64;

    /// Index of the current string.
    fn position(&self) -> u64;

    /// The current string, loading its block if needed.
    fn get(&mut self) -> Result<&str>;

    /// Move the current string out of the buffer. Stealing twice without
    /// advancing yields an empty string.
    fn steal(&mut self) -> Result<String>;

    fn next(&mut self) {
        self.jump(1);
    }

    fn jump(&mut self, n: u64);
}

/// State shared by both stream flavours.
#[derive(Debug)]
struct Core {
    pointers: PointerArray,
    heap: Heap,
    length: u64,
    block_size: u64,
    consumed: u64,
    available: u64,
    last_loaded: u64,
    buffer: Vec<Option<String>>,
}

impl Core {
    fn new(pointers: PointerArray, heap: Heap, length: u64, budget: u64) -> Core {
        let block_size = pointers.dataset().block_size_for_length(length, budget).max(1);
        Core {
            pointers,
            heap,
            length,
            block_size,
            consumed: 0,
            available: 0,
            last_loaded: 0,
            buffer: Vec::new(),
        }
    }

    fn position(&self) -> u64 {
        (self.last_loaded - self.available).saturating_add(self.consumed)
    }

    /// Load blocks until the cursor lands inside the buffer and return its
    /// slot.
    fn slot(&mut self, batched: bool) -> Result<&mut Option<String>> {
        while self.consumed >= self.available {
            self.load(batched)?;
        }
        Ok(&mut self.buffer[self.consumed as usize])
    }

    /// Decode the block after the current one. The counters and buffer
    /// change only once the whole block has decoded; a failed load leaves
    /// the stream as it was.
    fn load(&mut self, batched: bool) -> Result<()> {
        if self.last_loaded >= self.length {
            return Err(Error::out_of_range(format!(
                "requesting data beyond the end of the dataset at '{}'",
                self.pointers.name()
            )));
        }
        let count = self.block_size.min(self.length - self.last_loaded);
        debug!(
            pointers = %self.pointers.name(),
            start = self.last_loaded,
            count,
            "loading VLS block"
        );
        let pointers = self.pointers.read_block(self.last_loaded, count)?;
        let heap_len = self.heap.len();
        if let Some(bad) = pointers.iter().find(|p| !pointer_in_range(**p, heap_len)) {
            debug!(start = bad.start, size = bad.size, heap_len, "pointer out of range");
            return Err(Error::out_of_range(format!(
                "pointers for VLS dataset at '{}' are out of range for heap at '{}'",
                self.pointers.name(),
                self.heap.name()
            )));
        }
        let buffer = if batched {
            self.decode_batched(&pointers)?
        } else {
            self.decode_each(&pointers)?
        };

        self.consumed -= self.available;
        self.available = count;
        self.last_loaded += count;
        self.buffer = buffer;
        Ok(())
    }

    fn decode_each(&self, pointers: &[Pointer]) -> Result<Vec<Option<String>>> {
        pointers
            .iter()
            .map(|p| {
                if p.size == 0 {
                    return Ok(Some(String::new()));
                }
                let bytes = self.heap.read(p.start, p.size)?;
                Ok(Some(decode_string(&bytes)))
            })
            .collect()
    }

    /// One heap read spanning every pointer of the block, unless the span
    /// is mostly gaps.
    fn decode_batched(&self, pointers: &[Pointer]) -> Result<Vec<Option<String>>> {
        let filled = pointers.iter().filter(|p| p.size > 0);
        let (Some(low), Some(high)) = (
            filled.clone().map(|p| p.start).min(),
            filled.clone().map(|p| p.start + p.size).max(),
        ) else {
            return Ok(vec![Some(String::new()); pointers.len()]);
        };
        let requested = filled.fold(0u64, |acc, p| acc.saturating_add(p.size));
        let span = high - low;
        if span > requested.saturating_mul(2) {
            warn!(
                pointers = %self.pointers.name(),
                span,
                requested,
                "sparse VLS block, reading strings individually"
            );
            return self.decode_each(pointers);
        }

        let bytes = self.heap.read(low, span)?;
        Ok(pointers
            .iter()
            .map(|p| {
                if p.size == 0 {
                    return Some(String::new());
                }
                let from = (p.start - low) as usize;
                Some(decode_string(&bytes[from..from + p.size as usize]))
            })
            .collect())
    }
}

/// Bytes up to the first NUL, as UTF-8 where valid.
fn decode_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    match String::from_utf8(bytes[..end].to_vec()) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

macro_rules! stream_type {
    ($(#[$doc:meta])* $name:ident, batched = $batched:expr) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name {
            core: Core,
        }

        impl $name {
            /// Stream over a 1-dimensional pointer array, loading at most
            /// `budget` pointers per block.
            pub fn new(pointers: PointerArray, heap: Heap, budget: u64) -> Result<Self> {
                let length = get_1d_length(pointers.dataset(), false)?;
                Ok(Self::with_length(pointers, heap, length, budget))
            }

            /// [`Self::new`] with the budget taken from `options`.
            pub fn with_options(pointers: PointerArray, heap: Heap, options: ReadOptions) -> Result<Self> {
                Self::new(pointers, heap, options.memory_budget)
            }

            /// Stream over the first `length` pointers only.
            pub fn with_length(pointers: PointerArray, heap: Heap, length: u64, budget: u64) -> Self {
                Self {
                    core: Core::new(pointers, heap, length, budget),
                }
            }

            /// Pointers loaded per block.
            pub fn block_size(&self) -> u64 {
                self.core.block_size
            }
        }

        impl StringStream for $name {
            fn length(&self) -> u64 {
                self.core.length
            }

            fn position(&self) -> u64 {
                self.core.position()
            }

            fn get(&mut self) -> Result<&str> {
                Ok(self.core.slot($batched)?.as_deref().unwrap_or(""))
            }

            fn steal(&mut self) -> Result<String> {
                Ok(self.core.slot($batched)?.take().unwrap_or_default())
            }

            fn jump(&mut self, n: u64) {
                self.core.consumed = self.core.consumed.saturating_add(n);
            }
        }
    };
}

stream_type!(
    /// Reads each string of a block from the heap separately.
    VlsStream,
    batched = false
);

stream_type!(
    /// Reads the heap span of a whole block at once and slices the
    /// strings out of it. Falls back to [`VlsStream`] behaviour when the
    /// span is more than twice the bytes the block asks for.
    VlsBatchedStream,
    batched = true
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::File;
    use crate::vls::open::{open_heap, open_pointers};
    use crate::vls::pointer::{define_pointer_datatype, encode_pointers, pack_strings, PointerNaming};
    use crate::writer::FileBuilder;

    fn file(pointers: &[Pointer], heap: &[u8], chunk: Option<u64>) -> File {
        let mut b = FileBuilder::new();
        let ds = b.create_dataset("pointers");
        ds.with_raw_data(
            define_pointer_datatype(PointerNaming::StartSize, 8, 8),
            encode_pointers(pointers, 8, 8),
        );
        if let Some(c) = chunk {
            ds.with_chunks(&[c]);
        }
        b.create_dataset("heap").with_u8_data(heap);
        File::from_bytes(b.finish().unwrap()).unwrap()
    }

    fn open(file: &File) -> (PointerArray, Heap) {
        let root = file.root().unwrap();
        (
            open_pointers(&root, "pointers", PointerNaming::StartSize, 64, 64).unwrap(),
            open_heap(&root, "heap").unwrap(),
        )
    }

    #[test]
    fn decode_truncates_and_repairs() {
        assert_eq!(decode_string(b"abc\0def"), "abc");
        assert_eq!(decode_string(b"\0"), "");
        assert_eq!(decode_string(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[test]
    fn counters_follow_the_cursor() {
        let strings: Vec<String> = (0..10).map(|i| format!("s{i}")).collect();
        let (pointers, heap) = pack_strings(&strings);
        let file = file(&pointers, &heap, Some(3));
        let (p, h) = open(&file);
        let mut stream = VlsStream::new(p, h, 4).unwrap();
        assert_eq!(stream.block_size(), 3);
        assert_eq!(stream.length(), 10);
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.get().unwrap(), "s0");
        stream.jump(7);
        assert_eq!(stream.position(), 7);
        assert_eq!(stream.get().unwrap(), "s7");
        stream.next();
        assert_eq!(stream.steal().unwrap(), "s8");
        assert_eq!(stream.steal().unwrap(), "");
        stream.next();
        assert_eq!(stream.get().unwrap(), "s9");
        stream.next();
        assert_eq!(stream.position(), 10);
        assert!(stream.get().unwrap_err().to_string().contains("beyond the end"));
    }

    #[test]
    fn batched_handles_overlap_and_order() {
        let heap = b"hello world".to_vec();
        let pointers = vec![
            Pointer { start: 6, size: 5 },
            Pointer { start: 0, size: 5 },
            Pointer { start: 2, size: 3 },
            Pointer { start: 0, size: 0 },
            Pointer { start: 0, size: 11 },
        ];
        let file = file(&pointers, &heap, None);
        let (p, h) = open(&file);
        let mut stream = VlsBatchedStream::new(p, h, 100).unwrap();
        let mut out = Vec::new();
        for _ in 0..stream.length() {
            out.push(stream.steal().unwrap());
            stream.next();
        }
        assert_eq!(out, vec!["world", "hello", "llo", "", "hello world"]);
    }

    #[test]
    fn batched_falls_back_on_sparse_blocks() {
        let mut heap = vec![b'x'; 1000];
        heap[..2].copy_from_slice(b"ab");
        heap[998..].copy_from_slice(b"yz");
        let pointers = vec![Pointer { start: 0, size: 2 }, Pointer { start: 998, size: 2 }];
        let file = file(&pointers, &heap, None);
        let (p, h) = open(&file);
        let mut stream = VlsBatchedStream::new(p, h, 10).unwrap();
        assert_eq!(stream.get().unwrap(), "ab");
        stream.next();
        assert_eq!(stream.get().unwrap(), "yz");
    }

    #[test]
    fn failed_range_check_repeats() {
        let pointers = [Pointer { start: 0, size: 1 }, Pointer { start: 50, size: 1 }];
        let file = file(&pointers, b"ab", None);
        for batched in [false, true] {
            let (p, h) = open(&file);
            let mut core = Core::new(p, h, 2, 10);
            for _ in 0..2 {
                let err = core.slot(batched).unwrap_err();
                assert_eq!(
                    err.to_string(),
                    "pointers for VLS dataset at '/pointers' are out of range for heap at '/heap'"
                );
                assert_eq!(core.position(), 0);
            }
        }
    }

    #[test]
    fn end_of_stream_error_repeats() {
        let (pointers, heap) = pack_strings(&["ab", "cd"]);
        let file = file(&pointers, &heap, None);
        let (p, h) = open(&file);
        let mut stream = VlsStream::new(p, h, 10).unwrap();
        assert_eq!(stream.get().unwrap(), "ab");
        stream.jump(2);
        for _ in 0..2 {
            let err = stream.get().unwrap_err();
            assert_eq!(err.to_string(), "requesting data beyond the end of the dataset at '/pointers'");
            assert_eq!(stream.position(), 2);
        }
        assert!(stream.steal().is_err());
    }

    #[test]
    fn huge_jump_saturates() {
        let (pointers, heap) = pack_strings(&["x", "y", "z"]);
        let file = file(&pointers, &heap, None);
        let (p, h) = open(&file);
        let mut stream = VlsBatchedStream::new(p, h, 1).unwrap();
        stream.jump(u64::MAX);
        stream.jump(5);
        assert_eq!(stream.position(), u64::MAX);
        assert!(matches!(stream.get(), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn with_length_stops_early() {
        let (pointers, heap) = pack_strings(&["a", "b", "c"]);
        let file = file(&pointers, &heap, None);
        let (p, h) = open(&file);
        let mut stream = VlsStream::with_length(p, h, 2, 10);
        stream.jump(2);
        assert!(matches!(stream.get(), Err(Error::OutOfRange { .. })));
    }
}
