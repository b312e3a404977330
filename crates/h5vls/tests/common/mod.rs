#![allow(dead_code)]

use std::path::PathBuf;

use h5vls::vls::{define_pointer_datatype, encode_pointers, open_heap, open_pointers, Heap, Pointer, PointerArray, PointerNaming};
use h5vls::{File, FileBuilder};
use tempfile::TempDir;

/// Pointer and heap datasets written to a file on disk.
pub struct Fixture {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl Fixture {
    pub fn open(&self) -> (PointerArray, Heap) {
        let file = File::open(&self.path).unwrap();
        let root = file.root().unwrap();
        (
            open_pointers(&root, "foo", PointerNaming::StartSize, 64, 64).unwrap(),
            open_heap(&root, "bar").unwrap(),
        )
    }
}

/// Write 32-bit pointers to "foo" and the heap to "bar", compressing the
/// pointers in chunks of `chunk` when given.
pub fn write_vls(pointers: &[Pointer], heap: &[u8], chunk: Option<u64>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vls.h5");
    let mut b = FileBuilder::new();
    let ds = b.create_dataset("foo");
    ds.with_raw_data(
        define_pointer_datatype(PointerNaming::StartSize, 4, 4),
        encode_pointers(pointers, 4, 4),
    );
    if let Some(c) = chunk {
        ds.with_chunks(&[c]).with_deflate(8);
    }
    b.create_dataset("bar").with_u8_data(heap);
    b.write(&path).unwrap();
    Fixture { dir, path }
}

/// Route `tracing` output through the test harness; `RUST_LOG` picks
/// the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic pseudo-random sequence for building test strings.
pub fn scrambled(seed: u64, n: usize) -> Vec<u64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            state >> 11
        })
        .collect()
}
