//! Streaming decode of VLS arrays written to disk.

mod common;

use common::{init_tracing, scrambled, write_vls};
use h5vls::vls::{pack_strings, Pointer, StringStream, VlsBatchedStream, VlsStream};
use h5vls::{Error, ReadOptions};

fn collect<S: StringStream>(stream: &mut S) -> Vec<String> {
    let mut out = Vec::with_capacity(stream.length() as usize);
    for _ in 0..stream.length() {
        out.push(stream.get().unwrap().to_owned());
        stream.next();
    }
    out
}

#[test]
fn basic_roundtrip() {
    init_tracing();
    let example: Vec<String> = (0..12345).map(|i| i.to_string()).collect();
    let (pointers, heap) = pack_strings(&example);
    let fixture = write_vls(&pointers, &heap, Some(51));

    for budget in [10, 200, 500] {
        let (p, h) = fixture.open();
        let mut stream = VlsStream::new(p, h, budget).unwrap();
        assert_eq!(stream.length(), 12345);
        assert_eq!(collect(&mut stream), example);

        let (p, h) = fixture.open();
        let mut batched = VlsBatchedStream::new(p, h, budget).unwrap();
        assert_eq!(collect(&mut batched), example);
    }
}

#[test]
fn null_terminated() {
    let example: Vec<String> = scrambled(999, 1000).iter().map(|v| v.to_string()).collect();
    let mut pointers = Vec::new();
    let mut heap = Vec::new();
    for s in &example {
        pointers.push(Pointer {
            start: heap.len() as u64,
            size: s.len() as u64 + 2,
        });
        heap.extend_from_slice(s.as_bytes());
        heap.extend_from_slice(&[0, 0]);
    }
    let fixture = write_vls(&pointers, &heap, Some(17));

    for budget in [11, 39, 71] {
        let (p, h) = fixture.open();
        let mut stream = VlsStream::new(p, h, budget).unwrap();
        assert_eq!(stream.length(), 1000);
        for expected in &example {
            assert_eq!(&stream.steal().unwrap(), expected);
            stream.next();
        }
    }
}

#[test]
fn unicode() {
    let example = [
        "the value of π is around 3.1415926535",
        "alpha globulins consist of two principal fractions, α1 and α2",
        "😀😄😆🤣",
    ];
    let (pointers, heap) = pack_strings(&example);
    let fixture = write_vls(&pointers, &heap, None);
    let (p, h) = fixture.open();
    let mut stream = VlsStream::new(p, h, 200).unwrap();
    assert_eq!(collect(&mut stream), example);
}

#[test]
fn start_out_of_range() {
    let fixture = write_vls(&[Pointer { start: 10, size: 0 }], &[], None);
    let (p, h) = fixture.open();
    let mut stream = VlsStream::new(p, h, 100).unwrap();
    let err = stream.get().unwrap_err();
    assert!(matches!(err, Error::OutOfRange { .. }));
    assert_eq!(
        err.to_string(),
        "pointers for VLS dataset at '/foo' are out of range for heap at '/bar'"
    );
}

#[test]
fn end_out_of_range() {
    let fixture = write_vls(&[Pointer { start: 0, size: 10 }], &[], None);
    let (p, h) = fixture.open();
    let mut stream = VlsBatchedStream::new(p, h, 100).unwrap();
    assert!(stream.get().unwrap_err().to_string().contains("out of range"));
}

#[test]
fn beyond_the_end() {
    let (pointers, heap) = pack_strings(&["foo"]);
    let fixture = write_vls(&pointers, &heap, None);
    let (p, h) = fixture.open();
    let mut stream = VlsStream::new(p, h, 100).unwrap();
    assert_eq!(stream.get().unwrap(), "foo");
    stream.next();
    let err = stream.get().unwrap_err().to_string();
    assert_eq!(err, "requesting data beyond the end of the dataset at '/foo'");
}

#[test]
fn empty_pointer_on_empty_heap() {
    let fixture = write_vls(&[Pointer { start: 0, size: 0 }; 3], &[], None);
    let (p, h) = fixture.open();
    let mut stream = VlsStream::new(p, h, 2).unwrap();
    assert_eq!(collect(&mut stream), vec![""; 3]);
}

#[test]
fn empty_pointer_at_heap_end() {
    let pointers = [
        Pointer { start: 0, size: 3 },
        Pointer { start: 3, size: 0 },
        Pointer { start: 1, size: 2 },
    ];
    let fixture = write_vls(&pointers, b"abc", None);
    let (p, h) = fixture.open();
    let mut stream = VlsStream::new(p, h, 10).unwrap();
    assert_eq!(collect(&mut stream), vec!["abc", "", "bc"]);
    let (p, h) = fixture.open();
    let mut batched = VlsBatchedStream::new(p, h, 10).unwrap();
    assert_eq!(collect(&mut batched), vec!["abc", "", "bc"]);
}

#[test]
fn zero_budget_reads_one_at_a_time() {
    let example: Vec<String> = (0..25).map(|i| format!("v{i}")).collect();
    let (pointers, heap) = pack_strings(&example);
    let fixture = write_vls(&pointers, &heap, None);
    let (p, h) = fixture.open();
    let mut stream = VlsStream::new(p, h, 0).unwrap();
    assert_eq!(stream.block_size(), 1);
    assert_eq!(collect(&mut stream), example);
}

#[test]
fn budget_from_read_options() {
    let example: Vec<String> = (0..300).map(|i| format!("entry {i}")).collect();
    let (pointers, heap) = pack_strings(&example);
    let fixture = write_vls(&pointers, &heap, Some(20));

    let (p, h) = fixture.open();
    let mut stream = VlsStream::with_options(p, h, ReadOptions::default()).unwrap();
    assert_eq!(stream.block_size(), 300);
    assert_eq!(collect(&mut stream), example);

    let (p, h) = fixture.open();
    let mut stream = VlsBatchedStream::with_options(p, h, ReadOptions::with_memory_budget(50)).unwrap();
    assert_eq!(stream.block_size(), 40);
    assert_eq!(collect(&mut stream), example);
}

#[test]
fn jumping_across_blocks() {
    let example: Vec<String> = (0..500).map(|i| format!("item-{i}")).collect();
    let (pointers, heap) = pack_strings(&example);
    let fixture = write_vls(&pointers, &heap, Some(13));
    let (p, h) = fixture.open();
    let mut stream = VlsStream::new(p, h, 30).unwrap();
    let mut index = 0u64;
    for step in [0u64, 1, 5, 26, 100, 3, 200] {
        stream.jump(step);
        index += step;
        assert_eq!(stream.position(), index);
        assert_eq!(stream.get().unwrap(), example[index as usize]);
    }
}

#[test]
fn batched_matches_per_pointer_on_scattered_pointers() {
    init_tracing();
    let heap: Vec<u8> = (0..4000u32).map(|i| b'a' + (i % 26) as u8).collect();
    let pointers: Vec<Pointer> = scrambled(7, 600)
        .chunks(2)
        .map(|pair| {
            let start = pair[0] % 3990;
            Pointer {
                start,
                size: pair[1] % (4000 - start).min(40),
            }
        })
        .collect();
    let fixture = write_vls(&pointers, &heap, Some(16));

    for budget in [16, 64, 1000] {
        let (p, h) = fixture.open();
        let expected = collect(&mut VlsStream::new(p, h, budget).unwrap());
        let (p, h) = fixture.open();
        let batched = collect(&mut VlsBatchedStream::new(p, h, budget).unwrap());
        assert_eq!(batched, expected);
        assert_eq!(expected[0].len() as u64, pointers[0].size);
    }
}

#[test]
fn pointers_must_be_one_dimensional() {
    use h5vls::vls::{define_pointer_datatype, encode_pointers, open_heap, open_pointers, PointerNaming};
    use h5vls::{File, FileBuilder};

    let mut b = FileBuilder::new();
    b.create_dataset("foo")
        .with_raw_data(
            define_pointer_datatype(PointerNaming::StartSize, 4, 4),
            encode_pointers(&[Pointer::default(); 4], 4, 4),
        )
        .with_shape(&[2, 2]);
    b.create_dataset("bar").with_u8_data(&[]);
    let file = File::from_bytes(b.finish().unwrap()).unwrap();
    let root = file.root().unwrap();
    let p = open_pointers(&root, "foo", PointerNaming::StartSize, 64, 64).unwrap();
    let h = open_heap(&root, "bar").unwrap();
    let err = VlsStream::new(p, h, 10).unwrap_err();
    assert_eq!(err.to_string(), "expected a 1-dimensional dataset at '/foo'");
}
