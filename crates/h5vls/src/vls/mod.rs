//! Variable-length string arrays stored as a pointer dataset plus a byte
//! heap.
//!
//! Each element of the pointer dataset is a compound `{start, size}`
//! record naming a run of bytes in the heap. A run may contain a NUL, in
//! which case the string ends there.

pub mod open;
pub mod pointer;
pub mod stream;
pub mod validate;

pub use open::{open_heap, open_heap_any_unsigned, open_pointers, Heap, PointerArray};
pub use pointer::{
    define_pointer_datatype, encode_pointers, pack_strings, pointer_in_range, validate_pointer_datatype,
    FieldLayout, Pointer, PointerLayout, PointerNaming,
};
pub use stream::{StringStream, VlsBatchedStream, VlsStream};
pub use validate::{validate_1d, validate_nd, validate_pointer_array};
