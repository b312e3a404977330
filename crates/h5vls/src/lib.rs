//! Reading and writing variable-length string arrays in HDF5 files.
//!
//! A VLS array is stored as two datasets: a dataset of compound
//! `{start, size}` pointer records and a 1-dimensional heap of bytes. This
//! crate opens both, validates the pointers against the heap and streams
//! the decoded strings in memory-bounded blocks.
//!
//! # Reading
//!
//! ```no_run
//! use h5vls::vls::{open_heap, open_pointers, PointerNaming, StringStream, VlsStream};
//! use h5vls::{File, ReadOptions};
//!
//! let file = File::open("strings.h5")?;
//! let group = file.group("names")?;
//! let pointers = open_pointers(&group, "pointers", PointerNaming::StartSize, 64, 64)?;
//! let heap = open_heap(&group, "heap")?;
//! let mut stream = VlsStream::new(pointers, heap, ReadOptions::default().memory_budget)?;
//! for _ in 0..stream.length() {
//!     println!("{}", stream.get()?);
//!     stream.next();
//! }
//! # Ok::<(), h5vls::Error>(())
//! ```
//!
//! # Writing
//!
//! ```no_run
//! use h5vls::vls::{define_pointer_datatype, encode_pointers, pack_strings, PointerNaming};
//! use h5vls::FileBuilder;
//!
//! let (pointers, heap) = pack_strings(&["first", "second"]);
//! let mut builder = FileBuilder::new();
//! let group = builder.create_group("names");
//! group
//!     .create_dataset("pointers")
//!     .with_raw_data(define_pointer_datatype(PointerNaming::StartSize, 8, 8), encode_pointers(&pointers, 8, 8));
//! group.create_dataset("heap").with_u8_data(&heap);
//! builder.write("strings.h5")?;
//! # Ok::<(), h5vls::Error>(())
//! ```

pub mod block;
pub mod error;
pub mod iterate;
pub mod limits;
pub mod options;
pub mod reader;
mod storage;
pub mod vls;
pub mod writer;

pub use block::{plan_1d_block_size, plan_nd_block_dimensions};
pub use error::{Error, Result};
pub use iterate::{iterate_1d_blocks, NdBlockIter};
pub use limits::{exceeds_float_limit, exceeds_integer_limit};
pub use options::{ReadOptions, DEFAULT_MEMORY_BUDGET};
pub use reader::{get_1d_length, Dataset, File, Group};
pub use writer::{CompoundTypeBuilder, DatasetBuilder, FileBuilder, GroupBuilder};

pub use h5vls_format::datatype::Datatype;
