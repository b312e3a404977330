//! Pure-Rust parsing of the HDF5 structures needed to locate and read
//! datasets: superblocks, object headers, datatypes, dataspaces, layouts,
//! filters, chunk indices and groups. A small set of encoders supports
//! building files for tests and fixtures.

pub mod btree_v1;
pub(crate) mod bytes;
pub mod checksum;
pub mod chunk_index;
pub mod data_layout;
pub mod data_read;
pub mod dataset;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod filter_pipeline;
pub mod filters;
pub mod group;
pub mod link;
pub mod message_type;
pub mod object_header;
pub mod object_header_writer;
pub mod signature;
pub mod superblock;

pub use error::FormatError;
