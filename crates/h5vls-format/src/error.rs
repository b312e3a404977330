//! Error types for HDF5 format parsing.

use thiserror::Error;

/// Errors that can occur when parsing or assembling HDF5 binary structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The HDF5 magic signature was not found at any valid offset.
    #[error("HDF5 signature not found at any valid offset")]
    SignatureNotFound,
    /// A structure carries a version this crate cannot decode.
    #[error("unsupported {structure} version: {version}")]
    UnsupportedVersion {
        /// Which structure the version belongs to.
        structure: &'static str,
        /// The version byte found in the file.
        version: u8,
    },
    /// Unexpected end of data.
    #[error("unexpected EOF: need {expected} bytes, have {available}")]
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    #[error("invalid offset size: {0} (must be 2, 4, or 8)")]
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    #[error("invalid length size: {0} (must be 2, 4, or 8)")]
    InvalidLengthSize(u8),
    /// A structure did not start with its 4-byte signature.
    #[error("invalid {0} signature")]
    InvalidSignature(&'static str),
    /// Jenkins lookup3 checksum mismatch.
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// Unknown message type that is marked as must-understand.
    #[error("unsupported message type {0:#06x} marked as must-understand")]
    UnsupportedMessage(u16),
    /// Datatype class nibble outside the defined range.
    #[error("invalid datatype class: {0}")]
    InvalidDatatypeClass(u8),
    /// Malformed datatype description.
    #[error("invalid datatype: {0}")]
    InvalidDatatype(String),
    /// Invalid dataspace type byte.
    #[error("invalid dataspace type: {0}")]
    InvalidDataspaceType(u8),
    /// Layout class outside compact, contiguous, chunked and virtual.
    #[error("invalid data layout class: {0}")]
    InvalidLayoutClass(u8),
    /// Link type outside hard, soft and external.
    #[error("invalid link type: {0}")]
    InvalidLinkType(u8),
    /// A filter in the pipeline is not implemented.
    #[error("unsupported filter id {0}")]
    UnsupportedFilter(u16),
    /// A filter failed to decode or encode a chunk.
    #[error("filter {filter} failed: {message}")]
    FilterFailed {
        /// Filter identifier.
        filter: u16,
        /// Description of the failure.
        message: String,
    },
    /// A feature of the format that is recognised but not implemented.
    #[error("unsupported HDF5 feature: {0}")]
    Unsupported(String),
    /// A selection does not fit inside the dataset extent.
    #[error("selection out of bounds in dimension {dim}: start {start} + count {count} > extent {extent}")]
    SelectionOutOfBounds {
        /// Dimension index.
        dim: usize,
        /// Selection start.
        start: u64,
        /// Selection count.
        count: u64,
        /// Dataset extent along the dimension.
        extent: u64,
    },
    /// Selection rank does not match the dataset rank.
    #[error("selection rank {selection} does not match dataset rank {dataset}")]
    RankMismatch {
        /// Rank of the requested selection.
        selection: usize,
        /// Rank of the dataset.
        dataset: usize,
    },
    /// A size computation overflowed the platform's address space.
    #[error("size overflow while computing {0}")]
    SizeOverflow(&'static str),
}
