//! HDF5 superblock parsing (versions 0 through 3) and v2 serialisation.

use crate::bytes::{ensure_len, read_offset, read_u16, validate_sizes, write_uint};
use crate::checksum::{jenkins_lookup3, verify_trailing_checksum};
use crate::error::FormatError;
use crate::signature::HDF5_SIGNATURE;

/// Parsed HDF5 superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (0-3).
    pub version: u8,
    /// Size of file offsets in bytes.
    pub offset_size: u8,
    /// Size of lengths in bytes.
    pub length_size: u8,
    /// Absolute address that all other addresses are relative to.
    pub base_address: u64,
    /// End-of-file address.
    pub eof_address: u64,
    /// Object header address of the root group.
    pub root_group_address: u64,
    /// Group leaf node K (v0/v1 only).
    pub group_leaf_node_k: Option<u16>,
    /// Group internal node K (v0/v1 only).
    pub group_internal_node_k: Option<u16>,
    /// Superblock extension address (v2/v3 only).
    pub extension_address: Option<u64>,
}

impl Superblock {
    /// Parse a superblock whose signature starts at `signature_offset`.
    pub fn parse(data: &[u8], signature_offset: usize) -> Result<Superblock, FormatError> {
        ensure_len(data, signature_offset, 9)?;
        let d = &data[signature_offset..];
        if d[..8] != HDF5_SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }

        match d[8] {
            0 => Self::parse_v0v1(d, 0),
            1 => Self::parse_v0v1(d, 1),
            v @ (2 | 3) => Self::parse_v2v3(d, v),
            version => Err(FormatError::UnsupportedVersion {
                structure: "superblock",
                version,
            }),
        }
    }

    fn parse_v0v1(d: &[u8], version: u8) -> Result<Superblock, FormatError> {
        ensure_len(d, 0, 24)?;
        let offset_size = d[13];
        let length_size = d[14];
        validate_sizes(offset_size, length_size)?;

        let group_leaf_node_k = read_u16(d, 16)?;
        let group_internal_node_k = read_u16(d, 18)?;
        // v1 inserts the indexed storage K and two reserved bytes.
        let var_start = if version == 1 { 28 } else { 24 };

        let os = offset_size as usize;
        let mut pos = var_start;
        let base_address = read_offset(d, pos, offset_size)?;
        pos += os;
        // free-space info address
        pos += os;
        let eof_address = read_offset(d, pos, offset_size)?;
        pos += os;
        // driver info address
        pos += os;

        // Root group symbol table entry: link name offset, then header address.
        pos += os;
        let root_group_address = read_offset(d, pos, offset_size)?;

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            eof_address,
            root_group_address,
            group_leaf_node_k: Some(group_leaf_node_k),
            group_internal_node_k: Some(group_internal_node_k),
            extension_address: None,
        })
    }

    fn parse_v2v3(d: &[u8], version: u8) -> Result<Superblock, FormatError> {
        ensure_len(d, 0, 12)?;
        let offset_size = d[9];
        let length_size = d[10];
        validate_sizes(offset_size, length_size)?;

        let os = offset_size as usize;
        let mut pos = 12;
        let base_address = read_offset(d, pos, offset_size)?;
        pos += os;
        let extension_address = read_offset(d, pos, offset_size)?;
        pos += os;
        let eof_address = read_offset(d, pos, offset_size)?;
        pos += os;
        let root_group_address = read_offset(d, pos, offset_size)?;
        pos += os;
        verify_trailing_checksum(d, pos)?;

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            eof_address,
            root_group_address,
            group_leaf_node_k: None,
            group_internal_node_k: None,
            extension_address: Some(extension_address),
        })
    }

    /// Encoded size of a v2/v3 superblock for the given offset width.
    pub fn v2_size(offset_size: u8) -> usize {
        12 + 4 * offset_size as usize + 4
    }

    /// Serialise as a version 2 superblock with no extension.
    pub fn serialize_v2(&self) -> Vec<u8> {
        let os = self.offset_size as usize;
        let mut buf = Vec::with_capacity(Self::v2_size(self.offset_size));
        buf.extend_from_slice(&HDF5_SIGNATURE);
        buf.push(2);
        buf.push(self.offset_size);
        buf.push(self.length_size);
        buf.push(0); // consistency flags
        write_uint(&mut buf, self.base_address, os);
        write_uint(&mut buf, u64::MAX, os);
        write_uint(&mut buf, self.eof_address, os);
        write_uint(&mut buf, self.root_group_address, os);
        let sum = jenkins_lookup3(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
        buf
    }
}
