//! Data layout message (type 0x0008), versions 3 and 4.

use crate::bytes::{ensure_len, is_undefined, read_offset, read_u16, read_uint, write_uint};
use crate::error::FormatError;

/// How the chunks of a chunked dataset are located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkIndex {
    /// Version 1 B-tree keyed by chunk offsets (layout v3, or v4 type 6).
    BTreeV1,
    /// A single chunk covering the whole dataset.
    Single {
        /// Stored size and filter mask when the chunk is filtered.
        filtered: Option<(u64, u32)>,
    },
    /// Chunks laid out back to back in row-major order, unfiltered.
    Implicit,
    /// Fixed array of chunk addresses.
    FixedArray,
    ExtensibleArray,
    BTreeV2,
}

/// Storage layout of a dataset's raw data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayout {
    /// Raw data stored inside the message.
    Compact { data: Vec<u8> },
    /// One contiguous block; `None` when never allocated.
    Contiguous { address: Option<u64>, size: u64 },
    /// Chunked storage.
    Chunked {
        /// Chunk extent per dataset dimension.
        chunk_dims: Vec<u64>,
        /// Size of one element, stored as the trailing chunk dimension.
        element_size: u64,
        index: ChunkIndex,
        /// Address of the index structure (or of the data for
        /// single and implicit indices).
        address: Option<u64>,
    },
    Virtual,
}

fn optional_address(data: &[u8], pos: usize, offset_size: u8) -> Result<Option<u64>, FormatError> {
    let addr = read_offset(data, pos, offset_size)?;
    Ok((!is_undefined(addr, offset_size)).then_some(addr))
}

impl DataLayout {
    pub fn parse(data: &[u8], offset_size: u8, length_size: u8) -> Result<DataLayout, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        if !(3..=4).contains(&version) {
            return Err(FormatError::UnsupportedVersion {
                structure: "data layout",
                version,
            });
        }
        let os = offset_size as usize;
        let ls = length_size as usize;
        let mut pos = 2;

        match data[1] {
            0 => {
                let n = read_u16(data, pos)? as usize;
                pos += 2;
                ensure_len(data, pos, n)?;
                Ok(DataLayout::Compact {
                    data: data[pos..pos + n].to_vec(),
                })
            }
            1 => Ok(DataLayout::Contiguous {
                address: optional_address(data, pos, offset_size)?,
                size: read_uint(data, pos + os, ls)?,
            }),
            2 if version == 3 => {
                ensure_len(data, pos, 1)?;
                let rank = data[pos] as usize;
                pos += 1;
                let address = optional_address(data, pos, offset_size)?;
                pos += os;
                let mut dims = Vec::with_capacity(rank);
                for _ in 0..rank {
                    dims.push(read_uint(data, pos, 4)?);
                    pos += 4;
                }
                Self::chunked(dims, ChunkIndex::BTreeV1, address)
            }
            2 => {
                ensure_len(data, pos, 3)?;
                let flags = data[pos];
                let rank = data[pos + 1] as usize;
                let width = data[pos + 2] as usize;
                pos += 3;
                let mut dims = Vec::with_capacity(rank);
                for _ in 0..rank {
                    dims.push(read_uint(data, pos, width)?);
                    pos += width;
                }
                ensure_len(data, pos, 1)?;
                let index_type = data[pos];
                pos += 1;
                let index = match index_type {
                    1 => {
                        let filtered = if flags & 0x02 != 0 {
                            let size = read_uint(data, pos, ls)?;
                            let mask = read_uint(data, pos + ls, 4)? as u32;
                            pos += ls + 4;
                            Some((size, mask))
                        } else {
                            None
                        };
                        ChunkIndex::Single { filtered }
                    }
                    2 => ChunkIndex::Implicit,
                    3 => {
                        pos += 1;
                        ChunkIndex::FixedArray
                    }
                    4 => {
                        pos += 5;
                        ChunkIndex::ExtensibleArray
                    }
                    5 => {
                        pos += 6;
                        ChunkIndex::BTreeV2
                    }
                    other => {
                        return Err(FormatError::Unsupported(format!(
                            "chunk index type {other}"
                        )))
                    }
                };
                let address = optional_address(data, pos, offset_size)?;
                Self::chunked(dims, index, address)
            }
            3 => Ok(DataLayout::Virtual),
            other => Err(FormatError::InvalidLayoutClass(other)),
        }
    }

    fn chunked(mut dims: Vec<u64>, index: ChunkIndex, address: Option<u64>) -> Result<DataLayout, FormatError> {
        let element_size = dims
            .pop()
            .ok_or_else(|| FormatError::Unsupported("chunked layout with no dimensions".into()))?;
        if dims.contains(&0) {
            return Err(FormatError::Unsupported("zero chunk dimension".into()));
        }
        Ok(DataLayout::Chunked {
            chunk_dims: dims,
            element_size,
            index,
            address,
        })
    }

    /// Serialise as a version 3 message. Chunked layouts are written with a
    /// v1 B-tree index.
    pub fn serialize(&self, offset_size: u8, length_size: u8) -> Result<Vec<u8>, FormatError> {
        let os = offset_size as usize;
        let mut buf = vec![3];
        match self {
            DataLayout::Compact { data } => {
                let n = u16::try_from(data.len())
                    .map_err(|_| FormatError::Unsupported("compact data over 64 KiB".into()))?;
                buf.push(0);
                buf.extend_from_slice(&n.to_le_bytes());
                buf.extend_from_slice(data);
            }
            DataLayout::Contiguous { address, size } => {
                buf.push(1);
                write_uint(&mut buf, address.unwrap_or(u64::MAX), os);
                write_uint(&mut buf, *size, length_size as usize);
            }
            DataLayout::Chunked {
                chunk_dims,
                element_size,
                index: ChunkIndex::BTreeV1,
                address,
            } => {
                buf.push(2);
                buf.push(chunk_dims.len() as u8 + 1);
                write_uint(&mut buf, address.unwrap_or(u64::MAX), os);
                for &d in chunk_dims.iter().chain(std::iter::once(element_size)) {
                    let d = u32::try_from(d)
                        .map_err(|_| FormatError::Unsupported("chunk dimension over u32".into()))?;
                    buf.extend_from_slice(&d.to_le_bytes());
                }
            }
            other => {
                return Err(FormatError::Unsupported(format!(
                    "serialising layout {other:?} as version 3"
                )))
            }
        }
        Ok(buf)
    }
}
