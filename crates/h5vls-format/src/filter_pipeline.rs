//! Filter pipeline message (type 0x000B).

use crate::bytes::{ensure_len, read_u16, read_u32};
use crate::error::FormatError;

pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_SHUFFLE: u16 = 2;
pub const FILTER_FLETCHER32: u16 = 3;

/// One filter in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub id: u16,
    pub name: Option<String>,
    /// Bit 0 marks the filter optional.
    pub flags: u16,
    pub client_data: Vec<u32>,
}

impl Filter {
    /// Deflate at the given compression level.
    pub fn deflate(level: u32) -> Filter {
        Filter {
            id: FILTER_DEFLATE,
            name: None,
            flags: 0,
            client_data: vec![level],
        }
    }

    pub fn shuffle() -> Filter {
        Filter {
            id: FILTER_SHUFFLE,
            name: None,
            flags: 0,
            client_data: Vec::new(),
        }
    }

    pub fn fletcher32() -> Filter {
        Filter {
            id: FILTER_FLETCHER32,
            name: None,
            flags: 0,
            client_data: Vec::new(),
        }
    }

    pub fn is_optional(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

/// Filters applied to every chunk, in encoding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPipeline {
    pub filters: Vec<Filter>,
}

fn read_name(data: &[u8], pos: usize, len: usize) -> Result<Option<String>, FormatError> {
    if len == 0 {
        return Ok(None);
    }
    ensure_len(data, pos, len)?;
    let raw = &data[pos..pos + len];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(Some(String::from_utf8_lossy(&raw[..end]).into_owned()))
}

impl FilterPipeline {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Parse a version 1 or 2 pipeline message.
    pub fn parse(data: &[u8]) -> Result<FilterPipeline, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        let count = data[1] as usize;
        let mut pos = match version {
            1 => 8,
            2 => 2,
            version => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "filter pipeline",
                    version,
                })
            }
        };

        let mut filters = Vec::with_capacity(count);
        for _ in 0..count {
            let id = read_u16(data, pos)?;
            pos += 2;
            // v2 omits the name length for the predefined filters.
            let name_len = if version == 1 || id >= 256 {
                let n = read_u16(data, pos)? as usize;
                pos += 2;
                n
            } else {
                0
            };
            let flags = read_u16(data, pos)?;
            let values = read_u16(data, pos + 2)? as usize;
            pos += 4;

            let name = read_name(data, pos, name_len)?;
            pos += if version == 1 {
                name_len.div_ceil(8) * 8
            } else {
                name_len
            };

            let mut client_data = Vec::with_capacity(values);
            for _ in 0..values {
                client_data.push(read_u32(data, pos)?);
                pos += 4;
            }
            if version == 1 && values % 2 == 1 {
                pos += 4;
            }
            filters.push(Filter {
                id,
                name,
                flags,
                client_data,
            });
        }
        Ok(FilterPipeline { filters })
    }

    /// Serialise as a version 2 message.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![2, self.filters.len() as u8];
        for f in &self.filters {
            buf.extend_from_slice(&f.id.to_le_bytes());
            let name = f.name.as_deref().filter(|_| f.id >= 256);
            if f.id >= 256 {
                let len = name.map_or(0, |n| n.len() + 1);
                buf.extend_from_slice(&(len as u16).to_le_bytes());
            }
            buf.extend_from_slice(&f.flags.to_le_bytes());
            buf.extend_from_slice(&(f.client_data.len() as u16).to_le_bytes());
            if let Some(n) = name {
                buf.extend_from_slice(n.as_bytes());
                buf.push(0);
            }
            for v in &f.client_data {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf
    }
}
