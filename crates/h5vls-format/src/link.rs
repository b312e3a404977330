//! Link (0x0006) and link info (0x0002) messages of new-style groups.

use crate::bytes::{ensure_len, is_undefined, read_offset, read_u16, read_uint, write_uint};
use crate::error::FormatError;

/// What a link resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Object header address.
    Hard(u64),
    /// Path inside the same file.
    Soft(String),
    External { file: String, path: String },
    /// User-defined link class with its raw payload.
    UserDefined { class: u8, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub target: LinkTarget,
    pub creation_order: Option<u64>,
}

impl Link {
    pub fn hard(name: &str, address: u64) -> Link {
        Link {
            name: name.to_owned(),
            target: LinkTarget::Hard(address),
            creation_order: None,
        }
    }

    pub fn parse(data: &[u8], offset_size: u8) -> Result<Link, FormatError> {
        ensure_len(data, 0, 2)?;
        if data[0] != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "link message",
                version: data[0],
            });
        }
        let flags = data[1];
        let mut pos = 2;
        let link_type = if flags & 0x08 != 0 {
            ensure_len(data, pos, 1)?;
            pos += 1;
            data[pos - 1]
        } else {
            0
        };
        let creation_order = if flags & 0x04 != 0 {
            pos += 8;
            Some(read_uint(data, pos - 8, 8)?)
        } else {
            None
        };
        if flags & 0x10 != 0 {
            pos += 1;
        }
        let width = 1usize << (flags & 0x03);
        let name_len = read_uint(data, pos, width)? as usize;
        pos += width;
        ensure_len(data, pos, name_len)?;
        let name = String::from_utf8_lossy(&data[pos..pos + name_len]).into_owned();
        pos += name_len;

        let target = match link_type {
            0 => LinkTarget::Hard(read_offset(data, pos, offset_size)?),
            1 => {
                let len = read_u16(data, pos)? as usize;
                ensure_len(data, pos + 2, len)?;
                LinkTarget::Soft(String::from_utf8_lossy(&data[pos + 2..pos + 2 + len]).into_owned())
            }
            64 => {
                let len = read_u16(data, pos)? as usize;
                ensure_len(data, pos + 2, len)?;
                // version/flags byte, then two NUL-terminated strings
                let blob = data[pos + 2..pos + 2 + len].get(1..).unwrap_or_default();
                let mut parts = blob.split(|&b| b == 0).map(|s| String::from_utf8_lossy(s).into_owned());
                LinkTarget::External {
                    file: parts.next().unwrap_or_default(),
                    path: parts.next().unwrap_or_default(),
                }
            }
            class if class >= 65 => {
                let len = read_u16(data, pos)? as usize;
                ensure_len(data, pos + 2, len)?;
                LinkTarget::UserDefined {
                    class,
                    data: data[pos + 2..pos + 2 + len].to_vec(),
                }
            }
            other => return Err(FormatError::InvalidLinkType(other)),
        };
        Ok(Link {
            name,
            target,
            creation_order,
        })
    }

    /// Serialise a hard or soft link.
    pub fn serialize(&self, offset_size: u8) -> Result<Vec<u8>, FormatError> {
        let name = self.name.as_bytes();
        let (width_bits, width) = match name.len() {
            0..=0xFF => (0u8, 1),
            0x100..=0xFFFF => (1, 2),
            _ => (2, 4),
        };
        let mut flags = width_bits | 0x10;
        if self.creation_order.is_some() {
            flags |= 0x04;
        }
        let link_type = match &self.target {
            LinkTarget::Hard(_) => 0,
            LinkTarget::Soft(_) => 1,
            other => {
                return Err(FormatError::Unsupported(format!(
                    "serialising link target {other:?}"
                )))
            }
        };
        if link_type != 0 {
            flags |= 0x08;
        }

        let mut buf = vec![1, flags];
        if link_type != 0 {
            buf.push(link_type);
        }
        if let Some(order) = self.creation_order {
            buf.extend_from_slice(&order.to_le_bytes());
        }
        // UTF-8 names
        buf.push(1);
        write_uint(&mut buf, name.len() as u64, width);
        buf.extend_from_slice(name);
        match &self.target {
            LinkTarget::Hard(address) => write_uint(&mut buf, *address, offset_size as usize),
            LinkTarget::Soft(path) => {
                let len = u16::try_from(path.len())
                    .map_err(|_| FormatError::Unsupported("soft link path over 64 KiB".into()))?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(path.as_bytes());
            }
            _ => {}
        }
        Ok(buf)
    }
}

/// Where a new-style group keeps its links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub max_creation_order: Option<u64>,
    /// Set when links live in dense storage instead of link messages.
    pub fractal_heap: Option<u64>,
    pub name_index: Option<u64>,
}

impl LinkInfo {
    pub fn compact() -> LinkInfo {
        LinkInfo {
            max_creation_order: None,
            fractal_heap: None,
            name_index: None,
        }
    }

    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkInfo, FormatError> {
        ensure_len(data, 0, 2)?;
        if data[0] != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "link info",
                version: data[0],
            });
        }
        let flags = data[1];
        let mut pos = 2;
        let max_creation_order = if flags & 0x01 != 0 {
            pos += 8;
            Some(read_uint(data, 2, 8)?)
        } else {
            None
        };
        let os = offset_size as usize;
        let address = |p: usize| -> Result<Option<u64>, FormatError> {
            let a = read_offset(data, p, offset_size)?;
            Ok((!is_undefined(a, offset_size)).then_some(a))
        };
        Ok(LinkInfo {
            max_creation_order,
            fractal_heap: address(pos)?,
            name_index: address(pos + os)?,
        })
    }

    pub fn serialize(&self, offset_size: u8) -> Vec<u8> {
        let os = offset_size as usize;
        let mut buf = vec![0, u8::from(self.max_creation_order.is_some())];
        if let Some(order) = self.max_creation_order {
            buf.extend_from_slice(&order.to_le_bytes());
        }
        write_uint(&mut buf, self.fractal_heap.unwrap_or(u64::MAX), os);
        write_uint(&mut buf, self.name_index.unwrap_or(u64::MAX), os);
        buf
    }
}
