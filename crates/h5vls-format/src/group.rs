//! Group membership: old-style symbol tables and new-style link messages.

use crate::btree_v1;
use crate::bytes::{ensure_len, read_offset, read_u16, read_uint};
use crate::error::FormatError;
use crate::link::{Link, LinkInfo};
use crate::message_type::MessageType;
use crate::object_header::ObjectHeader;

/// Data segment of a local heap, holding symbol names.
#[derive(Debug, Clone)]
pub struct LocalHeap {
    pub data_address: u64,
    pub data_size: u64,
}

impl LocalHeap {
    pub fn parse(data: &[u8], address: usize, offset_size: u8, length_size: u8) -> Result<LocalHeap, FormatError> {
        let ls = length_size as usize;
        ensure_len(data, address, 8 + 2 * ls + offset_size as usize)?;
        if &data[address..address + 4] != b"HEAP" {
            return Err(FormatError::InvalidSignature("local heap"));
        }
        if data[address + 4] != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "local heap",
                version: data[address + 4],
            });
        }
        Ok(LocalHeap {
            data_size: read_uint(data, address + 8, ls)?,
            data_address: read_offset(data, address + 8 + 2 * ls, offset_size)?,
        })
    }

    /// NUL-terminated string at `offset` within the data segment.
    pub fn string_at(&self, data: &[u8], offset: u64) -> Result<String, FormatError> {
        if offset >= self.data_size {
            return Err(FormatError::UnexpectedEof {
                expected: offset as usize,
                available: self.data_size as usize,
            });
        }
        let start = usize::try_from(self.data_address + offset)
            .map_err(|_| FormatError::SizeOverflow("local heap offset"))?;
        let end_of_segment = (self.data_address + self.data_size) as usize;
        ensure_len(data, start, 1)?;
        let segment = &data[start..end_of_segment.min(data.len())];
        let len = segment.iter().position(|&b| b == 0).unwrap_or(segment.len());
        Ok(String::from_utf8_lossy(&segment[..len]).into_owned())
    }
}

/// Entries of one symbol table node: `(name offset, object header address)`.
fn symbol_node(data: &[u8], address: usize, offset_size: u8) -> Result<Vec<(u64, u64)>, FormatError> {
    let os = offset_size as usize;
    ensure_len(data, address, 8)?;
    if &data[address..address + 4] != b"SNOD" {
        return Err(FormatError::InvalidSignature("symbol table node"));
    }
    let count = read_u16(data, address + 6)? as usize;
    let entry_len = 2 * os + 24;
    ensure_len(data, address + 8, count * entry_len)?;
    (0..count)
        .map(|i| {
            let pos = address + 8 + i * entry_len;
            Ok((read_offset(data, pos, offset_size)?, read_offset(data, pos + os, offset_size)?))
        })
        .collect()
}

/// The links of the group whose object header is `header`.
///
/// Old-style groups are read through their symbol table; new-style groups
/// through their link messages. Dense link storage is not supported.
pub fn read_links(
    data: &[u8],
    header: &ObjectHeader,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<Link>, FormatError> {
    if let Some(msg) = header.find(MessageType::SymbolTable) {
        let btree = read_offset(&msg.data, 0, offset_size)?;
        let heap_addr = read_offset(&msg.data, offset_size as usize, offset_size)?;
        let heap = LocalHeap::parse(data, to_usize(heap_addr)?, offset_size, length_size)?;
        let mut links = Vec::new();
        for node in btree_v1::group_leaves(data, btree, offset_size, length_size)? {
            for (name_offset, address) in symbol_node(data, to_usize(node)?, offset_size)? {
                let name = heap.string_at(data, name_offset)?;
                links.push(Link::hard(&name, address));
            }
        }
        return Ok(links);
    }

    if let Some(msg) = header.find(MessageType::LinkInfo) {
        if LinkInfo::parse(&msg.data, offset_size)?.fractal_heap.is_some() {
            return Err(FormatError::Unsupported("dense link storage".into()));
        }
    }
    header
        .find_all(MessageType::Link)
        .map(|msg| Link::parse(&msg.data, offset_size))
        .collect()
}

/// True when the object header describes a group.
pub fn is_group(header: &ObjectHeader) -> bool {
    [MessageType::SymbolTable, MessageType::LinkInfo, MessageType::Link]
        .into_iter()
        .any(|t| header.find(t).is_some())
        && header.find(MessageType::DataLayout).is_none()
}

fn to_usize(v: u64) -> Result<usize, FormatError> {
    usize::try_from(v).map_err(|_| FormatError::SizeOverflow("file address"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkTarget;
    use crate::object_header_writer::ObjectHeaderWriter;

    fn put(file: &mut Vec<u8>, at: usize, bytes: &[u8]) {
        if file.len() < at + bytes.len() {
            file.resize(at + bytes.len(), 0);
        }
        file[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Old-style group at 0 with a symbol table pointing at a one-leaf
    /// B-tree, a single SNOD and a local heap holding two names.
    fn symbol_table_file() -> (Vec<u8>, ObjectHeader) {
        let mut file = Vec::new();
        // local heap header at 100, data segment at 200
        let mut heap = b"HEAP\0\0\0\0".to_vec();
        heap.extend_from_slice(&32u64.to_le_bytes());
        heap.extend_from_slice(&u64::MAX.to_le_bytes());
        heap.extend_from_slice(&200u64.to_le_bytes());
        put(&mut file, 100, &heap);
        put(&mut file, 200, b"\0\0\0\0\0\0\0\0alpha\0\0\0beta\0");
        put(&mut file, 231, &[0]);

        // SNOD at 300
        let mut snod = b"SNOD\x01\0".to_vec();
        snod.extend_from_slice(&2u16.to_le_bytes());
        for (name, addr) in [(8u64, 0x1000u64), (16, 0x2000)] {
            snod.extend_from_slice(&name.to_le_bytes());
            snod.extend_from_slice(&addr.to_le_bytes());
            snod.extend_from_slice(&[0; 24]);
        }
        put(&mut file, 300, &snod);

        // B-tree leaf at 500
        let mut tree = b"TREE\0\0".to_vec();
        tree.extend_from_slice(&1u16.to_le_bytes());
        tree.extend_from_slice(&[0xFF; 16]);
        tree.extend_from_slice(&0u64.to_le_bytes());
        tree.extend_from_slice(&300u64.to_le_bytes());
        tree.extend_from_slice(&16u64.to_le_bytes());
        put(&mut file, 500, &tree);

        let mut stab = 500u64.to_le_bytes().to_vec();
        stab.extend_from_slice(&100u64.to_le_bytes());
        let oh = ObjectHeaderWriter::new()
            .message(MessageType::SymbolTable, stab)
            .finish();
        put(&mut file, 1000, &oh);
        let header = ObjectHeader::parse(&file, 1000, 8, 8).unwrap();
        (file, header)
    }

    #[test]
    fn symbol_table_group() {
        let (file, header) = symbol_table_file();
        assert!(is_group(&header));
        let links = read_links(&file, &header, 8, 8).unwrap();
        assert_eq!(links, vec![Link::hard("alpha", 0x1000), Link::hard("beta", 0x2000)]);
    }

    #[test]
    fn compact_link_group() {
        let header_bytes = ObjectHeaderWriter::new()
            .message(MessageType::LinkInfo, LinkInfo::compact().serialize(8))
            .message(MessageType::Link, Link::hard("a", 64).serialize(8).unwrap())
            .message(MessageType::Link, Link::hard("b", 128).serialize(8).unwrap())
            .finish();
        let header = ObjectHeader::parse(&header_bytes, 0, 8, 8).unwrap();
        let links = read_links(&header_bytes, &header, 8, 8).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].target, LinkTarget::Hard(128));
    }

    #[test]
    fn dense_storage_is_unsupported() {
        let info = LinkInfo {
            max_creation_order: None,
            fractal_heap: Some(0x40),
            name_index: Some(0x80),
        };
        let bytes = ObjectHeaderWriter::new()
            .message(MessageType::LinkInfo, info.serialize(8))
            .finish();
        let header = ObjectHeader::parse(&bytes, 0, 8, 8).unwrap();
        assert!(matches!(
            read_links(&bytes, &header, 8, 8),
            Err(FormatError::Unsupported(_))
        ));
    }

    #[test]
    fn heap_offset_past_segment() {
        let (file, _) = symbol_table_file();
        let heap = LocalHeap::parse(&file, 100, 8, 8).unwrap();
        assert_eq!(heap.string_at(&file, 8).unwrap(), "alpha");
        assert!(heap.string_at(&file, 40).is_err());
    }
}
