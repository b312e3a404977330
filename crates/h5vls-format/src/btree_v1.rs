//! Version 1 B-trees: group nodes (type 0) and raw-data chunk nodes (type 1).

use crate::bytes::{ensure_len, is_undefined, read_offset, read_u16, read_u32, read_uint, write_uint};
use crate::error::FormatError;

const TREE_SIGNATURE: &[u8; 4] = b"TREE";

/// Deepest tree we are willing to descend.
const MAX_DEPTH: usize = 64;

/// Entries per node emitted by [`build_chunk_tree`].
pub const CHUNK_NODE_FANOUT: usize = 64;

/// Key of a chunk node entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    /// Stored (possibly filtered) size of the chunk in bytes.
    pub size: u32,
    pub filter_mask: u32,
    /// Element offsets of the chunk, without the trailing element dimension.
    pub offsets: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKeys {
    /// Heap offsets of the last name in each child.
    Group(Vec<u64>),
    Chunk(Vec<ChunkKey>),
}

/// A single parsed node.
#[derive(Debug, Clone)]
pub struct BTreeV1Node {
    pub node_type: u8,
    /// 0 for leaves.
    pub level: u8,
    pub left_sibling: Option<u64>,
    pub right_sibling: Option<u64>,
    /// `children.len() + 1` keys.
    pub keys: NodeKeys,
    pub children: Vec<u64>,
}

impl BTreeV1Node {
    /// Parse a node. `rank` is the chunk rank (without the element
    /// dimension) and is only consulted for type 1 nodes.
    pub fn parse(
        data: &[u8],
        address: usize,
        offset_size: u8,
        length_size: u8,
        rank: usize,
    ) -> Result<BTreeV1Node, FormatError> {
        let os = offset_size as usize;
        ensure_len(data, address, 8 + 2 * os)?;
        if &data[address..address + 4] != TREE_SIGNATURE {
            return Err(FormatError::InvalidSignature("v1 B-tree"));
        }
        let node_type = data[address + 4];
        let level = data[address + 5];
        let entries = read_u16(data, address + 6)? as usize;
        let sibling = |pos: usize| -> Result<Option<u64>, FormatError> {
            let a = read_offset(data, pos, offset_size)?;
            Ok((!is_undefined(a, offset_size)).then_some(a))
        };
        let left_sibling = sibling(address + 8)?;
        let right_sibling = sibling(address + 8 + os)?;
        let mut pos = address + 8 + 2 * os;

        let mut children = Vec::with_capacity(entries);
        let keys = match node_type {
            0 => {
                let ls = length_size as usize;
                let mut keys = Vec::with_capacity(entries + 1);
                for i in 0..=entries {
                    keys.push(read_uint(data, pos, ls)?);
                    pos += ls;
                    if i < entries {
                        children.push(read_offset(data, pos, offset_size)?);
                        pos += os;
                    }
                }
                NodeKeys::Group(keys)
            }
            1 => {
                let mut keys = Vec::with_capacity(entries + 1);
                for i in 0..=entries {
                    let size = read_u32(data, pos)?;
                    let filter_mask = read_u32(data, pos + 4)?;
                    pos += 8;
                    let mut offsets = Vec::with_capacity(rank);
                    for _ in 0..rank {
                        offsets.push(read_uint(data, pos, 8)?);
                        pos += 8;
                    }
                    // trailing element-dimension offset, always zero
                    pos += 8;
                    keys.push(ChunkKey {
                        size,
                        filter_mask,
                        offsets,
                    });
                    if i < entries {
                        children.push(read_offset(data, pos, offset_size)?);
                        pos += os;
                    }
                }
                NodeKeys::Chunk(keys)
            }
            other => {
                return Err(FormatError::Unsupported(format!(
                    "v1 B-tree node type {other}"
                )))
            }
        };

        Ok(BTreeV1Node {
            node_type,
            level,
            left_sibling,
            right_sibling,
            keys,
            children,
        })
    }
}

/// Walk a type 0 tree and return the addresses of its symbol table nodes.
pub fn group_leaves(
    data: &[u8],
    root: u64,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<u64>, FormatError> {
    let mut out = Vec::new();
    walk(data, root, offset_size, length_size, 0, 0, &mut |node| {
        out.extend_from_slice(&node.children);
        Ok(())
    })?;
    Ok(out)
}

/// Walk a type 1 tree and return one `(key, chunk address)` pair per chunk.
pub fn chunk_entries(
    data: &[u8],
    root: u64,
    offset_size: u8,
    rank: usize,
) -> Result<Vec<(ChunkKey, u64)>, FormatError> {
    let mut out = Vec::new();
    walk(data, root, offset_size, 8, rank, 0, &mut |node| {
        if let NodeKeys::Chunk(keys) = &node.keys {
            out.extend(keys.iter().cloned().zip(node.children.iter().copied()));
        }
        Ok(())
    })?;
    Ok(out)
}

fn walk(
    data: &[u8],
    address: u64,
    offset_size: u8,
    length_size: u8,
    rank: usize,
    depth: usize,
    visit_leaf: &mut dyn FnMut(&BTreeV1Node) -> Result<(), FormatError>,
) -> Result<(), FormatError> {
    if depth > MAX_DEPTH {
        return Err(FormatError::Unsupported("v1 B-tree deeper than 64 levels".into()));
    }
    let address = usize::try_from(address).map_err(|_| FormatError::SizeOverflow("B-tree address"))?;
    let node = BTreeV1Node::parse(data, address, offset_size, length_size, rank)?;
    if node.level == 0 {
        return visit_leaf(&node);
    }
    for &child in &node.children {
        walk(data, child, offset_size, length_size, rank, depth + 1, visit_leaf)?;
    }
    Ok(())
}

fn encoded_node_len(entries: usize, rank: usize) -> usize {
    let key = 8 + 8 * (rank + 1);
    24 + entries * (key + 8) + key
}

fn write_chunk_key(buf: &mut Vec<u8>, key: &ChunkKey) {
    buf.extend_from_slice(&key.size.to_le_bytes());
    buf.extend_from_slice(&key.filter_mask.to_le_bytes());
    for &o in &key.offsets {
        buf.extend_from_slice(&o.to_le_bytes());
    }
    buf.extend_from_slice(&0u64.to_le_bytes());
}

/// Encode a type 1 tree over `entries` (sorted by offsets) as a block that
/// will be placed at file address `base`, using 8-byte offsets. The final
/// key of each node is `upper`, which must compare greater than every chunk
/// offset. Returns the encoded block and the address of the root node.
pub fn build_chunk_tree(
    entries: &[(ChunkKey, u64)],
    rank: usize,
    upper: &ChunkKey,
    base: u64,
) -> (Vec<u8>, u64) {
    let mut buf = Vec::new();
    // (first key of subtree, node address) for the level being built
    let mut level: Vec<(ChunkKey, u64)> = entries.to_vec();
    let mut depth = 0u8;
    loop {
        let groups: Vec<&[(ChunkKey, u64)]> = if level.is_empty() {
            vec![&level[..]]
        } else {
            level.chunks(CHUNK_NODE_FANOUT).collect()
        };
        let mut addr = base + buf.len() as u64;
        let addrs: Vec<u64> = groups
            .iter()
            .map(|g| {
                let a = addr;
                addr += encoded_node_len(g.len(), rank) as u64;
                a
            })
            .collect();

        let mut next = Vec::with_capacity(groups.len());
        for (i, group) in groups.iter().enumerate() {
            buf.extend_from_slice(TREE_SIGNATURE);
            buf.push(1);
            buf.push(depth);
            buf.extend_from_slice(&(group.len() as u16).to_le_bytes());
            let left = if i > 0 { addrs[i - 1] } else { u64::MAX };
            let right = addrs.get(i + 1).copied().unwrap_or(u64::MAX);
            write_uint(&mut buf, left, 8);
            write_uint(&mut buf, right, 8);
            for (key, child) in group.iter() {
                write_chunk_key(&mut buf, key);
                write_uint(&mut buf, *child, 8);
            }
            let last = groups.get(i + 1).and_then(|g| g.first()).map_or(upper, |(k, _)| k);
            write_chunk_key(&mut buf, last);
            let first = group.first().map_or_else(|| upper.clone(), |(k, _)| k.clone());
            next.push((first, addrs[i]));
        }

        if next.len() == 1 {
            return (buf, next[0].1);
        }
        level = next;
        depth += 1;
    }
}
