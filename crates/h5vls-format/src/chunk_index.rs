//! Locating the chunks of a chunked dataset.

use std::collections::HashMap;

use crate::btree_v1;
use crate::bytes::{ensure_len, is_undefined, read_offset, read_uint};
use crate::checksum::verify_trailing_checksum;
use crate::data_layout::{ChunkIndex, DataLayout};
use crate::error::FormatError;

/// Where one chunk lives and how it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub address: u64,
    pub stored_size: u64,
    pub filter_mask: u32,
}

/// Allocated chunks of a dataset keyed by their element offsets.
#[derive(Debug, Clone, Default)]
pub struct ChunkTable {
    chunks: HashMap<Vec<u64>, ChunkRecord>,
}

impl ChunkTable {
    pub fn get(&self, offsets: &[u64]) -> Option<&ChunkRecord> {
        self.chunks.get(offsets)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn insert(&mut self, offsets: Vec<u64>, record: ChunkRecord) {
        self.chunks.insert(offsets, record);
    }

    /// Read the chunk index of a chunked layout. `dims` are the dataset
    /// extents; non-chunked layouts give an empty table.
    pub fn load(
        data: &[u8],
        layout: &DataLayout,
        dims: &[u64],
        offset_size: u8,
        length_size: u8,
    ) -> Result<ChunkTable, FormatError> {
        let DataLayout::Chunked {
            chunk_dims,
            element_size,
            index,
            address,
        } = layout
        else {
            return Ok(ChunkTable::default());
        };
        let mut table = ChunkTable::default();
        let Some(address) = *address else {
            return Ok(table);
        };
        if chunk_dims.len() != dims.len() {
            return Err(FormatError::RankMismatch {
                selection: chunk_dims.len(),
                dataset: dims.len(),
            });
        }
        let chunk_bytes = chunk_dims
            .iter()
            .try_fold(*element_size, |acc, &d| acc.checked_mul(d))
            .ok_or(FormatError::SizeOverflow("chunk size"))?;

        match index {
            ChunkIndex::BTreeV1 => {
                for (key, addr) in btree_v1::chunk_entries(data, address, offset_size, dims.len())? {
                    table.insert(
                        key.offsets,
                        ChunkRecord {
                            address: addr,
                            stored_size: key.size as u64,
                            filter_mask: key.filter_mask,
                        },
                    );
                }
            }
            ChunkIndex::Single { filtered } => {
                let (stored_size, filter_mask) = filtered.unwrap_or((chunk_bytes, 0));
                table.insert(
                    vec![0; dims.len()],
                    ChunkRecord {
                        address,
                        stored_size,
                        filter_mask,
                    },
                );
            }
            ChunkIndex::Implicit => {
                for (i, offsets) in ChunkGrid::new(dims, chunk_dims).enumerate() {
                    table.insert(
                        offsets,
                        ChunkRecord {
                            address: address + i as u64 * chunk_bytes,
                            stored_size: chunk_bytes,
                            filter_mask: 0,
                        },
                    );
                }
            }
            ChunkIndex::FixedArray => {
                load_fixed_array(data, address, dims, chunk_dims, chunk_bytes, offset_size, length_size, &mut table)?;
            }
            ChunkIndex::ExtensibleArray => {
                return Err(FormatError::Unsupported("extensible array chunk index".into()))
            }
            ChunkIndex::BTreeV2 => {
                return Err(FormatError::Unsupported("v2 B-tree chunk index".into()))
            }
        }
        tracing::trace!(chunks = table.len(), "loaded chunk index");
        Ok(table)
    }
}

/// Element offsets of every chunk covering `dims`, in row-major order.
pub struct ChunkGrid {
    chunk_dims: Vec<u64>,
    counts: Vec<u64>,
    cursor: Option<Vec<u64>>,
}

impl ChunkGrid {
    pub fn new(dims: &[u64], chunk_dims: &[u64]) -> ChunkGrid {
        let counts: Vec<u64> = dims
            .iter()
            .zip(chunk_dims)
            .map(|(&d, &c)| if c == 0 { 0 } else { d.div_ceil(c) })
            .collect();
        let cursor = (!counts.contains(&0)).then(|| vec![0; counts.len()]);
        ChunkGrid {
            chunk_dims: chunk_dims.to_vec(),
            counts,
            cursor,
        }
    }
}

impl Iterator for ChunkGrid {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Vec<u64>> {
        let current = self.cursor.take()?;
        let offsets = current.iter().zip(&self.chunk_dims).map(|(i, c)| i * c).collect();
        let mut following = current;
        let mut d = following.len();
        loop {
            if d == 0 {
                break;
            }
            d -= 1;
            following[d] += 1;
            if following[d] < self.counts[d] {
                self.cursor = Some(following);
                break;
            }
            following[d] = 0;
        }
        Some(offsets)
    }
}

#[allow(clippy::too_many_arguments)]
fn load_fixed_array(
    data: &[u8],
    header_address: u64,
    dims: &[u64],
    chunk_dims: &[u64],
    chunk_bytes: u64,
    offset_size: u8,
    length_size: u8,
    table: &mut ChunkTable,
) -> Result<(), FormatError> {
    let os = offset_size as usize;
    let ls = length_size as usize;
    let hdr = to_usize(header_address)?;
    ensure_len(data, hdr, 8 + ls + os + 4)?;
    if &data[hdr..hdr + 4] != b"FAHD" {
        return Err(FormatError::InvalidSignature("fixed array header"));
    }
    if data[hdr + 4] != 0 {
        return Err(FormatError::UnsupportedVersion {
            structure: "fixed array header",
            version: data[hdr + 4],
        });
    }
    let client = data[hdr + 5];
    let entry_size = data[hdr + 6] as usize;
    let page_bits = data[hdr + 7];
    let count = read_uint(data, hdr + 8, ls)?;
    let block = to_usize(read_offset(data, hdr + 8 + ls, offset_size)?)?;
    verify_trailing_checksum(&data[hdr..], 8 + ls + os)?;

    let filtered = client == 1;
    let size_width = if filtered {
        entry_size
            .checked_sub(os + 4)
            .filter(|w| (1..=8).contains(w))
            .ok_or_else(|| FormatError::Unsupported(format!("fixed array entry size {entry_size}")))?
    } else {
        0
    };

    ensure_len(data, block, 6 + os)?;
    if &data[block..block + 4] != b"FADB" {
        return Err(FormatError::InvalidSignature("fixed array data block"));
    }

    let count = to_usize(count)?;
    let page_len = 1usize.checked_shl(page_bits as u32).unwrap_or(usize::MAX);
    let mut pos = block + 6 + os;
    // (first entry index, entry count, byte position) for each stored run
    let mut runs = Vec::new();
    if count > page_len {
        let pages = count.div_ceil(page_len);
        let bitmap_len = pages.div_ceil(8);
        ensure_len(data, pos, bitmap_len + 4)?;
        let bitmap = &data[pos..pos + bitmap_len];
        pos += bitmap_len + 4;
        for p in 0..pages {
            let n = page_len.min(count - p * page_len);
            if bitmap[p / 8] & (0x80 >> (p % 8)) != 0 {
                runs.push((p * page_len, n, pos));
            }
            pos += n * entry_size + 4;
        }
    } else {
        runs.push((0, count, pos));
    }

    let mut grid = ChunkGrid::new(dims, chunk_dims).enumerate();
    for (first, n, mut pos) in runs {
        ensure_len(data, pos, n * entry_size)?;
        for i in first..first + n {
            let address = read_offset(data, pos, offset_size)?;
            let (stored_size, filter_mask) = if filtered {
                (
                    read_uint(data, pos + os, size_width)?,
                    read_uint(data, pos + os + size_width, 4)? as u32,
                )
            } else {
                (chunk_bytes, 0)
            };
            pos += entry_size;
            let offsets = loop {
                match grid.next() {
                    Some((j, offsets)) if j == i => break Some(offsets),
                    Some((j, _)) if j < i => continue,
                    _ => break None,
                }
            };
            let Some(offsets) = offsets else {
                return Ok(());
            };
            if !is_undefined(address, offset_size) {
                table.insert(
                    offsets,
                    ChunkRecord {
                        address,
                        stored_size,
                        filter_mask,
                    },
                );
            }
        }
    }
    Ok(())
}

fn to_usize(v: u64) -> Result<usize, FormatError> {
    usize::try_from(v).map_err(|_| FormatError::SizeOverflow("file address"))
}
