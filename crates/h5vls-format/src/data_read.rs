//! Hyperslab reads over compact, contiguous and chunked storage.

use crate::chunk_index::ChunkTable;
use crate::data_layout::DataLayout;
use crate::error::FormatError;
use crate::filter_pipeline::FilterPipeline;
use crate::filters::decode_chunk;

/// Everything needed to read raw elements of one dataset.
#[derive(Debug, Clone, Copy)]
pub struct Storage<'a> {
    /// Whole file image.
    pub file: &'a [u8],
    pub layout: &'a DataLayout,
    pub filters: &'a FilterPipeline,
    pub chunks: &'a ChunkTable,
    /// Dataset extents; empty for scalars.
    pub dims: &'a [u64],
    pub element_size: usize,
}

impl Storage<'_> {
    /// Read the block `[start, start + count)` as row-major element bytes.
    /// Storage that was never written reads as zeros.
    pub fn read_hyperslab(&self, start: &[u64], count: &[u64]) -> Result<Vec<u8>, FormatError> {
        check_selection(self.dims, start, count)?;
        let total = count
            .iter()
            .try_fold(self.element_size as u64, |acc, &c| acc.checked_mul(c))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(FormatError::SizeOverflow("hyperslab buffer"))?;
        let mut out = vec![0u8; total];
        if total == 0 {
            return Ok(out);
        }

        match self.layout {
            DataLayout::Compact { data } => {
                copy_region(data, self.dims, start, &mut out, count, &vec![0; count.len()], count, self.element_size)?;
            }
            DataLayout::Contiguous { address: None, .. } => {}
            DataLayout::Contiguous {
                address: Some(address),
                size,
            } => {
                let begin = to_usize(*address)?;
                let end = begin
                    .checked_add(to_usize(*size)?)
                    .ok_or(FormatError::SizeOverflow("contiguous extent"))?;
                let src = self.file.get(begin..end).ok_or(FormatError::UnexpectedEof {
                    expected: end,
                    available: self.file.len(),
                })?;
                copy_region(src, self.dims, start, &mut out, count, &vec![0; count.len()], count, self.element_size)?;
            }
            DataLayout::Chunked { chunk_dims, .. } => self.read_chunked(chunk_dims, start, count, &mut out)?,
            DataLayout::Virtual => {
                return Err(FormatError::Unsupported("virtual dataset layout".into()))
            }
        }
        Ok(out)
    }

    fn read_chunked(&self, chunk_dims: &[u64], start: &[u64], count: &[u64], out: &mut [u8]) -> Result<(), FormatError> {
        let rank = self.dims.len();
        if chunk_dims.len() != rank {
            return Err(FormatError::RankMismatch {
                selection: chunk_dims.len(),
                dataset: rank,
            });
        }
        let first: Vec<u64> = (0..rank).map(|d| start[d] / chunk_dims[d]).collect();
        let last: Vec<u64> = (0..rank).map(|d| (start[d] + count[d] - 1) / chunk_dims[d]).collect();
        let mut idx = first.clone();

        loop {
            let offsets: Vec<u64> = idx.iter().zip(chunk_dims).map(|(i, c)| i * c).collect();
            if let Some(record) = self.chunks.get(&offsets) {
                let lo: Vec<u64> = (0..rank).map(|d| offsets[d].max(start[d])).collect();
                let extent: Vec<u64> = (0..rank)
                    .map(|d| (offsets[d] + chunk_dims[d]).min(start[d] + count[d]) - lo[d])
                    .collect();
                let src_origin: Vec<u64> = (0..rank).map(|d| lo[d] - offsets[d]).collect();
                let dst_origin: Vec<u64> = (0..rank).map(|d| lo[d] - start[d]).collect();

                let begin = to_usize(record.address)?;
                let end = begin
                    .checked_add(to_usize(record.stored_size)?)
                    .ok_or(FormatError::SizeOverflow("chunk extent"))?;
                let stored = self.file.get(begin..end).ok_or(FormatError::UnexpectedEof {
                    expected: end,
                    available: self.file.len(),
                })?;
                tracing::trace!(?offsets, stored = stored.len(), "reading chunk");
                let raw = if self.filters.is_empty() {
                    stored.to_vec()
                } else {
                    decode_chunk(stored, self.filters, record.filter_mask, self.element_size)?
                };
                copy_region(&raw, chunk_dims, &src_origin, out, count, &dst_origin, &extent, self.element_size)?;
            }

            // odometer over chunk indices, last dimension fastest
            let mut d = rank;
            loop {
                if d == 0 {
                    return Ok(());
                }
                d -= 1;
                if idx[d] < last[d] {
                    idx[d] += 1;
                    break;
                }
                idx[d] = first[d];
            }
        }
    }
}

fn check_selection(dims: &[u64], start: &[u64], count: &[u64]) -> Result<(), FormatError> {
    if start.len() != dims.len() || count.len() != dims.len() {
        return Err(FormatError::RankMismatch {
            selection: start.len().max(count.len()),
            dataset: dims.len(),
        });
    }
    for (dim, ((&s, &c), &extent)) in start.iter().zip(count).zip(dims).enumerate() {
        if s.checked_add(c).is_none_or(|end| end > extent) {
            return Err(FormatError::SelectionOutOfBounds {
                dim,
                start: s,
                count: c,
                extent,
            });
        }
    }
    Ok(())
}

fn strides(dims: &[u64]) -> Vec<u64> {
    let mut out = vec![1u64; dims.len()];
    for d in (0..dims.len().saturating_sub(1)).rev() {
        out[d] = out[d + 1] * dims[d + 1];
    }
    out
}

/// Copy an `extent`-sized box from `src` (shaped `src_dims`, box at
/// `src_origin`) into `dst` (shaped `dst_dims`, box at `dst_origin`).
/// Rank 0 copies a single element.
#[allow(clippy::too_many_arguments)]
fn copy_region(
    src: &[u8],
    src_dims: &[u64],
    src_origin: &[u64],
    dst: &mut [u8],
    dst_dims: &[u64],
    dst_origin: &[u64],
    extent: &[u64],
    element_size: usize,
) -> Result<(), FormatError> {
    let rank = extent.len();
    if extent.contains(&0) {
        return Ok(());
    }
    let (run, outer) = match rank {
        0 => (element_size, 0),
        _ => (extent[rank - 1] as usize * element_size, rank - 1),
    };
    let src_strides = strides(src_dims);
    let dst_strides = strides(dst_dims);
    let mut idx = vec![0u64; outer];

    loop {
        let linear = |origin: &[u64], strides: &[u64]| -> u64 {
            (0..rank)
                .map(|d| (origin[d] + idx.get(d).copied().unwrap_or(0)) * strides[d])
                .sum()
        };
        let s = linear(src_origin, &src_strides) as usize * element_size;
        let t = linear(dst_origin, &dst_strides) as usize * element_size;
        let from = src.get(s..s + run).ok_or(FormatError::UnexpectedEof {
            expected: s + run,
            available: src.len(),
        })?;
        dst[t..t + run].copy_from_slice(from);

        let mut d = outer;
        loop {
            if d == 0 {
                return Ok(());
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < extent[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

fn to_usize(v: u64) -> Result<usize, FormatError> {
    usize::try_from(v).map_err(|_| FormatError::SizeOverflow("file address"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree_v1::{build_chunk_tree, ChunkKey};
    use crate::chunk_index::ChunkGrid;
    use crate::data_layout::ChunkIndex;
    use crate::filter_pipeline::Filter;
    use crate::filters::encode_chunk;

    fn values(dims: &[u64]) -> Vec<u8> {
        let n: u64 = dims.iter().product();
        (0..n).flat_map(|i| (i as u16).to_le_bytes()).collect()
    }

    fn expected(dims: &[u64], start: &[u64], count: &[u64]) -> Vec<u8> {
        let all = values(dims);
        let mut out = Vec::new();
        for i in start[0]..start[0] + count[0] {
            for j in start[1]..start[1] + count[1] {
                let k = ((i * dims[1] + j) * 2) as usize;
                out.extend_from_slice(&all[k..k + 2]);
            }
        }
        out
    }

    /// A 2-D u16 dataset stored in chunks indexed by a v1 B-tree; chunk
    /// `skip` is left unallocated.
    fn chunked_file(dims: &[u64], chunk: &[u64], filters: &FilterPipeline, skip: Option<usize>) -> (Vec<u8>, DataLayout) {
        let all = values(dims);
        let mut file = vec![0u8; 16];
        let mut entries = Vec::new();
        for (n, offsets) in ChunkGrid::new(dims, chunk).enumerate() {
            let mut raw = vec![0u8; (chunk[0] * chunk[1] * 2) as usize];
            for i in 0..chunk[0] {
                for j in 0..chunk[1] {
                    let (r, c) = (offsets[0] + i, offsets[1] + j);
                    if r < dims[0] && c < dims[1] {
                        let k = ((r * dims[1] + c) * 2) as usize;
                        let t = ((i * chunk[1] + j) * 2) as usize;
                        raw[t..t + 2].copy_from_slice(&all[k..k + 2]);
                    }
                }
            }
            if Some(n) == skip {
                continue;
            }
            let stored = encode_chunk(&raw, filters, 2).unwrap();
            let key = ChunkKey { size: stored.len() as u32, filter_mask: 0, offsets };
            entries.push((key, file.len() as u64));
            file.extend_from_slice(&stored);
        }
        let upper = ChunkKey { size: 0, filter_mask: 0, offsets: dims.to_vec() };
        let base = file.len() as u64;
        let (tree, root) = build_chunk_tree(&entries, 2, &upper, base);
        file.extend_from_slice(&tree);
        let layout = DataLayout::Chunked {
            chunk_dims: chunk.to_vec(),
            element_size: 2,
            index: ChunkIndex::BTreeV1,
            address: Some(root),
        };
        (file, layout)
    }

    #[test]
    fn contiguous_hyperslab() {
        let dims = [7u64, 9];
        let mut file = vec![0u8; 32];
        file.extend_from_slice(&values(&dims));
        let layout = DataLayout::Contiguous { address: Some(32), size: 7 * 9 * 2 };
        let pipeline = FilterPipeline::default();
        let chunks = ChunkTable::default();
        let storage = Storage { file: &file, layout: &layout, filters: &pipeline, chunks: &chunks, dims: &dims, element_size: 2 };
        assert_eq!(storage.read_hyperslab(&[2, 3], &[4, 5]).unwrap(), expected(&dims, &[2, 3], &[4, 5]));
        assert_eq!(storage.read_hyperslab(&[0, 0], &[7, 9]).unwrap(), values(&dims));
        assert!(storage.read_hyperslab(&[0, 0], &[0, 9]).unwrap().is_empty());
    }

    #[test]
    fn chunked_hyperslab_with_filters() {
        let dims = [23u64, 17];
        let pipeline = FilterPipeline { filters: vec![Filter::shuffle(), Filter::deflate(4)] };
        let (file, layout) = chunked_file(&dims, &[5, 4], &pipeline, None);
        let chunks = ChunkTable::load(&file, &layout, &dims, 8, 8).unwrap();
        let storage = Storage { file: &file, layout: &layout, filters: &pipeline, chunks: &chunks, dims: &dims, element_size: 2 };
        for (start, count) in [([0, 0], [23, 17]), ([3, 2], [11, 13]), ([22, 16], [1, 1]), ([4, 0], [1, 17])] {
            assert_eq!(storage.read_hyperslab(&start, &count).unwrap(), expected(&dims, &start, &count));
        }
    }

    #[test]
    fn unallocated_chunk_reads_as_zero() {
        let dims = [4u64, 4];
        let pipeline = FilterPipeline::default();
        let (file, layout) = chunked_file(&dims, &[2, 2], &pipeline, Some(1));
        let chunks = ChunkTable::load(&file, &layout, &dims, 8, 8).unwrap();
        let storage = Storage { file: &file, layout: &layout, filters: &pipeline, chunks: &chunks, dims: &dims, element_size: 2 };
        let out = storage.read_hyperslab(&[0, 2], &[2, 2]).unwrap();
        assert_eq!(out, vec![0u8; 8]);
        let out = storage.read_hyperslab(&[2, 2], &[1, 1]).unwrap();
        assert_eq!(out, expected(&dims, &[2, 2], &[1, 1]));
    }

    #[test]
    fn unallocated_contiguous_reads_as_zero() {
        let layout = DataLayout::Contiguous { address: None, size: 0 };
        let pipeline = FilterPipeline::default();
        let chunks = ChunkTable::default();
        let storage = Storage { file: &[], layout: &layout, filters: &pipeline, chunks: &chunks, dims: &[5], element_size: 4 };
        assert_eq!(storage.read_hyperslab(&[1], &[3]).unwrap(), vec![0u8; 12]);
    }

    #[test]
    fn compact_scalar() {
        let layout = DataLayout::Compact { data: vec![7, 0, 0, 0] };
        let pipeline = FilterPipeline::default();
        let chunks = ChunkTable::default();
        let storage = Storage { file: &[], layout: &layout, filters: &pipeline, chunks: &chunks, dims: &[], element_size: 4 };
        assert_eq!(storage.read_hyperslab(&[], &[]).unwrap(), vec![7, 0, 0, 0]);
    }

    #[test]
    fn selection_errors() {
        let layout = DataLayout::Contiguous { address: None, size: 0 };
        let pipeline = FilterPipeline::default();
        let chunks = ChunkTable::default();
        let storage = Storage { file: &[], layout: &layout, filters: &pipeline, chunks: &chunks, dims: &[5, 5], element_size: 1 };
        assert_eq!(
            storage.read_hyperslab(&[0, 3], &[1, 3]),
            Err(FormatError::SelectionOutOfBounds { dim: 1, start: 3, count: 3, extent: 5 })
        );
        assert_eq!(
            storage.read_hyperslab(&[0], &[1]),
            Err(FormatError::RankMismatch { selection: 1, dataset: 2 })
        );
    }

    #[test]
    fn truncated_contiguous_storage() {
        let layout = DataLayout::Contiguous { address: Some(4), size: 100 };
        let pipeline = FilterPipeline::default();
        let chunks = ChunkTable::default();
        let file = vec![0u8; 20];
        let storage = Storage { file: &file, layout: &layout, filters: &pipeline, chunks: &chunks, dims: &[100], element_size: 1 };
        assert!(matches!(storage.read_hyperslab(&[0], &[1]), Err(FormatError::UnexpectedEof { .. })));
    }
}
