//! Choosing how many elements to load per read.
//!
//! Blocks follow the chunk grid so each read decodes whole chunks, and
//! hold no more elements than the memory budget unless a single chunk is
//! already larger.

use crate::reader::Dataset;

/// Block length for a 1-dimensional dataset of `total` elements.
pub fn plan_1d_block_size(chunk: Option<u64>, total: u64, budget: u64) -> u64 {
    let block = match chunk {
        None | Some(0) => budget,
        Some(c) if c >= budget => c,
        Some(c) => budget / c * c,
    };
    block.min(total)
}

/// Block extents for an N-dimensional dataset.
///
/// Starts from one chunk (or a single element when unchunked) and grows
/// the last dimension first, in whole chunks, while the block fits the
/// budget. A dimension that fills completely hands growth to the one
/// before it.
pub fn plan_nd_block_dimensions(chunk: Option<&[u64]>, dims: &[u64], budget: u64) -> Vec<u64> {
    let rank = dims.len();
    if dims.contains(&0) {
        return vec![0; rank];
    }
    let unit: Vec<u64> = match chunk {
        Some(c) if c.len() == rank => c.iter().map(|&x| x.max(1)).collect(),
        _ => vec![1; rank],
    };
    let mut block: Vec<u64> = unit.iter().zip(dims).map(|(&c, &d)| c.min(d)).collect();
    let mut product: u64 = block.iter().product();

    for d in (0..rank).rev() {
        let others = product / block[d];
        let Some(step) = others.checked_mul(unit[d]) else {
            break;
        };
        let multiple = budget / step;
        if multiple == 0 {
            break;
        }
        let grown = multiple.saturating_mul(unit[d]).min(dims[d]);
        if grown < dims[d] {
            block[d] = grown.max(block[d]);
            break;
        }
        block[d] = dims[d];
        product = others * dims[d];
    }
    block
}

impl Dataset {
    /// [`plan_1d_block_size`] over this dataset's length and chunking.
    /// Datasets of any other rank are treated by their first extent.
    pub fn block_size_1d(&self, budget: u64) -> u64 {
        let total = self.shape().first().copied().unwrap_or(0);
        self.block_size_for_length(total, budget)
    }

    /// [`plan_1d_block_size`] for reading only the first `length`
    /// elements, still aligned to this dataset's chunks.
    pub fn block_size_for_length(&self, length: u64, budget: u64) -> u64 {
        let chunk = self.chunk_dimensions().and_then(|c| c.first().copied());
        plan_1d_block_size(chunk, length, budget)
    }

    /// [`plan_nd_block_dimensions`] over this dataset's shape and chunking.
    pub fn block_dimensions(&self, budget: u64) -> Vec<u64> {
        plan_nd_block_dimensions(self.chunk_dimensions(), self.shape(), budget)
    }
}
