//! Walking a dataset block by block.

/// Row-major iteration over the blocks of an N-dimensional extent, last
/// dimension fastest. Edge blocks are truncated to the extent.
#[derive(Debug, Clone)]
pub struct NdBlockIter {
    dims: Vec<u64>,
    block: Vec<u64>,
    starts: Vec<u64>,
    counts: Vec<u64>,
    finished: bool,
}

impl NdBlockIter {
    /// `dims` and `block` must have the same length. Any zero extent
    /// leaves the iterator finished from the start.
    pub fn new(dims: &[u64], block: &[u64]) -> Self {
        let finished = dims.len() != block.len() || dims.contains(&0) || block.contains(&0);
        let counts = if finished {
            vec![0; dims.len()]
        } else {
            block.iter().zip(dims).map(|(&b, &d)| b.min(d)).collect()
        };
        Self {
            dims: dims.to_vec(),
            block: block.to_vec(),
            starts: vec![0; dims.len()],
            counts,
            finished,
        }
    }

    pub fn dimensions(&self) -> &[u64] {
        &self.dims
    }

    pub fn block_dimensions(&self) -> &[u64] {
        &self.block
    }

    /// Start of the current block.
    pub fn starts(&self) -> &[u64] {
        &self.starts
    }

    /// Extents of the current block.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Elements in the current block.
    pub fn current_block_size(&self) -> u64 {
        self.counts.iter().product()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Move to the next block.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        if self.finished {
            return;
        }
        for d in (0..self.dims.len()).rev() {
            let next = self.starts[d] + self.block[d];
            if next < self.dims[d] {
                self.starts[d] = next;
                self.counts[d] = self.block[d].min(self.dims[d] - next);
                return;
            }
            self.starts[d] = 0;
            self.counts[d] = self.block[d].min(self.dims[d]);
        }
        self.finished = true;
    }
}

/// `(start, count)` pairs covering `[0, length)` in blocks of `block`.
pub fn iterate_1d_blocks(length: u64, block: u64) -> impl Iterator<Item = (u64, u64)> {
    let step = block.max(1);
    (0..length)
        .step_by(usize::try_from(step).unwrap_or(usize::MAX))
        .map(move |start| (start, step.min(length - start)))
}
