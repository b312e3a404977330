//! Checking that every pointer of a VLS array lies inside its heap,
//! without reading the heap.

use tracing::debug;

use crate::block::plan_nd_block_dimensions;
use crate::error::{Error, Result};
use crate::iterate::{iterate_1d_blocks, NdBlockIter};

use super::open::PointerArray;
use super::pointer::{pointer_in_range, Pointer};

fn check(pointers: &PointerArray, block: &[Pointer], heap_len: u64) -> Result<()> {
    if block.iter().all(|p| pointer_in_range(*p, heap_len)) {
        return Ok(());
    }
    Err(Error::out_of_range(format!(
        "pointers for VLS dataset at '{}' are out of range",
        pointers.name()
    )))
}

/// Validate the first `length` pointers of a 1-dimensional array.
pub fn validate_1d(pointers: &PointerArray, length: u64, heap_len: u64, budget: u64) -> Result<()> {
    let block = pointers.dataset().block_size_for_length(length, budget);
    for (start, count) in iterate_1d_blocks(length, block) {
        debug!(pointers = %pointers.name(), start, count, "validating VLS block");
        check(pointers, &pointers.read_block(start, count)?, heap_len)?;
    }
    Ok(())
}

/// Validate an N-dimensional array of extent `dims`.
pub fn validate_nd(pointers: &PointerArray, dims: &[u64], heap_len: u64, budget: u64) -> Result<()> {
    let block = plan_nd_block_dimensions(pointers.dataset().chunk_dimensions(), dims, budget);
    let mut iter = NdBlockIter::new(dims, &block);
    while !iter.finished() {
        debug!(pointers = %pointers.name(), starts = ?iter.starts(), counts = ?iter.counts(), "validating VLS block");
        check(pointers, &pointers.read_hyperslab(iter.starts(), iter.counts())?, heap_len)?;
        iter.next();
    }
    Ok(())
}

/// Validate a pointer array of any rank over its full extent.
pub fn validate_pointer_array(pointers: &PointerArray, heap_len: u64, budget: u64) -> Result<()> {
    let shape = pointers.dataset().shape().to_vec();
    match shape.as_slice() {
        [length] => validate_1d(pointers, *length, heap_len, budget),
        dims => validate_nd(pointers, dims, heap_len, budget),
    }
}
