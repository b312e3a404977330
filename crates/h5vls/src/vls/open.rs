//! Opening the two datasets of a VLS array: the pointer records and the
//! byte heap they address.

use h5vls_format::datatype::{Datatype, Endian, TypeClass};

use crate::error::{Error, Result};
use crate::limits::exceeds_integer_limit;
use crate::reader::{Dataset, Group};

use super::pointer::{validate_pointer_datatype, Pointer, PointerLayout, PointerNaming};

/// A dataset of pointer records with a validated layout.
#[derive(Debug, Clone)]
pub struct PointerArray {
    dataset: Dataset,
    layout: PointerLayout,
}

impl PointerArray {
    pub fn name(&self) -> &str {
        self.dataset.name()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn layout(&self) -> &PointerLayout {
        &self.layout
    }

    /// Pointers `[start, start + count)` of a 1-dimensional array.
    pub fn read_block(&self, start: u64, count: u64) -> Result<Vec<Pointer>> {
        self.read_hyperslab(&[start], &[count])
    }

    /// Pointers of an N-dimensional block, row-major.
    pub fn read_hyperslab(&self, starts: &[u64], counts: &[u64]) -> Result<Vec<Pointer>> {
        let bytes = self.dataset.read_hyperslab(starts, counts)?;
        Ok(self.layout.decode_all(&bytes))
    }
}

/// A 1-dimensional dataset of bytes holding concatenated strings.
#[derive(Debug, Clone)]
pub struct Heap {
    dataset: Dataset,
    /// Index of the low-order byte within each element.
    low_byte: usize,
    element_size: usize,
    len: u64,
}

impl Heap {
    fn new(dataset: Dataset) -> Heap {
        let element_size = dataset.element_size().max(1);
        let low_byte = match dataset.datatype() {
            Datatype::Integer { order: Endian::Big, .. } => element_size - 1,
            _ => 0,
        };
        let len = dataset.shape().first().copied().unwrap_or(0);
        Heap {
            dataset,
            low_byte,
            element_size,
            len,
        }
    }

    /// Number of bytes in the heap.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn name(&self) -> &str {
        self.dataset.name()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Bytes `[start, start + size)`. Callers check the range first.
    pub fn read(&self, start: u64, size: u64) -> Result<Vec<u8>> {
        let raw = self.dataset.read_hyperslab(&[start], &[size])?;
        if self.element_size == 1 {
            return Ok(raw);
        }
        Ok(raw
            .chunks_exact(self.element_size)
            .map(|element| element[self.low_byte])
            .collect())
    }
}

/// Open the pointer dataset at `path` under `group` and check that its
/// records fit the bit ceilings.
pub fn open_pointers(
    group: &Group,
    path: &str,
    naming: PointerNaming,
    start_bits_max: u32,
    size_bits_max: u32,
) -> Result<PointerArray> {
    let dataset = group.open_dataset(path)?;
    if dataset.datatype().class() != TypeClass::Compound {
        return Err(Error::schema(
            dataset.name(),
            format!("expected a compound datatype for a VLS pointer dataset at '{}'", dataset.name()),
        ));
    }
    let layout = validate_pointer_datatype(dataset.datatype(), naming, start_bits_max, size_bits_max)
        .map_err(|e| {
            Error::schema(
                dataset.name(),
                format!("incorrect type for VLS pointer dataset at '{}'; {e}", dataset.name()),
            )
        })?;
    Ok(PointerArray { dataset, layout })
}

/// Open the heap at `path`, which must hold 8-bit unsigned integers.
pub fn open_heap(group: &Group, path: &str) -> Result<Heap> {
    let dataset = group.open_dataset(path)?;
    if dataset.datatype().class() != TypeClass::Integer {
        return Err(Error::schema(
            dataset.name(),
            format!("expected an integer datatype for the VLS heap at '{}'", dataset.name()),
        ));
    }
    if exceeds_integer_limit(dataset.datatype(), 8, false) {
        return Err(Error::schema(
            dataset.name(),
            format!("expected 8-bit unsigned integers for the VLS heap at '{}'", dataset.name()),
        ));
    }
    check_heap_rank(&dataset)?;
    Ok(Heap::new(dataset))
}

/// Like [`open_heap`] but accepts unsigned integers of any width, keeping
/// the low byte of each element.
pub fn open_heap_any_unsigned(group: &Group, path: &str) -> Result<Heap> {
    let dataset = group.open_dataset(path)?;
    match dataset.datatype() {
        Datatype::Integer { signed: false, .. } => {}
        Datatype::Integer { .. } => {
            return Err(Error::schema(
                dataset.name(),
                format!("expected unsigned integers for the VLS heap at '{}'", dataset.name()),
            ))
        }
        _ => {
            return Err(Error::schema(
                dataset.name(),
                format!("expected an integer datatype for the VLS heap at '{}'", dataset.name()),
            ))
        }
    }
    check_heap_rank(&dataset)?;
    Ok(Heap::new(dataset))
}

fn check_heap_rank(dataset: &Dataset) -> Result<()> {
    if dataset.rank() != 1 {
        return Err(Error::schema(
            dataset.name(),
            format!("expected a 1-dimensional dataset for the VLS heap at '{}'", dataset.name()),
        ));
    }
    Ok(())
}
