//! Little-endian field readers and writers shared by the structure parsers.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

pub(crate) fn ensure_len(data: &[u8], pos: usize, needed: usize) -> Result<(), FormatError> {
    match pos.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(FormatError::UnexpectedEof {
            expected: pos.saturating_add(needed),
            available: data.len(),
        }),
    }
}

/// Read an unsigned little-endian integer of `nbytes` (1..=8) at `pos`.
pub(crate) fn read_uint(data: &[u8], pos: usize, nbytes: usize) -> Result<u64, FormatError> {
    if nbytes == 0 || nbytes > 8 {
        return Err(FormatError::InvalidDatatype(format!(
            "integer field width {nbytes} outside 1..=8"
        )));
    }
    ensure_len(data, pos, nbytes)?;
    Ok(LittleEndian::read_uint(&data[pos..], nbytes))
}

/// Read a file offset of `size` bytes.
pub(crate) fn read_offset(data: &[u8], pos: usize, size: u8) -> Result<u64, FormatError> {
    read_uint(data, pos, size as usize)
}

pub(crate) fn read_u16(data: &[u8], pos: usize) -> Result<u16, FormatError> {
    ensure_len(data, pos, 2)?;
    Ok(LittleEndian::read_u16(&data[pos..]))
}

pub(crate) fn read_u32(data: &[u8], pos: usize) -> Result<u32, FormatError> {
    ensure_len(data, pos, 4)?;
    Ok(LittleEndian::read_u32(&data[pos..]))
}

/// True when `val` is the all-ones "undefined address" for the offset width.
pub(crate) fn is_undefined(val: u64, size: u8) -> bool {
    if size >= 8 {
        val == u64::MAX
    } else {
        val == (1u64 << (size as u32 * 8)) - 1
    }
}

/// Append the low `nbytes` of `val` in little-endian order.
pub(crate) fn write_uint(buf: &mut Vec<u8>, val: u64, nbytes: usize) {
    buf.extend_from_slice(&val.to_le_bytes()[..nbytes.min(8)]);
}

pub(crate) fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidOffsetSize(offset_size));
    }
    if !matches!(length_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidLengthSize(length_size));
    }
    Ok(())
}
