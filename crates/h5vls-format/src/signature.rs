//! HDF5 file signature (magic bytes) detection.

use crate::error::FormatError;

/// The 8-byte HDF5 magic signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Locate the signature, which may sit at offset 0 or at any power of two
/// from 512 upward when a user block precedes the superblock.
pub fn find_signature(data: &[u8]) -> Result<usize, FormatError> {
    let candidates = std::iter::once(0usize).chain(
        std::iter::successors(Some(512usize), |o| o.checked_mul(2)),
    );
    for offset in candidates {
        let Some(window) = data.get(offset..offset + 8) else {
            break;
        };
        if window == HDF5_SIGNATURE {
            return Ok(offset);
        }
    }
    Err(FormatError::SignatureNotFound)
}
