//! Metadata checksum: Bob Jenkins' lookup3 `hashlittle`, as used by HDF5
//! for superblock v2+, object header v2 and chunk-index structures.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Compute the lookup3 checksum of `data` with an initial value of zero.
pub fn jenkins_lookup3(data: &[u8]) -> u32 {
    hashlittle(data, 0)
}

/// Compare the checksum stored in the 4 bytes after `covered` against the
/// computed one.
pub fn verify_trailing_checksum(data: &[u8], covered: usize) -> Result<(), FormatError> {
    crate::bytes::ensure_len(data, covered, 4)?;
    let expected = LittleEndian::read_u32(&data[covered..]);
    let computed = jenkins_lookup3(&data[..covered]);
    if expected != computed {
        return Err(FormatError::ChecksumMismatch { expected, computed });
    }
    Ok(())
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    for (shift_a, shift_b, shift_c) in [(4, 6, 8), (16, 19, 4)] {
        *a = a.wrapping_sub(*c) ^ c.rotate_left(shift_a);
        *c = c.wrapping_add(*b);
        *b = b.wrapping_sub(*a) ^ a.rotate_left(shift_b);
        *a = a.wrapping_add(*c);
        *c = c.wrapping_sub(*b) ^ b.rotate_left(shift_c);
        *b = b.wrapping_add(*a);
    }
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(14));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(11));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(25));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(16));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(4));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(14));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(24));
}

fn hashlittle(data: &[u8], initval: u32) -> u32 {
    let seed = 0xdead_beef_u32
        .wrapping_add(data.len() as u32)
        .wrapping_add(initval);
    let (mut a, mut b, mut c) = (seed, seed, seed);

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(LittleEndian::read_u32(&rest[0..4]));
        b = b.wrapping_add(LittleEndian::read_u32(&rest[4..8]));
        c = c.wrapping_add(LittleEndian::read_u32(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }
    if rest.is_empty() {
        return c;
    }

    // The tail is added as zero-padded little-endian words.
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(LittleEndian::read_u32(&tail[0..4]));
    b = b.wrapping_add(LittleEndian::read_u32(&tail[4..8]));
    c = c.wrapping_add(LittleEndian::read_u32(&tail[8..12]));
    final_mix(&mut a, &mut b, &mut c);
    c
}
