//! Checks that a stored type fits a target integer or float type.

use h5vls_format::datatype::Datatype;

/// Whether values of `dtype` might not fit an integer of `precision` bits
/// with the given signedness. Non-integer types always exceed.
pub fn exceeds_integer_limit(dtype: &Datatype, precision: u32, signed: bool) -> bool {
    let Datatype::Integer {
        signed: stored_signed,
        precision: bits,
        ..
    } = dtype
    else {
        return true;
    };
    let bits = u32::from(*bits);
    if *stored_signed {
        !signed || bits > precision
    } else if signed {
        // an unsigned value needs one more bit once the sign is reserved
        bits >= precision
    } else {
        bits > precision
    }
}

/// Whether values of `dtype` might not be represented exactly by a float
/// of `precision` bits. Integers must be strictly narrower than the float.
pub fn exceeds_float_limit(dtype: &Datatype, precision: u32) -> bool {
    match dtype {
        Datatype::Integer { precision: bits, .. } => u32::from(*bits) >= precision,
        Datatype::Float { precision: bits, .. } => u32::from(*bits) > precision,
        _ => true,
    }
}
