//! Datatype message (type 0x0003).
//!
//! Every class is parsed far enough to know its size and, for the nested
//! classes, its members. Integer, float, string and compound types can also
//! be serialised, which is all the writer needs.

use crate::bytes::{ensure_len, read_u16, read_u32, read_uint, write_uint};
use crate::error::FormatError;

/// Byte order of a numeric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// The twelve datatype classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Float,
    Time,
    String,
    BitField,
    Opaque,
    Compound,
    Reference,
    Enumeration,
    VariableLength,
    Array,
    Complex,
}

impl TypeClass {
    fn from_id(id: u8) -> Result<TypeClass, FormatError> {
        Ok(match id {
            0 => TypeClass::Integer,
            1 => TypeClass::Float,
            2 => TypeClass::Time,
            3 => TypeClass::String,
            4 => TypeClass::BitField,
            5 => TypeClass::Opaque,
            6 => TypeClass::Compound,
            7 => TypeClass::Reference,
            8 => TypeClass::Enumeration,
            9 => TypeClass::VariableLength,
            10 => TypeClass::Array,
            11 => TypeClass::Complex,
            other => return Err(FormatError::InvalidDatatypeClass(other)),
        })
    }

    /// Lower-case class name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TypeClass::Integer => "integer",
            TypeClass::Float => "float",
            TypeClass::Time => "time",
            TypeClass::String => "string",
            TypeClass::BitField => "bitfield",
            TypeClass::Opaque => "opaque",
            TypeClass::Compound => "compound",
            TypeClass::Reference => "reference",
            TypeClass::Enumeration => "enum",
            TypeClass::VariableLength => "vlen",
            TypeClass::Array => "array",
            TypeClass::Complex => "complex",
        }
    }
}

/// String padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Character set of string data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// A named field of a compound type.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMember {
    pub name: String,
    /// Byte offset of the field within one record.
    pub byte_offset: u64,
    pub datatype: Datatype,
}

/// A named constant of an enumeration type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    /// Raw value bytes, one base-type element wide.
    pub value: Vec<u8>,
}

/// A parsed datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    Integer {
        size: u32,
        order: Endian,
        signed: bool,
        bit_offset: u16,
        precision: u16,
    },
    Float {
        size: u32,
        order: Endian,
        bit_offset: u16,
        precision: u16,
        exponent_location: u8,
        exponent_size: u8,
        mantissa_location: u8,
        mantissa_size: u8,
        exponent_bias: u32,
    },
    String {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    Compound {
        size: u32,
        members: Vec<CompoundMember>,
    },
    Enumeration {
        size: u32,
        base: Box<Datatype>,
        members: Vec<EnumMember>,
    },
    VariableLength {
        is_string: bool,
        charset: CharacterSet,
        base: Box<Datatype>,
    },
    Array {
        base: Box<Datatype>,
        dims: Vec<u32>,
    },
    /// Time, bitfield, opaque, reference and complex types, kept by size.
    Other {
        class: TypeClass,
        size: u32,
    },
}

fn padding_from(val: u8) -> Result<StringPadding, FormatError> {
    match val {
        0 => Ok(StringPadding::NullTerminate),
        1 => Ok(StringPadding::NullPad),
        2 => Ok(StringPadding::SpacePad),
        other => Err(FormatError::InvalidDatatype(format!(
            "string padding {other}"
        ))),
    }
}

fn charset_from(val: u8) -> Result<CharacterSet, FormatError> {
    match val {
        0 => Ok(CharacterSet::Ascii),
        1 => Ok(CharacterSet::Utf8),
        other => Err(FormatError::InvalidDatatype(format!(
            "character set {other}"
        ))),
    }
}

/// Read a NUL-terminated name. Returns the name and the bytes consumed,
/// rounded up to a multiple of eight when `pad8` is set.
fn read_name(data: &[u8], pos: usize, pad8: bool) -> Result<(String, usize), FormatError> {
    let rest = data.get(pos..).unwrap_or_default();
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(FormatError::UnexpectedEof {
            expected: data.len() + 1,
            available: data.len(),
        })?;
    let name = String::from_utf8_lossy(&rest[..nul]).into_owned();
    let used = if pad8 { (nul + 1).div_ceil(8) * 8 } else { nul + 1 };
    Ok((name, used))
}

/// Width of a v3 compound member offset: the fewest bytes that can hold
/// the compound size.
fn member_offset_width(size: u32) -> usize {
    match size {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

fn endian_bit(bits: u8) -> Endian {
    if bits & 0x01 == 0 {
        Endian::Little
    } else {
        Endian::Big
    }
}

impl Datatype {
    /// Little-endian unsigned integer of `size` bytes.
    pub fn unsigned(size: u32) -> Datatype {
        Datatype::Integer {
            size,
            order: Endian::Little,
            signed: false,
            bit_offset: 0,
            precision: (size * 8) as u16,
        }
    }

    /// Little-endian signed integer of `size` bytes.
    pub fn signed(size: u32) -> Datatype {
        Datatype::Integer {
            size,
            order: Endian::Little,
            signed: true,
            bit_offset: 0,
            precision: (size * 8) as u16,
        }
    }

    /// IEEE 754 little-endian float of 4 or 8 bytes.
    pub fn float(size: u32) -> Datatype {
        let (exponent_size, mantissa_size, exponent_bias) = if size == 4 {
            (8, 23, 127)
        } else {
            (11, 52, 1023)
        };
        Datatype::Float {
            size,
            order: Endian::Little,
            bit_offset: 0,
            precision: (size * 8) as u16,
            exponent_location: mantissa_size,
            exponent_size,
            mantissa_location: 0,
            mantissa_size,
            exponent_bias,
        }
    }

    pub fn class(&self) -> TypeClass {
        match self {
            Datatype::Integer { .. } => TypeClass::Integer,
            Datatype::Float { .. } => TypeClass::Float,
            Datatype::String { .. } => TypeClass::String,
            Datatype::Compound { .. } => TypeClass::Compound,
            Datatype::Enumeration { .. } => TypeClass::Enumeration,
            Datatype::VariableLength { .. } => TypeClass::VariableLength,
            Datatype::Array { .. } => TypeClass::Array,
            Datatype::Other { class, .. } => *class,
        }
    }

    /// Size in bytes of one element.
    pub fn size(&self) -> u64 {
        match self {
            Datatype::Integer { size, .. }
            | Datatype::Float { size, .. }
            | Datatype::String { size, .. }
            | Datatype::Compound { size, .. }
            | Datatype::Enumeration { size, .. }
            | Datatype::Other { size, .. } => *size as u64,
            // Stored in the file as a global heap reference.
            Datatype::VariableLength { .. } => 16,
            Datatype::Array { base, dims } => {
                base.size() * dims.iter().map(|&d| d as u64).product::<u64>()
            }
        }
    }

    /// Parse a datatype message. Returns the type and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        ensure_len(data, 0, 8)?;
        let class = TypeClass::from_id(data[0] & 0x0F)?;
        let version = data[0] >> 4;
        let bits = [data[1], data[2], data[3]];
        let size = read_u32(data, 4)?;
        let mut pos = 8;

        let dt = match class {
            TypeClass::Integer => {
                let bit_offset = read_u16(data, pos)?;
                let precision = read_u16(data, pos + 2)?;
                pos += 4;
                Datatype::Integer {
                    size,
                    order: endian_bit(bits[0]),
                    signed: bits[0] & 0x08 != 0,
                    bit_offset,
                    precision,
                }
            }
            TypeClass::Float => {
                ensure_len(data, pos, 12)?;
                let dt = Datatype::Float {
                    size,
                    order: endian_bit(bits[0]),
                    bit_offset: read_u16(data, pos)?,
                    precision: read_u16(data, pos + 2)?,
                    exponent_location: data[pos + 4],
                    exponent_size: data[pos + 5],
                    mantissa_location: data[pos + 6],
                    mantissa_size: data[pos + 7],
                    exponent_bias: read_u32(data, pos + 8)?,
                };
                pos += 12;
                dt
            }
            TypeClass::String => Datatype::String {
                size,
                padding: padding_from(bits[0] & 0x0F)?,
                charset: charset_from(bits[0] >> 4)?,
            },
            TypeClass::Compound => {
                let count = u16::from_le_bytes([bits[0], bits[1]]);
                let mut members = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let (name, used) = read_name(data, pos, version < 3)?;
                    pos += used;
                    let byte_offset = match version {
                        1 => {
                            let off = read_u32(data, pos)? as u64;
                            // offset, rank, reserved, permutation, reserved, 4 dim sizes
                            pos += 32;
                            off
                        }
                        2 => {
                            let off = read_u32(data, pos)? as u64;
                            pos += 4;
                            off
                        }
                        3 => {
                            let width = member_offset_width(size);
                            let off = read_uint(data, pos, width)?;
                            pos += width;
                            off
                        }
                        v => {
                            return Err(FormatError::UnsupportedVersion {
                                structure: "compound datatype",
                                version: v,
                            })
                        }
                    };
                    ensure_len(data, pos, 0)?;
                    let (datatype, used) = Datatype::parse(&data[pos..])?;
                    pos += used;
                    members.push(CompoundMember {
                        name,
                        byte_offset,
                        datatype,
                    });
                }
                Datatype::Compound { size, members }
            }
            TypeClass::Enumeration => {
                let count = u16::from_le_bytes([bits[0], bits[1]]) as usize;
                let (base, used) = Datatype::parse(&data[pos..])?;
                pos += used;
                let mut names = Vec::with_capacity(count);
                for _ in 0..count {
                    let (name, used) = read_name(data, pos, version < 3)?;
                    pos += used;
                    names.push(name);
                }
                let width = base.size() as usize;
                let mut members = Vec::with_capacity(count);
                for name in names {
                    ensure_len(data, pos, width)?;
                    members.push(EnumMember {
                        name,
                        value: data[pos..pos + width].to_vec(),
                    });
                    pos += width;
                }
                Datatype::Enumeration {
                    size,
                    base: Box::new(base),
                    members,
                }
            }
            TypeClass::VariableLength => {
                ensure_len(data, pos, 0)?;
                let (base, used) = Datatype::parse(&data[pos..])?;
                pos += used;
                Datatype::VariableLength {
                    is_string: bits[0] & 0x0F == 1,
                    charset: charset_from(bits[1] & 0x0F)?,
                    base: Box::new(base),
                }
            }
            TypeClass::Array => {
                ensure_len(data, pos, 1)?;
                let rank = data[pos] as usize;
                // v2 pads the rank to four bytes and stores a permutation.
                pos += if version < 3 { 4 } else { 1 };
                let mut dims = Vec::with_capacity(rank);
                for _ in 0..rank {
                    dims.push(read_u32(data, pos)?);
                    pos += 4;
                }
                if version < 3 {
                    pos += 4 * rank;
                }
                ensure_len(data, pos, 0)?;
                let (base, used) = Datatype::parse(&data[pos..])?;
                pos += used;
                Datatype::Array {
                    base: Box::new(base),
                    dims,
                }
            }
            TypeClass::Time => {
                pos += 2;
                Datatype::Other { class, size }
            }
            TypeClass::BitField => {
                pos += 4;
                Datatype::Other { class, size }
            }
            TypeClass::Opaque => {
                pos += (bits[0] as usize).div_ceil(8) * 8;
                Datatype::Other { class, size }
            }
            TypeClass::Reference => Datatype::Other { class, size },
            TypeClass::Complex => {
                let (_, used) = Datatype::parse(&data[pos..])?;
                pos += used;
                Datatype::Other { class, size }
            }
        };
        ensure_len(data, 0, pos)?;
        Ok((dt, pos))
    }

    /// Serialise as a datatype message body.
    pub fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        let mut buf = Vec::new();
        match self {
            Datatype::Integer {
                size,
                order,
                signed,
                bit_offset,
                precision,
            } => {
                let mut b0 = 0u8;
                if *order == Endian::Big {
                    b0 |= 0x01;
                }
                if *signed {
                    b0 |= 0x08;
                }
                header(&mut buf, 0, 1, [b0, 0, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&precision.to_le_bytes());
            }
            Datatype::Float {
                size,
                order,
                bit_offset,
                precision,
                exponent_location,
                exponent_size,
                mantissa_location,
                mantissa_size,
                exponent_bias,
            } => {
                // Implied leading mantissa bit; sign bit is the top bit.
                let mut b0 = 0x20u8;
                if *order == Endian::Big {
                    b0 |= 0x01;
                }
                let sign_location = precision.saturating_sub(1) as u8;
                header(&mut buf, 1, 1, [b0, sign_location, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&precision.to_le_bytes());
                buf.extend_from_slice(&[
                    *exponent_location,
                    *exponent_size,
                    *mantissa_location,
                    *mantissa_size,
                ]);
                buf.extend_from_slice(&exponent_bias.to_le_bytes());
            }
            Datatype::String {
                size,
                padding,
                charset,
            } => {
                let pad = match padding {
                    StringPadding::NullTerminate => 0,
                    StringPadding::NullPad => 1,
                    StringPadding::SpacePad => 2,
                };
                let cset = match charset {
                    CharacterSet::Ascii => 0,
                    CharacterSet::Utf8 => 1,
                };
                header(&mut buf, 3, 1, [pad | (cset << 4), 0, 0], *size);
            }
            Datatype::Compound { size, members } => {
                let count = u16::try_from(members.len()).map_err(|_| {
                    FormatError::InvalidDatatype("compound has more than 65535 members".into())
                })?;
                let [lo, hi] = count.to_le_bytes();
                header(&mut buf, 6, 3, [lo, hi, 0], *size);
                let width = member_offset_width(*size);
                for member in members {
                    buf.extend_from_slice(member.name.as_bytes());
                    buf.push(0);
                    write_uint(&mut buf, member.byte_offset, width);
                    buf.extend_from_slice(&member.datatype.serialize()?);
                }
            }
            other => {
                return Err(FormatError::Unsupported(format!(
                    "serialising {} datatypes",
                    other.class().name()
                )))
            }
        }
        Ok(buf)
    }
}

fn header(buf: &mut Vec<u8>, class: u8, version: u8, bits: [u8; 3], size: u32) {
    buf.push(class | (version << 4));
    buf.extend_from_slice(&bits);
    buf.extend_from_slice(&size.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(dt: &Datatype) -> Datatype {
        let bytes = dt.serialize().unwrap();
        let (parsed, used) = Datatype::parse(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        parsed
    }

    #[test]
    fn integers() {
        for dt in [Datatype::unsigned(1), Datatype::signed(4), Datatype::unsigned(8)] {
            assert_eq!(roundtrip(&dt), dt);
        }
        let be = Datatype::Integer {
            size: 2,
            order: Endian::Big,
            signed: true,
            bit_offset: 0,
            precision: 16,
        };
        assert_eq!(roundtrip(&be), be);
    }

    #[test]
    fn floats_store_sign_location() {
        let bytes = Datatype::float(4).serialize().unwrap();
        assert_eq!(bytes[2], 31);
        let bytes = Datatype::float(8).serialize().unwrap();
        assert_eq!(bytes[2], 63);
        assert_eq!(roundtrip(&Datatype::float(8)), Datatype::float(8));
    }

    #[test]
    fn compound_offset_widths() {
        for (size, width) in [(16u32, 1usize), (300, 2), (70_000, 3)] {
            let dt = Datatype::Compound {
                size,
                members: vec![
                    CompoundMember {
                        name: "start".into(),
                        byte_offset: 0,
                        datatype: Datatype::unsigned(8),
                    },
                    CompoundMember {
                        name: "size".into(),
                        byte_offset: 8,
                        datatype: Datatype::unsigned(8),
                    },
                ],
            };
            let bytes = dt.serialize().unwrap();
            // header + two (name, offset, 12-byte integer) entries
            assert_eq!(bytes.len(), 8 + (6 + width + 12) + (5 + width + 12));
            assert_eq!(roundtrip(&dt), dt);
        }
    }

    #[test]
    fn compound_v1_members() {
        let mut bytes = vec![0x16, 1, 0, 0];
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(b"start\0\0\0");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 28]);
        bytes.extend_from_slice(&Datatype::unsigned(4).serialize().unwrap());
        let (dt, used) = Datatype::parse(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        let Datatype::Compound { members, .. } = dt else {
            panic!("expected compound");
        };
        assert_eq!(members[0].name, "start");
        assert_eq!(members[0].byte_offset, 4);
        assert_eq!(members[0].datatype, Datatype::unsigned(4));
    }

    #[test]
    fn compound_v2_members() {
        let mut bytes = vec![0x26, 1, 0, 0];
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(b"length\0\0");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&Datatype::unsigned(8).serialize().unwrap());
        let (dt, used) = Datatype::parse(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(dt.class(), TypeClass::Compound);
    }

    #[test]
    fn strings_and_vlen() {
        let s = Datatype::String {
            size: 12,
            padding: StringPadding::NullPad,
            charset: CharacterSet::Utf8,
        };
        assert_eq!(roundtrip(&s), s);

        let mut vlen = vec![0x19, 0x01, 0x01, 0x00];
        vlen.extend_from_slice(&16u32.to_le_bytes());
        vlen.extend_from_slice(&Datatype::unsigned(1).serialize().unwrap());
        let (dt, _) = Datatype::parse(&vlen).unwrap();
        assert_eq!(
            dt,
            Datatype::VariableLength {
                is_string: true,
                charset: CharacterSet::Utf8,
                base: Box::new(Datatype::unsigned(1)),
            }
        );
        assert_eq!(dt.size(), 16);
    }

    #[test]
    fn enum_and_array() {
        let mut e = vec![0x38, 2, 0, 0];
        e.extend_from_slice(&1u32.to_le_bytes());
        e.extend_from_slice(&Datatype::unsigned(1).serialize().unwrap());
        e.extend_from_slice(b"NO\0YES\0");
        e.extend_from_slice(&[0, 1]);
        let (dt, used) = Datatype::parse(&e).unwrap();
        assert_eq!(used, e.len());
        let Datatype::Enumeration { members, .. } = dt else {
            panic!("expected enum");
        };
        assert_eq!(members[1].name, "YES");
        assert_eq!(members[1].value, vec![1]);

        let mut a = vec![0x3A, 0, 0, 0];
        a.extend_from_slice(&24u32.to_le_bytes());
        a.push(2);
        a.extend_from_slice(&2u32.to_le_bytes());
        a.extend_from_slice(&3u32.to_le_bytes());
        a.extend_from_slice(&Datatype::signed(4).serialize().unwrap());
        let (dt, _) = Datatype::parse(&a).unwrap();
        assert_eq!(dt.size(), 24);
        assert_eq!(dt.class(), TypeClass::Array);
    }

    #[test]
    fn opaque_and_reference_sizes() {
        let mut o = vec![0x15, 3, 0, 0];
        o.extend_from_slice(&10u32.to_le_bytes());
        o.extend_from_slice(b"tag\0\0\0\0\0");
        let (dt, used) = Datatype::parse(&o).unwrap();
        assert_eq!(used, 16);
        assert_eq!(dt, Datatype::Other { class: TypeClass::Opaque, size: 10 });

        let mut r = vec![0x17, 0, 0, 0];
        r.extend_from_slice(&8u32.to_le_bytes());
        assert_eq!(Datatype::parse(&r).unwrap().0.class(), TypeClass::Reference);
    }

    #[test]
    fn invalid_class() {
        let mut bytes = vec![0x1F, 0, 0, 0];
        bytes.extend_from_slice(&4u32.to_le_bytes());
        assert_eq!(
            Datatype::parse(&bytes),
            Err(FormatError::InvalidDatatypeClass(15))
        );
    }

    #[test]
    fn unsupported_serialisation() {
        let dt = Datatype::Other { class: TypeClass::Opaque, size: 4 };
        assert!(matches!(dt.serialize(), Err(FormatError::Unsupported(_))));
    }
}
