//! Pointer records: the compound `{start, size}` type that addresses a
//! string inside the heap.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use h5vls_format::datatype::{CompoundMember, Datatype, Endian, TypeClass};

use crate::error::{Error, Result};
use crate::limits::exceeds_integer_limit;

/// A decoded pointer: `size` bytes of the heap starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pointer {
    pub start: u64,
    pub size: u64,
}

/// Whether `pointer` addresses bytes inside a heap of `heap_len` bytes.
pub fn pointer_in_range(pointer: Pointer, heap_len: u64) -> bool {
    pointer.start <= heap_len
        && pointer
            .start
            .checked_add(pointer.size)
            .is_some_and(|end| end <= heap_len)
}

/// Member names of the pointer compound type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerNaming {
    /// `start` then `size`.
    #[default]
    StartSize,
    /// `offset` then `length`, used by older files.
    OffsetLength,
}

impl PointerNaming {
    pub fn first(self) -> &'static str {
        match self {
            PointerNaming::StartSize => "start",
            PointerNaming::OffsetLength => "offset",
        }
    }

    pub fn second(self) -> &'static str {
        match self {
            PointerNaming::StartSize => "size",
            PointerNaming::OffsetLength => "length",
        }
    }
}

/// Position of one integer field inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset: usize,
    /// 1 to 8 bytes.
    pub width: usize,
    pub order: Endian,
    /// First significant bit of the stored integer.
    pub bit_offset: u32,
    /// Number of significant bits; the rest is padding.
    pub precision: u32,
}

impl FieldLayout {
    /// A field whose every bit is significant.
    pub fn packed(offset: usize, width: usize, order: Endian) -> FieldLayout {
        FieldLayout {
            offset,
            width,
            order,
            bit_offset: 0,
            precision: width as u32 * 8,
        }
    }

    fn read(&self, record: &[u8]) -> u64 {
        let bytes = &record[self.offset..self.offset + self.width];
        let raw = match self.order {
            Endian::Little => LittleEndian::read_uint(bytes, self.width),
            Endian::Big => BigEndian::read_uint(bytes, self.width),
        };
        (raw >> self.bit_offset) & low_bits(self.precision)
    }

    fn write(&self, record: &mut [u8], value: u64) {
        let raw = (value & low_bits(self.precision)) << self.bit_offset;
        let bytes = &mut record[self.offset..self.offset + self.width];
        match self.order {
            Endian::Little => LittleEndian::write_uint(bytes, raw, self.width),
            Endian::Big => BigEndian::write_uint(bytes, raw, self.width),
        }
    }
}

fn low_bits(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Validated layout of a stored pointer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerLayout {
    pub record_size: usize,
    pub start: FieldLayout,
    pub size: FieldLayout,
}

impl PointerLayout {
    /// Decode one record of `record_size` bytes.
    pub fn decode(&self, record: &[u8]) -> Pointer {
        Pointer {
            start: self.start.read(record),
            size: self.size.read(record),
        }
    }

    /// Decode back-to-back records; a trailing partial record is ignored.
    pub fn decode_all(&self, bytes: &[u8]) -> Vec<Pointer> {
        bytes.chunks_exact(self.record_size).map(|r| self.decode(r)).collect()
    }

    /// Append the encoding of `pointer`. Values wider than a field's
    /// precision are truncated to it.
    pub fn encode(&self, pointer: Pointer, out: &mut Vec<u8>) {
        let at = out.len();
        out.resize(at + self.record_size, 0);
        let record = &mut out[at..];
        self.start.write(record, pointer.start);
        self.size.write(record, pointer.size);
    }
}

fn member_layout(
    member: &CompoundMember,
    record_size: usize,
    ordinal: &str,
    bits_max: u32,
) -> std::result::Result<FieldLayout, String> {
    if member.datatype.class() != TypeClass::Integer {
        return Err(format!("{ordinal} member of a VLS compound datatype should have integer type"));
    }
    let too_wide = || format!("{ordinal} member of a VLS compound datatype should not exceed a {bits_max}-bit unsigned integer");
    let Datatype::Integer {
        size,
        order,
        bit_offset,
        precision,
        ..
    } = member.datatype
    else {
        return Err(too_wide());
    };
    if exceeds_integer_limit(&member.datatype, bits_max, false) || !(1..=8).contains(&size) {
        return Err(too_wide());
    }
    let offset = member.byte_offset as usize;
    let width = size as usize;
    if offset.checked_add(width).is_none_or(|end| end > record_size) {
        return Err(format!("{ordinal} member of a VLS compound datatype extends past the end of the record"));
    }
    let (bit_offset, precision) = (u32::from(bit_offset), u32::from(precision));
    if precision == 0 || bit_offset + precision > size * 8 {
        return Err(format!("{ordinal} member of a VLS compound datatype has bits outside its {size}-byte storage"));
    }
    Ok(FieldLayout {
        offset,
        width,
        order,
        bit_offset,
        precision,
    })
}

/// Check that `dtype` is a pointer compound type with members named per
/// `naming`, each an unsigned integer of at most the given bit widths.
pub fn validate_pointer_datatype(
    dtype: &Datatype,
    naming: PointerNaming,
    start_bits_max: u32,
    size_bits_max: u32,
) -> Result<PointerLayout> {
    let fail = |message: String| Error::schema("", message);
    let Datatype::Compound { size, members } = dtype else {
        return Err(fail("expected VLS compound datatype to have two members".into()));
    };
    if members.len() != 2 {
        return Err(fail("expected VLS compound datatype to have two members".into()));
    }
    let record_size = *size as usize;

    if members[0].name != naming.first() {
        return Err(fail(format!(
            "first member of a VLS compound datatype should be named '{}'",
            naming.first()
        )));
    }
    let start = member_layout(&members[0], record_size, "first", start_bits_max).map_err(fail)?;

    if members[1].name != naming.second() {
        return Err(fail(format!(
            "second member of a VLS compound datatype should be named '{}'",
            naming.second()
        )));
    }
    let size = member_layout(&members[1], record_size, "second", size_bits_max).map_err(fail)?;

    Ok(PointerLayout {
        record_size,
        start,
        size,
    })
}

/// Compound type for writing pointers: two little-endian unsigned
/// integers of the given byte widths, packed.
pub fn define_pointer_datatype(naming: PointerNaming, start_bytes: u32, size_bytes: u32) -> Datatype {
    Datatype::Compound {
        size: start_bytes + size_bytes,
        members: vec![
            CompoundMember {
                name: naming.first().to_owned(),
                byte_offset: 0,
                datatype: Datatype::unsigned(start_bytes),
            },
            CompoundMember {
                name: naming.second().to_owned(),
                byte_offset: start_bytes as u64,
                datatype: Datatype::unsigned(size_bytes),
            },
        ],
    }
}

/// Concatenate `strings` into a heap, returning one pointer per string.
pub fn pack_strings<S: AsRef<str>>(strings: &[S]) -> (Vec<Pointer>, Vec<u8>) {
    let mut heap = Vec::new();
    let pointers = strings
        .iter()
        .map(|s| {
            let bytes = s.as_ref().as_bytes();
            let pointer = Pointer {
                start: heap.len() as u64,
                size: bytes.len() as u64,
            };
            heap.extend_from_slice(bytes);
            pointer
        })
        .collect();
    (pointers, heap)
}

/// Encode pointers with the layout of `define_pointer_datatype`.
pub fn encode_pointers(pointers: &[Pointer], start_bytes: u32, size_bytes: u32) -> Vec<u8> {
    let layout = PointerLayout {
        record_size: (start_bytes + size_bytes) as usize,
        start: FieldLayout::packed(0, start_bytes as usize, Endian::Little),
        size: FieldLayout::packed(start_bytes as usize, size_bytes as usize, Endian::Little),
    };
    let mut out = Vec::with_capacity(pointers.len() * layout.record_size);
    for &p in pointers {
        layout.encode(p, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::CompoundTypeBuilder;

    fn message(result: Result<PointerLayout>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn accepts_defined_types() {
        for naming in [PointerNaming::StartSize, PointerNaming::OffsetLength] {
            let dtype = define_pointer_datatype(naming, 8, 4);
            let layout = validate_pointer_datatype(&dtype, naming, 64, 32).unwrap();
            assert_eq!(layout.record_size, 12);
            assert_eq!(layout.size.offset, 8);
            let mut buf = Vec::new();
            layout.encode(Pointer { start: 1 << 40, size: 77 }, &mut buf);
            assert_eq!(layout.decode(&buf), Pointer { start: 1 << 40, size: 77 });
        }
    }

    #[test]
    fn narrower_members_pass() {
        let dtype = define_pointer_datatype(PointerNaming::StartSize, 2, 1);
        assert!(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 64).is_ok());
    }

    #[test]
    fn member_count() {
        let dtype = CompoundTypeBuilder::new().field("start", Datatype::unsigned(8)).build();
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 64)),
            "expected VLS compound datatype to have two members"
        );
    }

    #[test]
    fn member_names() {
        let dtype = define_pointer_datatype(PointerNaming::OffsetLength, 8, 8);
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 64)),
            "first member of a VLS compound datatype should be named 'start'"
        );
        let dtype = CompoundTypeBuilder::new()
            .field("start", Datatype::unsigned(8))
            .field("length", Datatype::unsigned(8))
            .build();
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 64)),
            "second member of a VLS compound datatype should be named 'size'"
        );
    }

    #[test]
    fn member_classes() {
        let dtype = CompoundTypeBuilder::new()
            .field("start", Datatype::float(8))
            .field("size", Datatype::unsigned(8))
            .build();
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 64)),
            "first member of a VLS compound datatype should have integer type"
        );
        let dtype = CompoundTypeBuilder::new()
            .field("start", Datatype::unsigned(8))
            .field("size", Datatype::float(8))
            .build();
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 64)),
            "second member of a VLS compound datatype should have integer type"
        );
    }

    #[test]
    fn member_widths() {
        let dtype = define_pointer_datatype(PointerNaming::StartSize, 8, 8);
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 32, 64)),
            "first member of a VLS compound datatype should not exceed a 32-bit unsigned integer"
        );
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 16)),
            "second member of a VLS compound datatype should not exceed a 16-bit unsigned integer"
        );
        let signed = CompoundTypeBuilder::new()
            .field("start", Datatype::signed(4))
            .field("size", Datatype::unsigned(4))
            .build();
        assert_eq!(
            message(validate_pointer_datatype(&signed, PointerNaming::StartSize, 64, 64)),
            "first member of a VLS compound datatype should not exceed a 64-bit unsigned integer"
        );
    }

    #[test]
    fn not_a_compound() {
        assert!(validate_pointer_datatype(&Datatype::unsigned(8), PointerNaming::StartSize, 64, 64).is_err());
    }

    #[test]
    fn big_endian_fields() {
        let layout = PointerLayout {
            record_size: 6,
            start: FieldLayout::packed(0, 4, Endian::Big),
            size: FieldLayout::packed(4, 2, Endian::Little),
        };
        assert_eq!(layout.decode(&[0, 0, 1, 2, 5, 0]), Pointer { start: 0x0102, size: 5 });
    }

    #[test]
    fn padding_bits_are_ignored() {
        let padded = Datatype::Integer {
            size: 4,
            order: Endian::Little,
            signed: false,
            bit_offset: 4,
            precision: 16,
        };
        let dtype = CompoundTypeBuilder::new()
            .field("start", padded)
            .field("size", Datatype::unsigned(2))
            .build();
        let layout = validate_pointer_datatype(&dtype, PointerNaming::StartSize, 16, 16).unwrap();
        assert_eq!(layout.start.bit_offset, 4);
        assert_eq!(layout.start.precision, 16);

        // 0xABCD stored at bit 4, with junk in the low nibble and top byte
        let raw: u32 = 0xF00A_BCD0 | 0x7;
        let mut record = raw.to_le_bytes().to_vec();
        record.extend_from_slice(&9u16.to_le_bytes());
        assert_eq!(layout.decode(&record), Pointer { start: 0xABCD, size: 9 });

        let mut out = Vec::new();
        layout.encode(Pointer { start: 0x1_2345, size: 9 }, &mut out);
        assert_eq!(&out[..4], &0x0002_3450u32.to_le_bytes());
    }

    #[test]
    fn bits_outside_storage() {
        let dtype = CompoundTypeBuilder::new()
            .field(
                "start",
                Datatype::Integer {
                    size: 2,
                    order: Endian::Little,
                    signed: false,
                    bit_offset: 8,
                    precision: 16,
                },
            )
            .field("size", Datatype::unsigned(2))
            .build();
        assert_eq!(
            message(validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 64)),
            "first member of a VLS compound datatype has bits outside its 2-byte storage"
        );
    }

    #[test]
    fn range_checks() {
        assert!(pointer_in_range(Pointer { start: 10, size: 0 }, 10));
        assert!(pointer_in_range(Pointer { start: 4, size: 6 }, 10));
        assert!(!pointer_in_range(Pointer { start: 11, size: 0 }, 10));
        assert!(!pointer_in_range(Pointer { start: 5, size: 6 }, 10));
        assert!(!pointer_in_range(Pointer { start: 1, size: u64::MAX }, u64::MAX));
    }

    #[test]
    fn packing() {
        let (pointers, heap) = pack_strings(&["ab", "", "cde"]);
        assert_eq!(heap, b"abcde");
        assert_eq!(pointers[1], Pointer { start: 2, size: 0 });
        assert_eq!(pointers[2], Pointer { start: 2, size: 3 });
        let bytes = encode_pointers(&pointers, 8, 4);
        let dtype = define_pointer_datatype(PointerNaming::StartSize, 8, 4);
        let layout = validate_pointer_datatype(&dtype, PointerNaming::StartSize, 64, 32).unwrap();
        assert_eq!(layout.decode_all(&bytes), pointers);
    }
}
