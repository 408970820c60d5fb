//! # Wire-Field Walker
//!
//! A schema-free reader for the Protobuf tagged-field binary encoding.
//!
//! [`FieldReader`] walks a byte buffer and yields one [`WireField`] per tagged value,
//! without knowing anything about the message it is reading. It is the only place in
//! this crate where varints are decoded, so every truncation and overflow edge case
//! is handled here:
//!
//! * varints longer than 10 bytes are rejected,
//! * varints cut short by the end of the buffer are rejected,
//! * fixed-width and length-delimited values that run past the end of the buffer are
//!   rejected before any slicing happens,
//! * group encodings (and wire types 6/7) are rejected as unsupported.
//!
//! The encode helpers at the bottom of the module are used to hand-build the few
//! request bodies this crate needs, they delegate the varint math to `prost`.
use bytes::BufMut;
use prost::encoding::{WireType as ProstWireType, encode_key, encode_varint};

/// Longest valid varint encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("Varint is truncated: buffer ended after {0} bytes")]
    TruncatedVarint(usize),

    #[error("Varint exceeds the maximum length of 10 bytes")]
    OverlongVarint,

    #[error("Field {field} declares {needed} bytes but only {remaining} remain")]
    Truncated {
        field: u32,
        needed: u64,
        remaining: usize,
    },

    #[error("Unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType { field: u32, wire_type: u8 },

    #[error("Invalid field number {0}")]
    InvalidFieldNumber(u64),
}

/// The wire types this walker understands.
///
/// Groups (3 and 4) are deprecated and never produced by the protocols we read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn from_tag_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// The raw value carried by a [`WireField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    Fixed32(u32),
}

/// A single tagged value read from a buffer. Borrowed from the walked buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireField<'a> {
    pub number: u32,
    pub value: WireValue<'a>,
}

impl<'a> WireField<'a> {
    /// Returns the byte range of a length-delimited field.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self.value {
            WireValue::LengthDelimited(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the numeric value of a varint field.
    pub fn as_varint(&self) -> Option<u64> {
        match self.value {
            WireValue::Varint(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the field as a UTF-8 string, if it is length-delimited and valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

/// Decodes a base-128 varint from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;

    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte may only carry the single remaining bit of a u64.
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(WireError::OverlongVarint);
        }

        value |= u64::from(byte & 0x7f) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if buf.len() >= MAX_VARINT_LEN {
        Err(WireError::OverlongVarint)
    } else {
        Err(WireError::TruncatedVarint(buf.len()))
    }
}

/// Reads the field starting at `pos`.
///
/// Returns `Ok(None)` when `pos` is at the end of the buffer, otherwise the field and
/// the position right after it.
pub fn next_field(buf: &[u8], pos: usize) -> Result<Option<(WireField<'_>, usize)>, WireError> {
    let Some(rest) = buf.get(pos..).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    let (tag, tag_len) = read_varint(rest)?;

    let number = u32::try_from(tag >> 3)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or(WireError::InvalidFieldNumber(tag >> 3))?;

    let wire_bits = (tag & 0x7) as u8;
    let wire_type =
        WireType::from_tag_bits(wire_bits).ok_or(WireError::UnsupportedWireType {
            field: number,
            wire_type: wire_bits,
        })?;

    let rest = &rest[tag_len..];

    let (value, value_len) = match wire_type {
        WireType::Varint => {
            let (v, len) = read_varint(rest)?;
            (WireValue::Varint(v), len)
        }
        WireType::Fixed64 => {
            let bytes = take(rest, number, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            (WireValue::Fixed64(u64::from_le_bytes(raw)), 8)
        }
        WireType::Fixed32 => {
            let bytes = take(rest, number, 4)?;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(bytes);
            (WireValue::Fixed32(u32::from_le_bytes(raw)), 4)
        }
        WireType::LengthDelimited => {
            let (len, len_len) = read_varint(rest)?;
            let bytes = take(&rest[len_len..], number, len)?;
            (WireValue::LengthDelimited(bytes), len_len + bytes.len())
        }
    };

    let field = WireField { number, value };

    Ok(Some((field, pos + tag_len + value_len)))
}

fn take(buf: &[u8], field: u32, needed: u64) -> Result<&[u8], WireError> {
    usize::try_from(needed)
        .ok()
        .and_then(|n| buf.get(..n))
        .ok_or(WireError::Truncated {
            field,
            needed,
            remaining: buf.len(),
        })
}

/// Iterator over the top-level fields of a buffer.
///
/// Yields `Err` at most once: after a malformed field the reader is exhausted, since
/// there is no way to find the start of the next field.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for FieldReader<'a> {
    type Item = Result<WireField<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match next_field(self.buf, self.pos) {
            Ok(Some((field, next))) => {
                self.pos = next;
                Some(Ok(field))
            }
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for FieldReader<'_> {}

/// Appends a length-delimited field to `buf`.
pub fn put_bytes_field(field: u32, value: &[u8], buf: &mut impl BufMut) {
    encode_key(field, ProstWireType::LengthDelimited, buf);
    encode_varint(value.len() as u64, buf);
    buf.put_slice(value);
}

/// Appends a varint field to `buf`.
pub fn put_varint_field(field: u32, value: u64, buf: &mut impl BufMut) {
    encode_key(field, ProstWireType::Varint, buf);
    encode_varint(value, buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_single_byte_varint() {
        assert_eq!(read_varint(&[0x00]), Ok((0, 1)));
        assert_eq!(read_varint(&[0x7f, 0xff]), Ok((127, 1)));
    }

    #[test]
    fn test_read_multi_byte_varint() {
        assert_eq!(read_varint(&[0xac, 0x02]), Ok((300, 2)));
        let max = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert_eq!(read_varint(&max), Ok((u64::MAX, 10)));
    }

    #[test]
    fn test_truncated_varint() {
        assert_eq!(read_varint(&[]), Err(WireError::TruncatedVarint(0)));
        assert_eq!(read_varint(&[0x80, 0x80]), Err(WireError::TruncatedVarint(2)));
    }

    #[test]
    fn test_overlong_varint() {
        let eleven = [0xff; 11];
        assert_eq!(read_varint(&eleven), Err(WireError::OverlongVarint));

        let overflowing_tenth = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert_eq!(read_varint(&overflowing_tenth), Err(WireError::OverlongVarint));
    }

    #[test]
    fn test_walks_every_wire_type() {
        let mut buf = Vec::new();
        put_varint_field(1, 150, &mut buf);
        // field 2, fixed64
        buf.push(0x11);
        buf.extend_from_slice(&7u64.to_le_bytes());
        put_bytes_field(3, b"hi", &mut buf);
        // field 4, fixed32
        buf.push(0x25);
        buf.extend_from_slice(&9u32.to_le_bytes());

        let fields: Vec<_> = FieldReader::new(&buf).collect::<Result<_, _>>().unwrap();

        assert_eq!(
            fields,
            vec![
                WireField {
                    number: 1,
                    value: WireValue::Varint(150)
                },
                WireField {
                    number: 2,
                    value: WireValue::Fixed64(7)
                },
                WireField {
                    number: 3,
                    value: WireValue::LengthDelimited(b"hi")
                },
                WireField {
                    number: 4,
                    value: WireValue::Fixed32(9)
                },
            ]
        );
    }

    #[test]
    fn test_length_beyond_buffer_is_an_error() {
        // field 1, length-delimited, declares 10 bytes, carries 3
        let buf = [0x0a, 0x0a, b'a', b'b', b'c'];

        let mut reader = FieldReader::new(&buf);
        assert_eq!(
            reader.next(),
            Some(Err(WireError::Truncated { field: 1, needed: 10, remaining: 3 }))
        );
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn test_huge_declared_length_does_not_panic() {
        let mut buf = vec![0x0a];
        encode_varint(u64::MAX, &mut buf);

        let result = next_field(&buf, 0);
        assert!(matches!(result, Err(WireError::Truncated { field: 1, .. })));
    }

    #[test]
    fn test_truncated_fixed_width_values() {
        assert!(matches!(
            next_field(&[0x09, 0x01, 0x02], 0),
            Err(WireError::Truncated { field: 1, needed: 8, remaining: 2 })
        ));
        assert!(matches!(
            next_field(&[0x0d, 0x01], 0),
            Err(WireError::Truncated { field: 1, needed: 4, remaining: 1 })
        ));
    }

    #[test]
    fn test_group_wire_type_is_rejected() {
        // field 1, start group
        assert_eq!(
            next_field(&[0x0b], 0),
            Err(WireError::UnsupportedWireType { field: 1, wire_type: 3 })
        );
    }

    #[test]
    fn test_field_number_zero_is_rejected() {
        assert_eq!(next_field(&[0x02, 0x00], 0), Err(WireError::InvalidFieldNumber(0)));
    }

    #[test]
    fn test_cursor_positions() {
        let mut buf = Vec::new();
        put_bytes_field(7, b"", &mut buf);
        put_varint_field(1, 1, &mut buf);

        let (first, pos) = next_field(&buf, 0).unwrap().unwrap();
        assert_eq!(first.number, 7);
        assert_eq!(first.as_bytes(), Some(&b""[..]));
        assert_eq!(pos, 2);

        let (second, pos) = next_field(&buf, pos).unwrap().unwrap();
        assert_eq!(second.as_varint(), Some(1));
        assert_eq!(next_field(&buf, pos), Ok(None));
    }
}
