//! Low-level protobuf wire format primitives.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "key" containing the tag number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! Group wire types (3 and 4) are not supported and are rejected like any
//! other unknown code.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    LengthDelimited = 2,
    /// 32-bit fixed-width
    Fixed32 = 5,
}

impl WireType {
    /// Returns the numeric wire type code
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    /// The offset of a failed conversion is always 0; callers that know where
    /// the key started report their own.
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            _ => Err(Error::invalid_wire_type(0, value)),
        }
    }
}

/// Maximum number of bytes in a varint encoding a 64-bit value
pub const MAX_VARINT_LEN: usize = 10;

/// Builds a field key from a tag number and wire type.
///
/// A key holds 61 bits of tag. Larger tags lose their top bits and produce
/// the key of a different tag; debug builds panic on them instead.
#[inline]
pub fn make_key(tag: u64, wire_type: WireType) -> u64 {
    debug_assert!(tag >> 61 == 0, "tag {} does not fit in a field key", tag);
    (tag << 3) | u64::from(wire_type.code())
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. A varint that
/// runs off the end of `data` or does not fit in 64 bits is rejected; the
/// error offset is relative to the start of `data`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        // The tenth byte may only carry the single remaining bit
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(Error::malformed_varint(0));
        }

        result |= u64::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::malformed_varint(0))
}

/// Appends the varint encoding of `value` to `buf`.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Returns the number of bytes [`encode_varint`] emits for `value`.
pub fn varint_len(value: u64) -> usize {
    // ceil(significant bits / 7); zero still takes one byte
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Maps a signed integer onto an unsigned one, keeping small magnitudes small.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_varint_single_byte() {
        let data = [0x08]; // Value 8
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 8);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xAC, 0x02]; // Value 300
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_decode_varint_max() {
        // Maximum 64-bit varint (all 1s)
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(len, 10);
    }

    #[test]
    fn test_decode_varint_overflow() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        assert_eq!(decode_varint(&data), Err(Error::malformed_varint(0)));

        let data = [0x80; 11];
        assert!(decode_varint(&data).is_err());
    }

    #[test]
    fn test_decode_varint_unterminated() {
        assert!(decode_varint(&[]).is_err());
        assert!(decode_varint(&[0x80, 0x80]).is_err());
    }

    #[test]
    fn test_encode_varint() {
        let mut buf: Vec<u8> = Vec::new();
        encode_varint(300, &mut buf);
        assert_eq!(buf, [0xAC, 0x02]);

        buf.clear();
        encode_varint(u64::MAX, &mut buf);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(decode_varint(&buf).unwrap(), (u64::MAX, MAX_VARINT_LEN));
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(300), 2);
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(100), 200);
        assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag_encode(i64::MIN), u64::MAX);

        for v in [0, 1, -1, 100, -100, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(1).unwrap(), WireType::Fixed64);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::LengthDelimited);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::Fixed32);
        for code in [3, 4, 6, 7] {
            assert!(WireType::try_from(code).is_err());
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not fit in a field key")]
    fn test_make_key_rejects_oversized_tag() {
        make_key(1 << 61, WireType::Varint);
    }

    #[test]
    fn test_make_key() {
        assert_eq!(make_key(1, WireType::LengthDelimited), 0x0A);
        assert_eq!(make_key(2, WireType::Varint), 0x10);
        assert_eq!(make_key(1, WireType::Fixed32), 0x0D);
    }
}
