//! Varint, zigzag and fixed-width integer codecs.
//!
//! Varints carry 7 payload bits per byte, least significant group first,
//! with the high bit set on every byte except the last. The encoding is
//! canonical: no padding bytes, and zero is the single byte `0x00`.
//!
//! 32-bit values always travel through the 64-bit codec. A signed 32-bit
//! value in default mode is reinterpreted as `u32` and zero-extended, so
//! every negative `i32` occupies exactly five bytes and the exact bit
//! pattern survives the width change. Decoding keeps the low 32 bits, which
//! also accepts producers that sign-extend negative values to ten bytes.
//!
//! Fixed-width values are little-endian on the wire regardless of the host.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Longest possible encoding of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Longest possible encoding of a 32-bit varint
pub const MAX_VARINT32_LEN: usize = 5;

/// Write `value` as a varint.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes [`encode_varint`] produces for `value`.
pub fn encoded_len_varint(value: u64) -> usize {
    // Significant bits rounded up to 7-bit groups; `| 1` makes zero one byte.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Write a 32-bit pattern through the 64-bit codec.
pub fn encode_varint32(value: u32, buf: &mut impl BufMut) {
    encode_varint(u64::from(value), buf);
}

/// Number of bytes [`encode_varint32`] produces for `value`.
pub fn encoded_len_varint32(value: u32) -> usize {
    encoded_len_varint(u64::from(value))
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    decode_varint_at(data, 0)
}

/// Decode a varint whose first byte sits at absolute `offset`; error
/// offsets are reported relative to it.
pub(crate) fn decode_varint_at(data: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut value: u64 = 0;

    for (i, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte may only contribute the single top bit.
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(Error::varint_overflow(offset));
        }

        value |= u64::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if data.len() >= MAX_VARINT_LEN {
        Err(Error::varint_overflow(offset))
    } else {
        Err(Error::truncated(offset, data.len() + 1, data.len()))
    }
}

/// Map a signed 32-bit value onto the unsigned range, small magnitudes first.
pub fn encode_zigzag32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`encode_zigzag32`].
pub fn decode_zigzag32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Map a signed 64-bit value onto the unsigned range, small magnitudes first.
pub fn encode_zigzag64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`encode_zigzag64`].
pub fn decode_zigzag64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Write exactly four little-endian bytes.
pub fn encode_fixed32(value: u32, buf: &mut impl BufMut) {
    buf.put_u32_le(value);
}

/// Write exactly eight little-endian bytes.
pub fn encode_fixed64(value: u64, buf: &mut impl BufMut) {
    buf.put_u64_le(value);
}

/// Read four little-endian bytes.
pub fn decode_fixed32(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Read eight little-endian bytes.
pub fn decode_fixed64(bytes: [u8; 8]) -> u64 {
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint(value, &mut buf);
        buf
    }

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
    fn test_canonical_encoding() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xAC, 0x02]);
        assert_eq!(encode(u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_length_law_at_group_boundaries() {
        for shift in 0..64 {
            for value in [1u64 << shift, (1u64 << shift) - 1, (1u64 << shift) + 1] {
                assert_eq!(encoded_len_varint(value), encode(value).len(), "value {value}");
            }
        }
        assert_eq!(encoded_len_varint(u64::MAX), 10);
    }

    #[test]
    fn test_matches_prost_encoding() {
        for value in [0u64, 1, 150, 16_383, 16_384, u32::MAX as u64, u64::MAX - 1] {
            let mut expected = Vec::new();
            prost::encoding::encode_varint(value, &mut expected);
            assert_eq!(encode(value), expected);
            assert_eq!(encoded_len_varint(value), prost::encoding::encoded_len_varint(value));
        }
    }

    #[test]
    fn test_negative_i32_is_five_bytes() {
        let mut buf = Vec::new();
        encode_varint32(-1i32 as u32, &mut buf);
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(encoded_len_varint32(i32::MIN as u32), MAX_VARINT32_LEN);

        let (value, len) = decode_varint(&buf).unwrap();
        assert_eq!(len, 5);
        assert_eq!(value as u32 as i32, -1);
    }

    #[test]
    fn test_sign_extended_i32_still_decodes() {
        let sign_extended = encode(-2i64 as u64);
        let (value, _) = decode_varint(&sign_extended).unwrap();
        assert_eq!(value as u32 as i32, -2);
    }

    #[test]
    fn test_zigzag_mapping() {
        assert_eq!(encode_zigzag32(0), 0);
        assert_eq!(encode_zigzag32(-1), 1);
        assert_eq!(encode_zigzag32(1), 2);
        assert_eq!(encode_zigzag32(-2), 3);
        assert_eq!(encode_zigzag32(i32::MAX), u32::MAX - 1);
        assert_eq!(encode_zigzag32(i32::MIN), u32::MAX);
        assert_eq!(encode_zigzag64(i64::MIN), u64::MAX);

        for value in [0, -1, 1, i32::MIN, i32::MAX, -64, 63] {
            assert_eq!(decode_zigzag32(encode_zigzag32(value)), value);
        }
        for value in [0, -1, 1, i64::MIN, i64::MAX] {
            assert_eq!(decode_zigzag64(encode_zigzag64(value)), value);
        }
    }

    #[test]
    fn test_fixed_is_little_endian() {
        let mut buf = Vec::new();
        encode_fixed32(0x0403_0201, &mut buf);
        encode_fixed64(0x0807_0605_0403_0201, &mut buf);
        assert_eq!(buf, vec![1, 2, 3, 4, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decode_fixed32([1, 2, 3, 4]), 0x0403_0201);
        assert_eq!(decode_fixed64([1, 2, 3, 4, 5, 6, 7, 8]), 0x0807_0605_0403_0201);
    }

    #[test]
    fn test_overflow_after_ten_bytes() {
        let data = [0xFF; 11];
        assert!(matches!(
            decode_varint(&data).unwrap_err(),
            Error::VarintOverflow { offset: 0 }
        ));

        // Tenth byte carrying more than the top bit
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        assert!(matches!(
            decode_varint(&data).unwrap_err(),
            Error::VarintOverflow { .. }
        ));
    }

    #[test]
    fn test_truncated_varint() {
        let err = decode_varint_at(&[0x80, 0x80], 12).unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                offset: 12,
                needed: 3,
                available: 2
            }
        ));
    }
}
