// SPDX-License-Identifier: MIT
//! Bit-field codec
//!
//! Fields are stored little-endian at arbitrary bit offsets and widths. Bit `n`
//! of a buffer is bit `n % 8` of byte `n / 8`, so a field starting at bit 5
//! with width 32 spans bytes 0 to 4. Fields are at most 64 bits wide.
//!
//! Writes truncate: a value that does not fit into `width` bits is masked
//! (unsigned) or cut to its low two's-complement bits (signed). This mirrors the
//! permissiveness of the format and is not reported as an error.

use crate::error::{Error, Result};

/// Widest field the codec can address
pub const MAX_FIELD_WIDTH: usize = 64;

#[inline]
fn mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Byte range `[first, last)` covering bits `[offset, offset + width)`
#[inline]
fn byte_span(offset: usize, width: usize) -> (usize, usize) {
    (offset / 8, (offset + width + 7) / 8)
}

#[inline]
fn load(bytes: &[u8]) -> u128 {
    bytes
        .iter()
        .enumerate()
        .fold(0u128, |acc, (i, byte)| acc | (u128::from(*byte) << (8 * i)))
}

/// Read an unsigned field, zero-extended to 64 bits.
///
/// Panics if the field does not lie within `data`; use [`check_field`] when
/// the layout is not known to be valid.
#[inline]
pub fn read_unsigned(data: &[u8], offset: usize, width: usize) -> u64 {
    if width == 0 {
        return 0;
    }
    debug_assert!(width <= MAX_FIELD_WIDTH);
    let (first, last) = byte_span(offset, width);
    let window = load(&data[first..last]);
    ((window >> (offset % 8)) as u64) & mask(width)
}

/// Read a two's-complement field, sign-extended from bit `width - 1`.
#[inline]
pub fn read_signed(data: &[u8], offset: usize, width: usize) -> i64 {
    sign_extend(read_unsigned(data, offset, width), width)
}

/// Sign-extend the low `width` bits of `raw`.
#[inline]
pub fn sign_extend(raw: u64, width: usize) -> i64 {
    if width == 0 {
        return 0;
    }
    let shift = 64 - width.min(64);
    ((raw << shift) as i64) >> shift
}

/// Write the low `width` bits of `value`; bits outside the field are untouched.
#[inline]
pub fn write_unsigned(data: &mut [u8], offset: usize, width: usize, value: u64) {
    if width == 0 {
        return;
    }
    debug_assert!(width <= MAX_FIELD_WIDTH);
    let (first, last) = byte_span(offset, width);
    let window = &mut data[first..last];
    let shift = offset % 8;
    let field_mask = u128::from(mask(width)) << shift;
    let merged = (load(window) & !field_mask) | ((u128::from(value & mask(width))) << shift);
    for (i, byte) in window.iter_mut().enumerate() {
        *byte = (merged >> (8 * i)) as u8;
    }
}

/// Write a signed value, truncated to `width` two's-complement bits.
#[inline]
pub fn write_signed(data: &mut [u8], offset: usize, width: usize, value: i64) {
    write_unsigned(data, offset, width, value as u64);
}

/// Read a field by signedness, returning the value widened to `i128` so both
/// the full unsigned and the full signed 64-bit range are representable.
pub fn read_field(data: &[u8], offset: usize, width: usize, signed: bool) -> i128 {
    if signed {
        i128::from(read_signed(data, offset, width))
    } else {
        i128::from(read_unsigned(data, offset, width))
    }
}

/// Write a field by signedness. Values are truncated to `width` bits.
pub fn write_field(data: &mut [u8], offset: usize, width: usize, signed: bool, value: i128) {
    if signed {
        write_signed(data, offset, width, value as i64);
    } else {
        write_unsigned(data, offset, width, value as u64);
    }
}

/// Verify that a field fits into a struct of `size_in_bytes` bytes.
pub fn check_field(name: &str, offset: usize, width: usize, size_in_bytes: usize) -> Result<()> {
    if width > MAX_FIELD_WIDTH {
        return Err(Error::OutOfRange {
            what: format!("width of field {name}"),
            index: width as u64,
            limit: MAX_FIELD_WIDTH as u64 + 1,
        });
    }
    let end = offset + width;
    if end > size_in_bytes * 8 {
        return Err(Error::OutOfRange {
            what: format!("end bit of field {name}"),
            index: end as u64,
            limit: size_in_bytes as u64 * 8 + 1,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_byte_aligned() {
        let data = [0xEF, 0xBE, 0xAD, 0xDE];
        assert_eq!(read_unsigned(&data, 0, 32), 0xDEADBEEF);
        assert_eq!(read_unsigned(&data, 8, 8), 0xBE);
    }

    #[test]
    fn test_read_across_byte_boundary() {
        // 0b1111_0000, 0b0000_1111 -> bits 4..12 are all ones
        let data = [0xF0, 0x0F];
        assert_eq!(read_unsigned(&data, 4, 8), 0xFF);
        assert_eq!(read_unsigned(&data, 3, 2), 0b10);
    }

    #[test]
    fn test_write_preserves_neighbours() {
        let mut data = [0xFF; 3];
        write_unsigned(&mut data, 5, 7, 0);
        assert_eq!(data, [0x1F, 0xF0, 0xFF]);
        assert_eq!(read_unsigned(&data, 0, 5), 0x1F);
        assert_eq!(read_unsigned(&data, 12, 12), 0xFFF);
    }

    #[test]
    fn test_unsigned_write_truncates() {
        let mut data = [0u8; 2];
        write_unsigned(&mut data, 0, 4, 0x1F);
        assert_eq!(read_unsigned(&data, 0, 4), 0xF);
        assert_eq!(data[0] & 0xF0, 0);
    }

    #[test]
    fn test_signed_round_trip_extremes() {
        let mut data = [0u8; 9];
        for width in 1..=64usize {
            let min = if width == 64 {
                i64::MIN
            } else {
                -(1i64 << (width - 1))
            };
            let max = if width == 64 {
                i64::MAX
            } else {
                (1i64 << (width - 1)) - 1
            };
            for value in [min, max, -1, 0] {
                write_signed(&mut data, 3, width, value);
                assert_eq!(read_signed(&data, 3, width), value, "width {width}");
            }
        }
    }

    #[test]
    fn test_one_bit_signed_field() {
        let mut data = [0xFFu8; 1];
        write_signed(&mut data, 4, 1, 0);
        assert_eq!(read_signed(&data, 4, 1), 0);
        assert_eq!(data[0], 0xEF);
        write_signed(&mut data, 4, 1, -1);
        assert_eq!(read_signed(&data, 4, 1), -1);
        assert_eq!(data[0], 0xFF);
    }

    #[test]
    fn test_full_width_unsigned() {
        let mut data = [0u8; 9];
        write_unsigned(&mut data, 7, 64, u64::MAX - 1);
        assert_eq!(read_unsigned(&data, 7, 64), u64::MAX - 1);
        assert_eq!(data[0] & 0x7F, 0);
    }

    #[test]
    fn test_signed_struct_layout() {
        // a: i16 : 5, b: u32 : 32, c: i32 : 7, d: u32 : 32
        let mut data = [0u8; 10];
        write_field(&mut data, 0, 5, true, -1);
        write_field(&mut data, 5, 32, false, 0x01234567);
        write_field(&mut data, 37, 7, true, -0x28);
        write_field(&mut data, 44, 32, false, 0);
        assert_eq!(
            data,
            [0xFF, 0xAC, 0x68, 0x24, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(read_field(&data, 0, 5, true), -1);
        assert_eq!(read_field(&data, 5, 32, false), 0x01234567);
        assert_eq!(read_field(&data, 37, 7, true), -0x28);
        assert_eq!(read_field(&data, 44, 32, false), 0);
    }

    #[test]
    fn test_check_field() {
        assert!(check_field("a", 0, 8, 1).is_ok());
        assert!(matches!(
            check_field("a", 1, 8, 1),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            check_field("a", 0, 65, 16),
            Err(Error::OutOfRange { .. })
        ));
    }
}
