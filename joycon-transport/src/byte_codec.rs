//! Integer and hex-string conversions over byte ranges
//!
//! Every other layer extracts fields through these helpers, so range checks
//! live here once.

use std::fmt::Write as _;

use crate::error::TransportError;

/// Byte order for multi-byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Most significant byte first (hardware default)
    #[default]
    Big,
    /// Least significant byte first (SPI addresses, IMU samples, voltages)
    Little,
}

/// Widest integer the codec converts to or from
const MAX_INT_BYTES: usize = std::mem::size_of::<u64>();

/// Validate that `start..start+length` lies inside a buffer of `size` bytes
pub fn check_range(start: usize, length: usize, size: usize) -> Result<(), TransportError> {
    match start.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransportError::Range {
            start,
            length,
            size,
        }),
    }
}

/// Read `length` bytes at `start` as an unsigned integer
pub fn to_int(
    bytes: &[u8],
    start: usize,
    length: usize,
    endian: Endian,
) -> Result<u64, TransportError> {
    check_range(start, length, bytes.len())?;
    if length > MAX_INT_BYTES {
        return Err(TransportError::Overflow(format!(
            "{length} bytes do not fit a {MAX_INT_BYTES}-byte integer"
        )));
    }

    let field = &bytes[start..start + length];
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    Ok(match endian {
        Endian::Big => field.iter().fold(0, fold),
        Endian::Little => field.iter().rev().fold(0, fold),
    })
}

/// Write `value` into `length` bytes at `start`
///
/// Fails with `Overflow` if `length` is wider than a `u64` or `value` needs
/// more than `length` bytes.
pub fn from_int(
    value: u64,
    out: &mut [u8],
    start: usize,
    length: usize,
    endian: Endian,
) -> Result<(), TransportError> {
    check_range(start, length, out.len())?;
    if length > MAX_INT_BYTES {
        return Err(TransportError::Overflow(format!(
            "{length} bytes exceed a {MAX_INT_BYTES}-byte integer"
        )));
    }
    if length < MAX_INT_BYTES && value >> (length * 8) != 0 {
        return Err(TransportError::Overflow(format!(
            "value 0x{value:X} does not fit in {length} bytes"
        )));
    }

    let field = &mut out[start..start + length];
    for (i, slot) in field.iter_mut().enumerate() {
        let shift = match endian {
            Endian::Big => (length - 1 - i) * 8,
            Endian::Little => i * 8,
        };
        *slot = (value >> shift) as u8;
    }
    Ok(())
}

/// Render `length` bytes at `start` as zero-padded hex
///
/// `prefix` is written once before the first byte; `delimiter` between bytes.
/// An empty range renders as an empty string.
pub fn to_hex_string(
    bytes: &[u8],
    start: usize,
    length: usize,
    prefix: &str,
    delimiter: &str,
) -> Result<String, TransportError> {
    check_range(start, length, bytes.len())?;
    if length == 0 {
        return Ok(String::new());
    }

    let mut out =
        String::with_capacity(prefix.len() + length * 2 + (length - 1) * delimiter.len());
    out.push_str(prefix);
    for (i, b) in bytes[start..start + length].iter().enumerate() {
        if i > 0 {
            out.push_str(delimiter);
        }
        let _ = write!(out, "{b:02x}");
    }
    Ok(out)
}

/// Space-delimited hex of a whole slice, used for packet logging
pub fn hex_dump(bytes: &[u8]) -> String {
    to_hex_string(bytes, 0, bytes.len(), "", " ").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_to_int_endianness() {
        let data = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(to_int(&data, 0, 2, Endian::Big).unwrap(), 0x1234);
        assert_eq!(to_int(&data, 0, 2, Endian::Little).unwrap(), 0x3412);
        assert_eq!(to_int(&data, 1, 3, Endian::Big).unwrap(), 0x345678);
        assert_eq!(to_int(&data, 4, 0, Endian::Big).unwrap(), 0);
    }

    #[test]
    fn test_to_int_range_error() {
        let data = [0u8; 4];
        let err = to_int(&data, 3, 2, Endian::Big).unwrap_err();
        assert_eq!(
            err,
            TransportError::Range {
                start: 3,
                length: 2,
                size: 4
            }
        );
        assert!(to_int(&data, usize::MAX, 2, Endian::Big).is_err());
    }

    #[test]
    fn test_to_int_overflow() {
        let data = [0xFFu8; 9];
        assert!(matches!(
            to_int(&data, 0, 9, Endian::Big),
            Err(TransportError::Overflow(_))
        ));
        assert_eq!(to_int(&data, 0, 8, Endian::Big).unwrap(), u64::MAX);
    }

    #[test]
    fn test_from_int() {
        let mut out = [0u8; 6];
        from_int(0x6020, &mut out, 0, 4, Endian::Little).unwrap();
        assert_eq!(out, [0x20, 0x60, 0x00, 0x00, 0x00, 0x00]);

        from_int(0xBEEF, &mut out, 4, 2, Endian::Big).unwrap();
        assert_eq!(&out[4..], &[0xBE, 0xEF]);

        assert!(matches!(
            from_int(0x1_00, &mut out, 0, 1, Endian::Big),
            Err(TransportError::Overflow(_))
        ));
        assert!(matches!(
            from_int(1, &mut out, 5, 2, Endian::Big),
            Err(TransportError::Range { .. })
        ));
    }

    #[test]
    fn test_hex_string_padding() {
        let data = [0x01, 0xAB, 0x00];
        assert_eq!(to_hex_string(&data, 0, 3, "", "").unwrap(), "01ab00");
        assert_eq!(to_hex_string(&data, 0, 3, "0x", " ").unwrap(), "0x01 ab 00");
        assert_eq!(to_hex_string(&data, 1, 0, "0x", ":").unwrap(), "");
        assert!(to_hex_string(&data, 2, 2, "", "").is_err());
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x00, 0x01, 0x40, 0x40]), "00 01 40 40");
        assert_eq!(hex_dump(&[]), "");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_hex_string_length(
            data in prop::collection::vec(any::<u8>(), 0..64),
            start_frac in 0.0f64..=1.0,
            len_frac in 0.0f64..=1.0,
            prefix in "[a-z]{0,3}",
            delimiter in "[ :,-]{0,2}",
        ) {
            let start = (data.len() as f64 * start_frac) as usize;
            let length = ((data.len() - start) as f64 * len_frac) as usize;
            let hex = to_hex_string(&data, start, length, &prefix, &delimiter).unwrap();

            let expected = if length == 0 {
                0
            } else {
                2 * length + prefix.len() + (length - 1) * delimiter.len()
            };
            prop_assert_eq!(hex.len(), expected);
        }
    }
}
