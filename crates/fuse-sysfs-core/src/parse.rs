// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Integer parsing for values written into virtual entries

use crate::error::{FsError, FsResult};

/// Parse a signed integer the way `strtoll(.., 0)` would, but strictly.
///
/// The input is cut at the first NUL and surrounding C-locale whitespace
/// (vertical tab included) is ignored. A `0x`/`0X` prefix selects base 16
/// and a leading `0` followed by more digits selects base 8; anything else
/// is decimal. Trailing garbage,
/// empty input and out-of-range values are rejected with `InvalidArgument`.
pub fn parse_num(buf: &[u8]) -> FsResult<i64> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let text = trim_space(&buf[..end]);

    let (negative, text) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, text),
    };

    let hex = text.strip_prefix(b"0x").or_else(|| text.strip_prefix(b"0X"));
    let (radix, digits) = if let Some(hex) = hex {
        (16, hex)
    } else if text.len() > 1 && text[0] == b'0' {
        (8, &text[1..])
    } else {
        (10, text)
    };

    if digits.is_empty() {
        return Err(FsError::InvalidArgument);
    }

    // Accumulate towards the sign so that i64::MIN is representable.
    let mut value: i64 = 0;
    for &b in digits {
        let digit = (b as char).to_digit(radix).ok_or(FsError::InvalidArgument)? as i64;
        value = value.checked_mul(radix as i64).ok_or(FsError::InvalidArgument)?;
        value = if negative {
            value.checked_sub(digit)
        } else {
            value.checked_add(digit)
        }
        .ok_or(FsError::InvalidArgument)?;
    }
    Ok(value)
}

/// `isspace` in the C locale; `u8::is_ascii_whitespace` leaves out `\x0b`.
fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace() || b == 0x0b
}

fn trim_space(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !is_space(*first) {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !is_space(*last) {
            break;
        }
        bytes = rest;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_each_radix() {
        assert_eq!(parse_num(b"0x1A").unwrap(), 26);
        assert_eq!(parse_num(b"0XfF").unwrap(), 255);
        assert_eq!(parse_num(b"010").unwrap(), 8);
        assert_eq!(parse_num(b"42").unwrap(), 42);
        assert_eq!(parse_num(b"0").unwrap(), 0);
    }

    #[test]
    fn trims_whitespace_and_nul() {
        assert_eq!(parse_num(b"  -17 ").unwrap(), -17);
        assert_eq!(parse_num(b"0\n").unwrap(), 0);
        assert_eq!(parse_num(b"128\n\0garbage").unwrap(), 128);
        assert_eq!(parse_num(b"+5").unwrap(), 5);
        assert_eq!(parse_num(b"12\x0b").unwrap(), 12);
        assert_eq!(parse_num(b"\x0b\x0c\t12\r\x0c").unwrap(), 12);
    }

    #[test]
    fn rejects_malformed_input() {
        let cases: [&[u8]; 10] =
            [b"", b"   ", b"12x", b"08", b"-", b"0x", b"1 2", b"--1", b"\0", b"\x0b"];
        for bad in cases {
            assert!(
                matches!(parse_num(bad), Err(FsError::InvalidArgument)),
                "{:?} should be rejected",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn range_limits() {
        assert_eq!(parse_num(b"9223372036854775807").unwrap(), i64::MAX);
        assert_eq!(parse_num(b"-9223372036854775808").unwrap(), i64::MIN);
        assert!(parse_num(b"9223372036854775808").is_err());
        assert!(parse_num(b"-0x8000000000000001").is_err());
    }
}
