//! Hex and base64 transforms for signature and key material.
//!
//! Decoding is forgiving in the way the rest of the crate is: bad input never errors, it
//! just leaves an empty (unusable) value behind.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::field_store::{Field, FieldType};

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[inline]
fn is_base64(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

/// Hex text to binary. Any non-hex digit or an odd digit count leaves an empty value.
pub fn hex_decode(field: &mut Field) {
    let decoded = hex::decode(field.bytes()).unwrap_or_default();
    field.replace(FieldType::Binary, decoded);
}

/// Binary to hex text.
pub fn hex_encode(field: &mut Field, uppercase: bool) {
    let encoded = if uppercase {
        hex::encode_upper(field.bytes())
    } else {
        hex::encode(field.bytes())
    };
    field.replace(FieldType::Char, encoded.into_bytes());
}

/// Base64 text to binary.
///
/// Decoding stops at the first byte outside the base64 alphabet (padding included); the
/// prefix before it is padded out to a multiple of four and decoded.
pub fn base64_decode(field: &mut Field) {
    let valid = field
        .bytes()
        .iter()
        .position(|b| !is_base64(*b))
        .unwrap_or(field.len());

    let mut input = field.bytes()[..valid].to_vec();
    // A single dangling character carries fewer than 8 bits.
    if input.len() % 4 == 1 {
        input.pop();
    }
    while input.len() % 4 != 0 {
        input.push(b'=');
    }

    let decoded = LENIENT.decode(&input).unwrap_or_default();
    field.replace(FieldType::Binary, decoded);
}

/// Binary to padded, standard-alphabet base64 text.
pub fn base64_encode(field: &mut Field) {
    let encoded = STANDARD.encode(field.bytes());
    field.replace(FieldType::Char, encoded.into_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(kind: FieldType, value: &[u8]) -> Field {
        Field::new("v", kind, value.to_vec())
    }

    #[test]
    fn test_hex_decode_rejects_bad_input() {
        for bad in [&b"abc"[..], b"zz", b"0g", b"12 34"] {
            let mut f = field(FieldType::Char, bad);
            hex_decode(&mut f);
            assert_eq!(f.len(), 0, "{:?}", String::from_utf8_lossy(bad));
            assert_eq!(f.kind(), FieldType::Binary);
        }
    }

    #[test]
    fn test_hex_decode_mixed_case() {
        let mut f = field(FieldType::Char, b"DEadBe0f");
        hex_decode(&mut f);
        assert_eq!(f.bytes(), &[0xde, 0xad, 0xbe, 0x0f]);
    }

    #[test]
    fn test_hex_round_trip() {
        let all: Vec<u8> = (0..=255).collect();
        for upper in [false, true] {
            let mut f = field(FieldType::Binary, &all);
            hex_encode(&mut f, upper);
            assert_eq!(f.kind(), FieldType::Char);
            assert_eq!(f.len(), 512);
            hex_decode(&mut f);
            assert_eq!(f.bytes(), &all[..]);
        }
    }

    #[test]
    fn test_base64_decode_pads() {
        let mut f = field(FieldType::Char, b"SGVsbG8");
        base64_decode(&mut f);
        assert_eq!(f.bytes(), b"Hello");
    }

    #[test]
    fn test_base64_decode_stops_at_foreign_byte() {
        let mut f = field(FieldType::Char, b"SGVsbG8gV29ybGQ=\"/>trailing");
        base64_decode(&mut f);
        assert_eq!(f.bytes(), b"Hello World");

        let mut f = field(FieldType::Char, b"SGVs*bG8=");
        base64_decode(&mut f);
        assert_eq!(f.bytes(), b"Hel");
    }

    #[test]
    fn test_base64_round_trip() {
        let mut f = field(FieldType::Binary, &[0, 1, 2, 250, 251, 255, 7]);
        base64_encode(&mut f);
        assert_eq!(f.bytes(), b"AAEC+vv/Bw==");
        base64_decode(&mut f);
        assert_eq!(f.bytes(), &[0, 1, 2, 250, 251, 255, 7]);
    }
}
