//! In-place text transforms for record attribute values.
//!
//! Values inside a SEAL record are either backslash-quoted (`'...'`, `"..."`, bare) or, in
//! the `<xmp:seal>` form, XML-entity encoded. These helpers convert a [`Field`] between its
//! wire and decoded form without changing its type.

use crate::field_store::Field;

const ENTITIES: [(&[u8], u8); 5] = [
    (b"&lt;", b'<'),
    (b"&gt;", b'>'),
    (b"&quot;", b'"'),
    (b"&apos;", b'\''),
    (b"&amp;", b'&'),
];

#[inline]
fn needs_backslash(b: u8) -> bool {
    matches!(b, b'\'' | b'"' | b'\\')
}

#[inline]
fn is_printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

/// Removes backslash quoting: every `\` is dropped and the byte after it is kept verbatim.
pub fn quote_decode(field: &mut Field) {
    unquote_in_place(field.bytes_mut());
}

/// Adds backslash quoting in front of `'`, `"` and `\`.
pub fn quote_encode(field: &mut Field) {
    quote_in_place(field.bytes_mut());
}

/// Replaces XML entities (`&lt;`, `&#65;`, `&#x41;`, ...) with the bytes they stand for.
pub fn entity_decode(field: &mut Field) {
    entity_decode_in_place(field.bytes_mut());
}

/// Encodes markup characters as named entities and non-printable bytes as `&#xHH;`.
pub fn entity_encode(field: &mut Field) {
    let encoded = entity_encode_bytes(field.bytes());
    *field.bytes_mut() = encoded;
}

pub(crate) fn unquote_in_place(buf: &mut Vec<u8>) {
    let len = buf.len();
    let mut i = 0;
    let mut j = 0;
    while i < len {
        if buf[i] == b'\\' {
            i += 1;
            if i == len {
                break;
            }
        }
        buf[j] = buf[i];
        i += 1;
        j += 1;
    }
    buf.truncate(j);
}

pub(crate) fn quote_in_place(buf: &mut Vec<u8>) {
    let extra = buf.iter().filter(|b| needs_backslash(**b)).count();
    if extra == 0 {
        return;
    }

    // Grow first, then fill from the tail so nothing is overwritten before it is read.
    let old_len = buf.len();
    buf.resize(old_len + extra, 0);
    let mut j = buf.len();
    for i in (0..old_len).rev() {
        let c = buf[i];
        j -= 1;
        buf[j] = c;
        if needs_backslash(c) {
            j -= 1;
            buf[j] = b'\\';
        }
    }
    debug_assert_eq!(j, 0);
}

/// Big-endian octets of a numeric entity, 1 to 4 bytes depending on magnitude.
fn code_point_bytes(n: u32) -> ([u8; 4], usize) {
    let be = n.to_be_bytes();
    let width = if n > 0x00ff_ffff {
        4
    } else if n > 0xffff {
        3
    } else if n > 0xff {
        2
    } else {
        1
    };
    (be, width)
}

/// Parses the digits of a numeric entity starting at `i`. Returns the value, whether any
/// digit was seen, and the index after the entity (past a `;` terminator if present).
fn numeric_entity(buf: &[u8], mut i: usize, radix: u32) -> (u32, bool, usize) {
    let mut n: u32 = 0;
    let mut seen = false;
    while let Some(d) = buf.get(i).and_then(|c| char::from(*c).to_digit(radix)) {
        n = n.wrapping_mul(radix).wrapping_add(d);
        seen = true;
        i += 1;
    }
    if buf.get(i) == Some(&b';') {
        i += 1;
    }
    (n, seen, i)
}

pub(crate) fn entity_decode_in_place(buf: &mut Vec<u8>) {
    let len = buf.len();
    let mut i = 0;
    let mut j = 0;

    // Every entity is longer than what it decodes to, so `j` never overtakes `i`.
    while i < len {
        let numeric = if i + 5 <= len && buf[i..].starts_with(b"&#x") {
            Some(numeric_entity(buf, i + 3, 16))
        } else if i + 4 <= len && buf[i..].starts_with(b"&#") {
            Some(numeric_entity(buf, i + 2, 10))
        } else {
            None
        };

        if let Some((n, seen, next)) = numeric {
            if seen {
                let (be, width) = code_point_bytes(n);
                for b in &be[4 - width..] {
                    buf[j] = *b;
                    j += 1;
                }
            }
            i = next;
            continue;
        }

        match ENTITIES
            .iter()
            .find(|(code, _)| buf[i..].starts_with(code))
        {
            Some((code, c)) => {
                buf[j] = *c;
                i += code.len();
            }
            None => {
                buf[j] = buf[i];
                i += 1;
            }
        }
        j += 1;
    }
    buf.truncate(j);
}

pub(crate) fn entity_encode_bytes(input: &[u8]) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut out = Vec::with_capacity(input.len());
    for &b in input {
        if !is_printable(b) {
            out.extend_from_slice(&[
                b'&',
                b'#',
                b'x',
                HEX[usize::from(b >> 4)],
                HEX[usize::from(b & 0x0f)],
                b';',
            ]);
        } else if let Some((code, _)) = ENTITIES.iter().find(|(_, c)| *c == b) {
            out.extend_from_slice(code);
        } else {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_store::FieldType;
    use pretty_assertions::assert_eq;

    fn text(value: &[u8]) -> Field {
        Field::new("v", FieldType::Char, value.to_vec())
    }

    #[test]
    fn test_quote_decode() {
        let mut f = text(br#"Neal\'s \"test\" \\ done\"#);
        quote_decode(&mut f);
        assert_eq!(f.bytes(), br#"Neal's "test" \ done"#);
    }

    #[test]
    fn test_quote_decode_never_grows() {
        for input in [&b"\\\\\\"[..], b"abc", b"\\a\\b", b""] {
            let mut f = text(input);
            quote_decode(&mut f);
            assert!(f.len() <= input.len());
        }
    }

    #[test]
    fn test_quote_round_trip() {
        for input in [
            &br#"Neal\'s \"test\" \\ done"#[..],
            br#"\"\"\'"#,
            br#"plain"#,
            br#"\\\\"#,
        ] {
            let mut f = text(input);
            quote_decode(&mut f);
            quote_encode(&mut f);
            assert_eq!(f.bytes(), input);
        }
    }

    #[test]
    fn test_quote_encode_expands_from_tail() {
        let mut f = text(br#"a"b'c"#);
        quote_encode(&mut f);
        assert_eq!(f.bytes(), br#"a\"b\'c"#);
    }

    #[test]
    fn test_entity_decode_named_and_numeric() {
        let mut f = text(b"Yeah&amp;&#65;bb&#x44;cc&#x09;dd&lt;&gt;&quot;&apos;");
        entity_decode(&mut f);
        assert_eq!(f.bytes(), b"Yeah&AbbDcc\tdd<>\"'");
    }

    #[test]
    fn test_entity_decode_wide_code_points_are_big_endian() {
        let mut f = text(b"&#x1F600;&#x100;&#16777217;");
        entity_decode(&mut f);
        assert_eq!(f.bytes(), &[0x01, 0xf6, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_entity_round_trip_every_byte() {
        for b in 0..=255_u8 {
            let mut f = text(&[b]);
            entity_encode(&mut f);
            entity_decode(&mut f);
            assert_eq!(f.bytes(), &[b], "byte {b:#04x}");
        }
    }

    #[test]
    fn test_entity_encode_non_printable() {
        let mut f = text(b"a\x00<\x7f");
        entity_encode(&mut f);
        assert_eq!(f.bytes(), b"a&#x00;&lt;&#x7f;");
    }
}
