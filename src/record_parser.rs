//! Scanner for `<seal .../>` records embedded in arbitrary bytes.
//!
//! This is **not** an XML parser. It recognizes just enough to pull one attribute list out
//! of a span:
//!
//! ```text
//! <seal name=value name='value' name="value" ... />
//! <xmp:seal>name=&quot;value&quot; ...</xmp:seal>
//! ```
//!
//! The surrounding bytes are usually binary media data, so any malformed candidate simply
//! restarts the scan a little further on. The scanner always moves forward, so it terminates
//! on any input.

use log::{debug, trace, warn};
use std::ops::Range;

use crate::field_store::{FieldStore, names};
use crate::utils::bytes;
use crate::utils::escape::{entity_decode_in_place, unquote_in_place};

/// Spans shorter than this can never hold a record.
pub const MIN_RECORD_SPAN: usize = 10;

const SEAL_TAG: &[u8] = b"<seal";
const XMP_SEAL_TAG: &[u8] = b"<xmp:seal";
const QUOT: &[u8] = b"&quot;";

/// Chaining fields copied verbatim from the prior context when a signature is found.
const INHERITED: [&str; 4] = [
    names::SIG_FLAGS,
    names::DNS_CACHE,
    names::PUBLIC_KEY,
    names::PUBLIC_KEY_BIN,
];

/// One parsed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealRecord {
    pub fields: FieldStore,
    /// Absolute file span of the `s` attribute's value, if the record has one.
    pub signature: Option<Range<usize>>,
    /// Absolute file offset just past the record.
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagForm {
    Seal,
    XmpSeal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for `<seal` or `<xmp:seal`.
    Seek,
    /// Looking for the next `name=` or the end of the record.
    Attribute,
    /// Reading a value; `name` is the span of the attribute name.
    Value { name: (usize, usize) },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Bare,
    Char(u8),
    Entity,
}

/// A value located inside the span.
struct ScannedValue {
    quote: Quote,
    start: usize,
    end: usize,
    /// First byte after the value and its closing quote.
    next: usize,
}

/// The record currently being assembled.
struct Attempt {
    form: TagForm,
    fields: FieldStore,
    signature: Option<Range<usize>>,
    attributes: usize,
}

impl Attempt {
    fn new(form: TagForm) -> Self {
        Attempt {
            form,
            fields: FieldStore::new(),
            signature: None,
            attributes: 0,
        }
    }
}

/// ASCII whitespace plus vertical tab.
#[inline]
fn is_space(c: u8) -> bool {
    c.is_ascii_whitespace() || c == 0x0b
}

/// Recognizes an opening tag at `i`. Returns the form and the index after the byte that
/// follows the tag name (`>` or whitespace).
fn opening_tag(span: &[u8], i: usize) -> Option<(TagForm, usize)> {
    for (tag, form) in [(SEAL_TAG, TagForm::Seal), (XMP_SEAL_TAG, TagForm::XmpSeal)] {
        if !bytes::matches_at(span, i, tag) {
            continue;
        }
        let after = i + tag.len();
        match bytes::read_u8(span, after) {
            Some(c) if c == b'>' || is_space(c) => return Some((form, after + 1)),
            _ => return None,
        }
    }
    None
}

fn scan_value(span: &[u8], mut i: usize) -> Option<ScannedValue> {
    let quote = match bytes::read_u8(span, i)? {
        c @ (b'"' | b'\'') => {
            i += 1;
            Quote::Char(c)
        }
        _ if bytes::matches_at(span, i, QUOT) => {
            i += QUOT.len();
            Quote::Entity
        }
        _ => Quote::Bare,
    };

    let start = i;
    while i < span.len() {
        let c = span[i];
        if c == b'\\' {
            i += 2;
            continue;
        }
        let closed = match quote {
            Quote::Bare if is_space(c) || c == b'<' || c == b'>' => Some(i),
            Quote::Char(q) if c == q => Some(i + 1),
            Quote::Entity if bytes::matches_at(span, i, QUOT) => Some(i + QUOT.len()),
            _ => None,
        };
        if let Some(next) = closed {
            return Some(ScannedValue {
                quote,
                start,
                end: i,
                next,
            });
        }
        i += 1;
    }
    None
}

/// Stores one attribute into the attempt.
fn finalize_attribute(
    attempt: &mut Attempt,
    span: &[u8],
    offset: usize,
    name: (usize, usize),
    value: &ScannedValue,
    prior: Option<&FieldStore>,
) {
    let name = String::from_utf8_lossy(&span[name.0..name.1]).into_owned();

    if attempt.fields.contains(&name) {
        warn!("'{name}' redefined");
    }

    if name == "s" {
        attempt
            .fields
            .set_size(names::SIG_RANGE_RELATIVE, 0, value.start);
        attempt
            .fields
            .set_size(names::SIG_RANGE_RELATIVE, 1, value.end);
        attempt
            .fields
            .set_size(names::SIG_RANGE, 0, offset + value.start);
        attempt.fields.set_size(names::SIG_RANGE, 1, offset + value.end);
        attempt.signature = Some(offset + value.start..offset + value.end);

        if let Some(prior) = prior {
            let count = prior
                .get_size(names::SIG_RANGE, names::RECORD_COUNT_INDEX)
                .unwrap_or(0);
            attempt
                .fields
                .copy_from(names::PREV_RANGE, prior, names::SIG_RANGE);
            attempt
                .fields
                .set_size(names::SIG_RANGE, names::RECORD_COUNT_INDEX, count + 1);
            for field in INHERITED {
                attempt.fields.copy_from(field, prior, field);
            }
        }
    }

    let mut raw = span[value.start..value.end].to_vec();
    match value.quote {
        Quote::Entity => entity_decode_in_place(&mut raw),
        Quote::Bare | Quote::Char(_) => unquote_in_place(&mut raw),
    }
    attempt.fields.set_text_bytes(&name, &raw);
    attempt.attributes += 1;
}

fn complete(attempt: Attempt, offset: usize, end: usize) -> SealRecord {
    let mut fields = attempt.fields;
    fields.set_size(names::RECORD_END, 0, offset + end);
    debug!(
        "found SEAL record ending at offset {} with {} attributes",
        offset + end,
        attempt.attributes
    );
    SealRecord {
        fields,
        signature: attempt.signature,
        end: offset + end,
    }
}

/// Finds the first well-formed record in `span`.
///
/// `offset` is the absolute file position of `span[0]`; every position stored in the result
/// is absolute. When `prior` is given, the record is chained to it: the prior `@s` becomes
/// `@p`, the record counter in `@s` is incremented and cached key material is carried over.
pub fn parse_record(
    span: &[u8],
    offset: usize,
    prior: Option<&FieldStore>,
) -> Option<SealRecord> {
    let len = span.len();
    if len < MIN_RECORD_SPAN {
        return None;
    }

    let mut state = State::Seek;
    let mut attempt = Attempt::new(TagForm::Seal);
    let mut i = 0;

    while i < len {
        match state {
            State::Seek => {
                if span[i] == b'<' {
                    if let Some((form, next)) = opening_tag(span, i) {
                        trace!("opening tag {form:?} at {}", offset + i);
                        attempt = Attempt::new(form);
                        state = State::Attribute;
                        i = next;
                        continue;
                    }
                }
                i += 1;
            }
            State::Attribute => {
                let c = span[i];
                if is_space(c) {
                    i += 1;
                    continue;
                }

                let terminator = if c == b'>' {
                    Some(i + 1)
                } else if bytes::matches_at(span, i, b"/>") {
                    Some(i + 2)
                } else {
                    None
                };
                if let Some(end) = terminator {
                    if attempt.attributes > 0 {
                        return Some(complete(attempt, offset, end));
                    }
                    trace!("empty record at {}", offset + i);
                    state = State::Seek;
                    i = end;
                    continue;
                }

                if c == b'<' {
                    // Implicit end of this attempt; the `<` may open the next one.
                    state = State::Seek;
                    continue;
                }
                if !c.is_ascii_alphabetic() {
                    trace!("bad attribute start {c:#04x} at {}", offset + i);
                    state = State::Seek;
                    i += 1;
                    continue;
                }

                let name_start = i;
                while i < len && span[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                if bytes::read_u8(span, i) == Some(b'=') {
                    state = State::Value {
                        name: (name_start, i),
                    };
                    i += 1;
                } else {
                    trace!("attribute without value at {}", offset + name_start);
                    state = State::Seek;
                }
            }
            State::Value { name } => {
                let Some(value) = scan_value(span, i) else {
                    // Unterminated value; anything after its start may still hold a record.
                    trace!("unterminated value at {}", offset + i);
                    state = State::Seek;
                    i += 1;
                    continue;
                };

                finalize_attribute(&mut attempt, span, offset, name, &value, prior);
                i = value.next;

                match bytes::read_u8(span, i) {
                    None => return Some(complete(attempt, offset, len)),
                    Some(c) if is_space(c) => state = State::Attribute,
                    Some(b'<' | b'>' | b'/') => {
                        let end = span[i..]
                            .iter()
                            .position(|b| *b == b'>')
                            .map_or(len, |p| i + p + 1);
                        return Some(complete(attempt, offset, end));
                    }
                    Some(c) => {
                        trace!("unexpected {c:#04x} after value at {}", offset + i);
                        state = State::Seek;
                    }
                }
            }
        }
    }

    // Only the `<xmp:seal>` form may run to the end of the span; its closing tag is not ours.
    if state == State::Attribute && attempt.form == TagForm::XmpSeal && attempt.attributes > 0 {
        return Some(complete(attempt, offset, len));
    }
    None
}
