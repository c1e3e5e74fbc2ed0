//! Placeholder `<seal .../>` records for signing.
//!
//! The signer needs a record whose `s` value is already the right size so that inserting it
//! does not shift any byte the digest covers. The placeholder is overwritten in place once
//! the digest has been computed.

use crate::err::{Result, SealError};
use crate::field_store::{FieldStore, names};
use crate::utils::escape::quote_in_place;

/// Placeholder length used when the context has no `@sigsize`.
pub const DEFAULT_SIGNATURE_SIZE: usize = 64;

/// Record attributes copied from the context, in output order.
const RECORD_ATTRIBUTES: [&str; 7] = ["seal", "kv", "ka", "da", "sf", "id", "d"];

fn push_attribute(record: &mut Vec<u8>, name: &str, value: &[u8]) {
    let mut value = value.to_vec();
    quote_in_place(&mut value);
    record.push(b' ');
    record.extend_from_slice(name.as_bytes());
    record.extend_from_slice(b"=\"");
    record.extend_from_slice(&value);
    record.push(b'"');
}

/// Builds `@record` from the context and sets `@s` to the placeholder's span, relative to
/// the first byte of the record.
///
/// The context must already carry the byte-range directive in `b`.
pub fn build_placeholder_record(mut ctx: FieldStore) -> Result<FieldStore> {
    let directive = ctx
        .get_bytes("b")
        .ok_or(SealError::MissingField { field: "b" })?
        .to_vec();
    let sig_size = ctx
        .get_size(names::SIG_SIZE, 0)
        .unwrap_or(DEFAULT_SIGNATURE_SIZE);

    let mut record = b"<seal".to_vec();
    for name in RECORD_ATTRIBUTES {
        match ctx.get_bytes(name) {
            Some(value) => push_attribute(&mut record, name, value),
            None if name == "seal" => push_attribute(&mut record, name, b"1"),
            None => {}
        }
    }
    push_attribute(&mut record, "b", &directive);

    record.extend_from_slice(b" s=\"");
    let start = record.len();
    record.resize(start + sig_size, b'0');
    let end = record.len();
    record.extend_from_slice(b"\"/>");

    ctx.set_text_bytes(names::RECORD, &record);
    ctx.set_size(names::SIG_RANGE, 0, start);
    ctx.set_size(names::SIG_RANGE, 1, end);
    Ok(ctx)
}
