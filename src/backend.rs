//! The collaborators the walker hands work to.
//!
//! Hashing, signing, verification and key retrieval live outside this crate. A
//! [`SealBackend`] supplies them; the record builder and the inserter have default
//! implementations that are enough for most callers.

use crate::err::{Result, SealError};
use crate::field_store::{FieldStore, names};
use crate::record_builder::build_placeholder_record;

pub trait SealBackend {
    /// Verifies one parsed record against the whole file.
    ///
    /// Returns the record, updated with whatever chaining state the verifier wants carried to
    /// the next record (`@sflags`, cached keys, ...).
    fn verify(&mut self, record: FieldStore, buf: &[u8]) -> FieldStore;

    /// Produces `@record`, a record with a placeholder signature, and sets `@s` to the
    /// placeholder's span relative to the start of the record.
    fn build_record(&mut self, ctx: FieldStore) -> Result<FieldStore> {
        build_placeholder_record(ctx)
    }

    /// Returns a copy of `buf` with `@BLOCK` inserted at `offset`, and rebases `@s` onto the
    /// new buffer.
    fn insert(&mut self, ctx: &mut FieldStore, buf: &[u8], offset: usize) -> Result<Vec<u8>> {
        splice_block(ctx, buf, offset)
    }

    /// Computes the digest over the ranges named by `b` and writes the signature into the
    /// placeholder at `@s`.
    fn sign(&mut self, ctx: &FieldStore, buf: &mut [u8]) -> Result<()>;
}

/// Inserts `@BLOCK` into a copy of `buf` and shifts `@s` by `offset`.
pub fn splice_block(ctx: &mut FieldStore, buf: &[u8], offset: usize) -> Result<Vec<u8>> {
    if offset > buf.len() {
        return Err(SealError::InsertOutOfBounds {
            offset,
            len: buf.len(),
        });
    }
    let block = ctx.get_bytes(names::BLOCK).ok_or(SealError::MissingField {
        field: names::BLOCK,
    })?;

    let mut out = Vec::with_capacity(buf.len() + block.len());
    out.extend_from_slice(&buf[..offset]);
    out.extend_from_slice(block);
    out.extend_from_slice(&buf[offset..]);

    ctx.inc_size(names::SIG_RANGE, 0, offset);
    ctx.inc_size(names::SIG_RANGE, 1, offset);
    Ok(out)
}
