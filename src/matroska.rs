//! SEAL records in Matroska (MKV, WebM, MKA) files.
//!
//! Matroska has no standard place for comments or XMP, but players skip elements they do not
//! know. A SEAL record is stored in its own top-level element:
//!
//! ```text
//! varint(0x5345414C)  varint(length)  <seal .../><seal .../>...
//! ```
//!
//! Signing appends one such element at the end of the file.

use log::{debug, info, trace};

use crate::backend::SealBackend;
use crate::err::{Result, SealError};
use crate::field_store::{FieldStore, names};
use crate::range::signing_directive;
use crate::record_parser::parse_record;
use crate::utils::bytes;
use crate::varint::{encode_varint, read_varint};

/// EBML header magic.
pub const MATROSKA_MAGIC: [u8; 4] = [0x1a, 0x45, 0xdf, 0xa3];

/// Anything smaller is not worth looking at.
pub const MIN_MATROSKA_SIZE: usize = 16;

/// `SEAL` in ASCII; encodes as `08 53 45 41 4C`.
pub const SEAL_CHUNK_TAG: u64 = 0x5345_414c;

pub fn is_matroska(buf: &[u8]) -> bool {
    buf.len() >= MIN_MATROSKA_SIZE && bytes::read_sig(buf, 0) == Some(MATROSKA_MAGIC)
}

/// One top-level element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub tag: u64,
    /// Absolute offset of the payload.
    pub offset: usize,
    pub payload: &'a [u8],
}

/// Iterates over top-level elements, stopping at the first one that cannot be framed.
pub struct IterChunks<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> IterChunks<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        IterChunks { buf, pos: 0 }
    }

    /// Offset of the next element header.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn read_chunk(&mut self) -> Option<Chunk<'a>> {
        let mut pos = self.pos;
        let tag = read_varint(self.buf, &mut pos)?;
        let len = read_varint(self.buf, &mut pos)?;
        let len = usize::try_from(len).ok()?;
        let payload = bytes::slice(self.buf, pos, len)?;

        self.pos = pos + len;
        Some(Chunk {
            tag,
            offset: pos,
            payload,
        })
    }
}

impl<'a> Iterator for IterChunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let chunk = self.read_chunk();
        if chunk.is_none() {
            debug!("unframeable element at offset {}, stopping", IterChunks::position(self));
            self.pos = self.buf.len();
        }
        chunk
    }
}

#[derive(Debug, Clone, Default)]
pub struct SealSettings {
    sign: bool,
    append: bool,
}

impl SealSettings {
    /// Append a new signature after walking. Without this the file is only read.
    pub fn sign(mut self, sign: bool) -> Self {
        self.sign = sign;
        self
    }

    /// Sign in append mode: the digest stops after the new record so later signatures can
    /// follow it.
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn should_sign(&self) -> bool {
        self.sign
    }

    pub fn should_append(&self) -> bool {
        self.append
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealStatus {
    /// Not a Matroska file; nothing was done.
    NotRecognized,
    NoSignatures,
    /// Number of signed records seen so far, as counted in `@s`.
    Signatures(usize),
}

#[derive(Debug)]
pub struct SealReport {
    pub context: FieldStore,
    pub status: SealStatus,
    /// The signed file, when signing was requested.
    pub signed: Option<Vec<u8>>,
}

pub struct SealProcessor<B: SealBackend> {
    backend: B,
    settings: SealSettings,
}

impl<B: SealBackend> SealProcessor<B> {
    pub fn new(backend: B) -> Self {
        SealProcessor::with_settings(backend, SealSettings::default())
    }

    pub fn with_settings(backend: B, settings: SealSettings) -> Self {
        SealProcessor { backend, settings }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Verifies every record in `buf` and, if configured, signs it.
    ///
    /// Damaged framing or records never fail the call; they end the walk or are skipped.
    /// Errors only come from the signing path.
    pub fn process(&mut self, ctx: FieldStore, buf: &[u8]) -> Result<SealReport> {
        if !is_matroska(buf) {
            trace!("not a Matroska file");
            return Ok(SealReport {
                context: ctx,
                status: SealStatus::NotRecognized,
                signed: None,
            });
        }

        let ctx = self.walk(ctx, buf);
        let count = ctx
            .get_size(names::SIG_RANGE, names::RECORD_COUNT_INDEX)
            .unwrap_or(0);
        let status = if count == 0 {
            SealStatus::NoSignatures
        } else {
            SealStatus::Signatures(count)
        };

        if !self.settings.should_sign() {
            if count == 0 {
                info!("No SEAL signatures found.");
            }
            return Ok(SealReport {
                context: ctx,
                status,
                signed: None,
            });
        }

        let (ctx, signed) = self.sign(ctx, buf)?;
        Ok(SealReport {
            context: ctx,
            status,
            signed: Some(signed),
        })
    }

    /// Walks the top-level elements and verifies every record found in SEAL elements.
    ///
    /// Returns the context with the chaining fields of the last record.
    pub fn walk(&mut self, mut ctx: FieldStore, buf: &[u8]) -> FieldStore {
        for chunk in IterChunks::new(buf) {
            if chunk.tag != SEAL_CHUNK_TAG {
                trace!("skipping element {:#x} at offset {}", chunk.tag, chunk.offset);
                continue;
            }
            debug!(
                "SEAL element at offset {} ({} bytes)",
                chunk.offset,
                chunk.payload.len()
            );

            // One element may hold several concatenated records.
            let mut pos = 0;
            while pos < chunk.payload.len() {
                let start = chunk.offset + pos;
                let Some(record) = parse_record(&chunk.payload[pos..], start, Some(&ctx)) else {
                    break;
                };
                let advance = record.end.saturating_sub(start).max(1);

                let mut fields = record.fields;
                fields.copy_from(names::PUBLIC_KEY_FILE, &ctx, names::PUBLIC_KEY_FILE);
                let fields = self.backend.verify(fields, buf);

                for name in names::CHAINED {
                    ctx.copy_from(name, &fields, name);
                }
                pos += advance;
            }
        }
        ctx
    }

    /// Builds a new SEAL element for the end of `buf` and hands it to the backend.
    fn sign(&mut self, mut ctx: FieldStore, buf: &[u8]) -> Result<(FieldStore, Vec<u8>)> {
        ctx.remove("b");
        let directive = signing_directive(&ctx, self.settings.should_append());
        debug!("signing with byte range `{directive}`");
        ctx.set_text("b", &directive);

        // The last verified signature becomes the previous one.
        if ctx.contains(names::SIG_RANGE) {
            ctx.copy(names::PREV_RANGE, names::SIG_RANGE);
            ctx.inc_size(names::SIG_RANGE, names::RECORD_COUNT_INDEX, 1);
        }

        let mut ctx = self.backend.build_record(ctx)?;
        let record = ctx
            .get_bytes(names::RECORD)
            .ok_or(SealError::MissingField {
                field: names::RECORD,
            })?
            .to_vec();

        let mut block = encode_varint(SEAL_CHUNK_TAG)?;
        block.extend(encode_varint(record.len() as u64)?);
        // `@s` is relative to the record; make it relative to the element.
        let header_len = block.len();
        ctx.inc_size(names::SIG_RANGE, 0, header_len);
        ctx.inc_size(names::SIG_RANGE, 1, header_len);
        block.extend_from_slice(&record);
        ctx.set_bytes(names::BLOCK, &block);

        let mut out = self.backend.insert(&mut ctx, buf, buf.len())?;
        self.backend.sign(&ctx, &mut out)?;
        Ok((ctx, out))
    }
}
