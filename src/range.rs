//! Byte-range directives: the `b` attribute of a SEAL record.
//!
//! A directive lists the file spans covered by the digest, e.g. `F~S,s~f` ("from the start
//! of the file to the start of the signature, and from the end of the signature to the end
//! of the file"). Anchors:
//!
//! | anchor | position |
//! |--------|----------|
//! | `F` / `f` | start / end of file |
//! | `S` / `s` | start / end of this record's signature value (`@s`) |
//! | `P` / `p` | start / end of the previous record's signature value (`@p`) |
//!
//! Each anchor may carry a signed decimal adjustment (`s+3`). Ranges are half-open.
//! The grammar is shared with the signer and verifier and has to match them exactly.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::err::{Result, SealError};
use crate::field_store::{FieldStore, names};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    FileStart,
    FileEnd,
    SignatureStart,
    SignatureEnd,
    PreviousStart,
    PreviousEnd,
}

impl Anchor {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'F' => Some(Anchor::FileStart),
            'f' => Some(Anchor::FileEnd),
            'S' => Some(Anchor::SignatureStart),
            's' => Some(Anchor::SignatureEnd),
            'P' => Some(Anchor::PreviousStart),
            'p' => Some(Anchor::PreviousEnd),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Anchor::FileStart => 'F',
            Anchor::FileEnd => 'f',
            Anchor::SignatureStart => 'S',
            Anchor::SignatureEnd => 's',
            Anchor::PreviousStart => 'P',
            Anchor::PreviousEnd => 'p',
        }
    }

    fn resolve(self, ctx: &FieldStore, file_len: usize) -> Result<usize> {
        let lookup = |name: &str, index: usize| {
            ctx.get_size(name, index)
                .ok_or(SealError::MissingAnchor {
                    anchor: self.as_char(),
                })
        };
        match self {
            Anchor::FileStart => Ok(0),
            Anchor::FileEnd => Ok(file_len),
            Anchor::SignatureStart => lookup(names::SIG_RANGE, 0),
            Anchor::SignatureEnd => lookup(names::SIG_RANGE, 1),
            Anchor::PreviousStart => lookup(names::PREV_RANGE, 0),
            Anchor::PreviousEnd => lookup(names::PREV_RANGE, 1),
        }
    }
}

/// An anchor plus adjustment, e.g. `s+3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub anchor: Anchor,
    pub adjust: i64,
}

impl Position {
    fn parse(token: &str, directive: &str) -> Result<Self> {
        let invalid = |reason| SealError::InvalidRangeDirective {
            directive: directive.to_string(),
            reason,
        };

        let mut chars = token.chars();
        let anchor = chars
            .next()
            .and_then(Anchor::from_char)
            .ok_or_else(|| invalid("unknown anchor"))?;
        let rest = chars.as_str();

        let adjust = if rest.is_empty() {
            0
        } else {
            let (sign, digits) = if let Some(digits) = rest.strip_prefix('+') {
                (1, digits)
            } else if let Some(digits) = rest.strip_prefix('-') {
                (-1, digits)
            } else {
                return Err(invalid("expected `+` or `-` after anchor"));
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("bad offset"));
            }
            let n: i64 = digits.parse().map_err(|_| invalid("offset too large"))?;
            sign * n
        };

        Ok(Position { anchor, adjust })
    }

    fn resolve(&self, ctx: &FieldStore, file_len: usize) -> Result<i64> {
        let base = self.anchor.resolve(ctx, file_len)?;
        Ok(i64::try_from(base).unwrap_or(i64::MAX).saturating_add(self.adjust))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.anchor.as_char())?;
        if self.adjust != 0 {
            write!(f, "{:+}", self.adjust)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRangeDirective {
    ranges: Vec<RangeSpec>,
}

impl ByteRangeDirective {
    pub fn ranges(&self) -> &[RangeSpec] {
        &self.ranges
    }

    /// Resolves every range against the record's `@s`/`@p` and the file length.
    pub fn resolve(&self, ctx: &FieldStore, file_len: usize) -> Result<Vec<Range<usize>>> {
        let mut out = Vec::with_capacity(self.ranges.len());
        for spec in &self.ranges {
            let start = spec.start.resolve(ctx, file_len)?;
            let end = spec.end.resolve(ctx, file_len)?;

            let out_of_bounds = SealError::RangeOutOfBounds {
                start,
                end,
                len: file_len,
            };
            let (Ok(s), Ok(e)) = (usize::try_from(start), usize::try_from(end)) else {
                return Err(out_of_bounds);
            };
            if s > e || e > file_len {
                return Err(out_of_bounds);
            }
            out.push(s..e);
        }
        Ok(out)
    }
}

impl FromStr for ByteRangeDirective {
    type Err = SealError;

    fn from_str(directive: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for token in directive.split(',') {
            let token = token.trim();
            let (start, end) =
                token
                    .split_once('~')
                    .ok_or_else(|| SealError::InvalidRangeDirective {
                        directive: directive.to_string(),
                        reason: "missing `~`",
                    })?;
            ranges.push(RangeSpec {
                start: Position::parse(start, directive)?,
                end: Position::parse(end, directive)?,
            });
        }
        Ok(ByteRangeDirective { ranges })
    }
}

impl fmt::Display for ByteRangeDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, spec) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}~{}", spec.start, spec.end)?;
        }
        Ok(())
    }
}

/// Directive for a signature about to be appended.
///
/// The first signature in a file starts at `F`. When earlier signatures allow appending
/// (`@sflags` starts with `F`), the range starts at the previous signature (`P`) so nothing
/// can be slipped in between the two. In append mode the range stops just after the
/// closing `"/>` of the new record instead of running to the end of the file.
pub fn signing_directive(ctx: &FieldStore, append: bool) -> String {
    let anchor = if ctx.get_char(names::SIG_FLAGS, 0) == Some(b'F') {
        'P'
    } else {
        'F'
    };
    let tail = if append { ",s~s+3" } else { ",s~f" };
    format!("{anchor}~S{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> FieldStore {
        let mut ctx = FieldStore::new();
        ctx.set_size(names::SIG_RANGE, 0, 100);
        ctx.set_size(names::SIG_RANGE, 1, 164);
        ctx.set_size(names::PREV_RANGE, 0, 40);
        ctx.set_size(names::PREV_RANGE, 1, 60);
        ctx
    }

    #[test]
    fn test_parse_and_display() {
        let d: ByteRangeDirective = "F~S, s~s+3,P-2~p".parse().unwrap();

        assert_eq!(d.ranges().len(), 3);
        assert_eq!(d.ranges()[1].end.anchor, Anchor::SignatureEnd);
        assert_eq!(d.ranges()[1].end.adjust, 3);
        assert_eq!(d.ranges()[2].start.adjust, -2);
        assert_eq!(d.to_string(), "F~S,s~s+3,P-2~p");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "F", "X~f", "F~S*3", "F~S+", "F~S+x", "F~~S"] {
            assert!(
                bad.parse::<ByteRangeDirective>().is_err(),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_resolve_default_directive() {
        let d: ByteRangeDirective = "F~S,s~f".parse().unwrap();
        assert_eq!(d.resolve(&ctx(), 200).unwrap(), vec![0..100, 164..200]);
    }

    #[test]
    fn test_resolve_overlapping_append_directive() {
        let d: ByteRangeDirective = "P~S,s~s+3".parse().unwrap();
        assert_eq!(d.resolve(&ctx(), 200).unwrap(), vec![40..100, 164..167]);
    }

    #[test]
    fn test_resolve_errors() {
        let d: ByteRangeDirective = "s~s+50".parse().unwrap();
        assert!(matches!(
            d.resolve(&ctx(), 200),
            Err(SealError::RangeOutOfBounds { .. })
        ));

        let d: ByteRangeDirective = "S~P".parse().unwrap();
        assert!(d.resolve(&ctx(), 200).is_err());

        let d: ByteRangeDirective = "F~p".parse().unwrap();
        assert!(matches!(
            d.resolve(&FieldStore::new(), 10),
            Err(SealError::MissingAnchor { anchor: 'p' })
        ));
    }

    #[test]
    fn test_signing_directive() {
        let mut ctx = FieldStore::new();
        assert_eq!(signing_directive(&ctx, false), "F~S,s~f");
        assert_eq!(signing_directive(&ctx, true), "F~S,s~s+3");

        ctx.set_text(names::SIG_FLAGS, "F");
        assert_eq!(signing_directive(&ctx, false), "P~S,s~f");
    }
}
