use thiserror::Error;

pub type Result<T> = std::result::Result<T, SealError>;

#[derive(Debug, Error)]
pub enum SealError {
    #[error("value {value} does not fit in an 8-byte varint")]
    VarintOverflow { value: u64 },

    #[error("invalid byte-range directive `{directive}`: {reason}")]
    InvalidRangeDirective {
        directive: String,
        reason: &'static str,
    },

    #[error("byte-range anchor `{anchor}` is not available in this context")]
    MissingAnchor { anchor: char },

    #[error("byte range {start}..{end} out of bounds for {len} bytes")]
    RangeOutOfBounds { start: i64, end: i64, len: usize },

    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("insert offset {offset} out of bounds (len={len})")]
    InsertOutOfBounds { offset: usize, len: usize },

    #[error("record builder failed: {message}")]
    RecordBuilder { message: String },

    #[error("signing failed: {message}")]
    Signing { message: String },
}
