pub mod backend;
pub mod err;
pub mod field_store;
pub mod matroska;
pub mod range;
pub mod record_builder;
pub mod record_parser;
pub mod utils;
pub mod varint;

pub use backend::SealBackend;
pub use err::{Result, SealError};
pub use field_store::{Field, FieldStore, FieldType};
pub use matroska::{SealProcessor, SealReport, SealSettings, SealStatus};
pub use range::ByteRangeDirective;
pub use record_parser::{SealRecord, parse_record};
