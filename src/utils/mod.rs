pub mod binary;
pub(crate) mod bytes;
pub mod escape;

pub use self::binary::{base64_decode, base64_encode, hex_decode, hex_encode};
pub use self::escape::{entity_decode, entity_encode, quote_decode, quote_encode};
