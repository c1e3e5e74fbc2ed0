//! Matroska (EBML) variable-length integers.
//!
//! The position of the first set bit in the leading byte gives the total length: `1xxxxxxx`
//! is one byte, `01xxxxxx` two bytes, down to `00000001` for eight. The bits after the marker
//! are the most significant bits of the value and the remaining bytes follow big-endian.

use crate::err::{Result, SealError};
use crate::utils::bytes;

/// Longest encoding supported.
pub const MAX_VARINT_LEN: usize = 8;

/// Largest value an eight byte varint can carry.
pub const MAX_VARINT_VALUE: u64 = (1 << (7 * MAX_VARINT_LEN)) - 1;

/// Reads a varint at `*offset` and advances past it.
///
/// Returns `None` if `*offset` is past the end or the leading byte is zero. If the buffer ends
/// before all announced bytes are present, the value accumulated so far is returned; callers
/// use the subsequent bounds check on the chunk length to reject such data.
pub fn read_varint(buf: &[u8], offset: &mut usize) -> Option<u64> {
    let first = bytes::read_u8(buf, *offset)?;
    if first == 0 {
        return None;
    }

    let extra = first.leading_zeros() as usize;
    let mut value = u64::from(first) & ((1_u64 << (7 - extra)) - 1);
    *offset += 1;

    for _ in 0..extra {
        let Some(b) = bytes::read_u8(buf, *offset) else {
            break;
        };
        value = (value << 8) | u64::from(b);
        *offset += 1;
    }

    Some(value)
}

/// Number of bytes [`encode_varint`] uses for `value`.
pub fn varint_len(value: u64) -> Option<usize> {
    (1..=MAX_VARINT_LEN).find(|n| value <= (1_u64 << (7 * n)) - 1)
}

/// Encodes `value` using the shortest possible varint.
pub fn encode_varint(value: u64) -> Result<Vec<u8>> {
    let len = varint_len(value).ok_or(SealError::VarintOverflow { value })?;

    let be = value.to_be_bytes();
    let mut out = be[be.len() - len..].to_vec();
    // `value` fits below the marker, so OR-ing it in never clobbers payload bits.
    out[0] |= 0x80 >> (len - 1);
    Ok(out)
}
