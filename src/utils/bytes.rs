//! Byte-slice utilities for bounds-oriented scanning.
//!
//! Everything here returns `Option` and never panics: the walker and the record parser treat
//! a read past the end of the buffer as "stop here", so they only need to know whether the
//! bytes exist.
//!
//! Offsets are `usize` and are interpreted relative to the slice you pass in.

/// Read `N` raw bytes at `offset`.
///
/// Returns `None` if the range is out of bounds.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    let bytes: [u8; N] = buf.get(offset..end)?.try_into().ok()?;
    Some(bytes)
}

/// Read a single byte at `offset`.
pub(crate) fn read_u8(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

/// Read a 4-byte signature at `offset`.
pub(crate) fn read_sig(buf: &[u8], offset: usize) -> Option<[u8; 4]> {
    read_array::<4>(buf, offset)
}

/// Borrow `len` bytes at `offset`.
pub(crate) fn slice(buf: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    buf.get(offset..end)
}

/// True if `pattern` occurs in full at `offset`.
pub(crate) fn matches_at(buf: &[u8], offset: usize, pattern: &[u8]) -> bool {
    slice(buf, offset, pattern.len()) == Some(pattern)
}
