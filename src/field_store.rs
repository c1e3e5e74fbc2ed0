//! Ordered, duplicate-tolerant store of typed byte values.
//!
//! A [`FieldStore`] is the context that flows through every stage of SEAL processing: the
//! caller's arguments, each parsed record, and the chaining state between records all live in
//! one. Entries keep insertion order and lookups return the **first** entry with a given name.
//! Later entries with the same name (added through [`FieldStore::push`]) are shadowed, while
//! the `set_*` family replaces the first match in place.
//!
//! Integer arrays are stored as packed little-endian elements, so `get_size("@s", 2)` reads
//! the third `usize` of the `@s` entry.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::mem::size_of;

/// Names reserved for internal bookkeeping.
///
/// Attribute names parsed from a record always start with an ASCII letter, so nothing
/// user-controlled can collide with these.
pub mod names {
    /// Signature value start/end, relative to the parsed span.
    pub const SIG_RANGE_RELATIVE: &str = "@S";
    /// Signature value start/end as absolute file offsets, plus the record counter at index 2.
    pub const SIG_RANGE: &str = "@s";
    /// The previous record's `@s`.
    pub const PREV_RANGE: &str = "@p";
    /// Absolute offset just past the parsed record.
    pub const RECORD_END: &str = "@RecEnd";
    pub const SIG_FLAGS: &str = "@sflags";
    pub const PUBLIC_KEY: &str = "@public";
    pub const PUBLIC_KEY_BIN: &str = "@publicbin";
    pub const DNS_CACHE: &str = "@dnscachelast";
    pub const PUBLIC_KEY_FILE: &str = "@pubkeyfile";
    /// Placeholder record produced by the record builder.
    pub const RECORD: &str = "@record";
    /// Fully framed chunk waiting to be inserted.
    pub const BLOCK: &str = "@BLOCK";
    /// Length of the placeholder signature value.
    pub const SIG_SIZE: &str = "@sigsize";

    /// Index of the record counter inside `@s`.
    pub const RECORD_COUNT_INDEX: usize = 2;

    /// Fields carried from one record to the next.
    pub const CHAINED: [&str; 6] = [
        PREV_RANGE,
        SIG_RANGE,
        DNS_CACHE,
        PUBLIC_KEY,
        PUBLIC_KEY_BIN,
        SIG_FLAGS,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Char,
    Binary,
    U32,
    U64,
    Size,
}

impl FieldType {
    /// Width in bytes of one array element of this type.
    pub fn width(self) -> usize {
        match self {
            FieldType::Char | FieldType::Binary => 1,
            FieldType::U32 => size_of::<u32>(),
            FieldType::U64 => size_of::<u64>(),
            FieldType::Size => size_of::<usize>(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    kind: FieldType,
    bytes: Vec<u8>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldType, bytes: Vec<u8>) -> Self {
        Field {
            name: name.into(),
            kind,
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldType {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Value as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Replaces the value and its type together.
    pub fn replace(&mut self, kind: FieldType, bytes: Vec<u8>) {
        self.kind = kind;
        self.bytes = bytes;
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    fn element(&self, kind: FieldType, index: usize) -> Option<&[u8]> {
        if self.kind != kind {
            return None;
        }
        let width = kind.width();
        let start = index.checked_mul(width)?;
        let end = start.checked_add(width)?;
        self.bytes.get(start..end)
    }

    /// Writes one element, zero-extending the array as needed. A value of another type is
    /// discarded first.
    fn set_element(&mut self, kind: FieldType, index: usize, value: &[u8]) {
        if self.kind != kind {
            self.replace(kind, Vec::new());
        }
        let width = kind.width();
        let start = index * width;
        let end = start + width;
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(value);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldStore {
    fields: Vec<Field>,
}

impl FieldStore {
    pub fn new() -> Self {
        FieldStore::default()
    }

    /// Number of entries, counting shadowed duplicates.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Size of the value in bytes, `0` when absent.
    pub fn size(&self, name: &str) -> usize {
        self.get(name).map_or(0, Field::len)
    }

    /// Appends an entry without touching earlier entries of the same name.
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Allocates a zero-filled value of `len` bytes, replacing the first match if any.
    pub fn alloc(&mut self, name: &str, len: usize, kind: FieldType) -> &mut Field {
        self.set(name, kind, vec![0; len])
    }

    /// Replaces the first match (or appends) with the given value.
    pub fn set(&mut self, name: &str, kind: FieldType, bytes: Vec<u8>) -> &mut Field {
        match self.fields.iter().position(|f| f.name == name) {
            Some(pos) => {
                let field = &mut self.fields[pos];
                field.replace(kind, bytes);
                field
            }
            None => {
                self.fields.push(Field::new(name, kind, bytes));
                let last = self.fields.len() - 1;
                &mut self.fields[last]
            }
        }
    }

    /// Removes the first match.
    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let pos = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(pos))
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(Field::bytes)
    }

    pub fn set_bytes(&mut self, name: &str, value: &[u8]) {
        self.set(name, FieldType::Binary, value.to_vec());
    }

    pub fn add_bytes(&mut self, name: &str, value: &[u8]) {
        self.grow(name, FieldType::Binary, value);
    }

    pub fn get_text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(Field::text)
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        self.set(name, FieldType::Char, value.as_bytes().to_vec());
    }

    /// Sets a text value from raw bytes, which need not be valid UTF-8.
    pub fn set_text_bytes(&mut self, name: &str, value: &[u8]) {
        self.set(name, FieldType::Char, value.to_vec());
    }

    pub fn add_text(&mut self, name: &str, value: &str) {
        self.grow(name, FieldType::Char, value.as_bytes());
    }

    pub fn get_char(&self, name: &str, index: usize) -> Option<u8> {
        self.get(name)?.bytes.get(index).copied()
    }

    pub fn set_char(&mut self, name: &str, index: usize, c: u8) {
        match self.get_mut(name) {
            Some(field) => {
                if field.kind != FieldType::Char {
                    field.replace(FieldType::Char, Vec::new());
                }
                if field.bytes.len() <= index {
                    field.bytes.resize(index + 1, 0);
                }
                field.bytes[index] = c;
            }
            None => {
                let mut bytes = vec![0; index + 1];
                bytes[index] = c;
                self.set(name, FieldType::Char, bytes);
            }
        }
    }

    pub fn add_char(&mut self, name: &str, c: u8) {
        self.grow(name, FieldType::Char, &[c]);
    }

    pub fn get_u32(&self, name: &str, index: usize) -> Option<u32> {
        let raw = self.get(name)?.element(FieldType::U32, index)?;
        Some(u32::from_le_bytes(raw.try_into().ok()?))
    }

    pub fn set_u32(&mut self, name: &str, index: usize, value: u32) {
        self.entry(name, FieldType::U32)
            .set_element(FieldType::U32, index, &value.to_le_bytes());
    }

    pub fn get_u64(&self, name: &str, index: usize) -> Option<u64> {
        let raw = self.get(name)?.element(FieldType::U64, index)?;
        Some(u64::from_le_bytes(raw.try_into().ok()?))
    }

    pub fn set_u64(&mut self, name: &str, index: usize, value: u64) {
        self.entry(name, FieldType::U64)
            .set_element(FieldType::U64, index, &value.to_le_bytes());
    }

    pub fn get_size(&self, name: &str, index: usize) -> Option<usize> {
        let raw = self.get(name)?.element(FieldType::Size, index)?;
        Some(usize::from_le_bytes(raw.try_into().ok()?))
    }

    pub fn set_size(&mut self, name: &str, index: usize, value: usize) {
        self.entry(name, FieldType::Size)
            .set_element(FieldType::Size, index, &value.to_le_bytes());
    }

    /// Adds `delta` to a `Size` element; a missing element counts as zero.
    pub fn inc_size(&mut self, name: &str, index: usize, delta: usize) {
        let current = self.get_size(name, index).unwrap_or(0);
        self.set_size(name, index, current.wrapping_add(delta));
    }

    /// Copies `src_name` out of `src` into this store as `dst_name`.
    ///
    /// The bytes are duplicated. An absent source leaves the destination untouched.
    pub fn copy_from(&mut self, dst_name: &str, src: &FieldStore, src_name: &str) {
        if let Some(field) = src.get(src_name) {
            self.set(dst_name, field.kind, field.bytes.clone());
        }
    }

    /// Copies a field within the store under a new name.
    pub fn copy(&mut self, dst_name: &str, src_name: &str) {
        if let Some(field) = self.get(src_name).cloned() {
            self.set(dst_name, field.kind, field.bytes);
        }
    }

    /// Compares the values of two fields byte by byte. `None` if either is absent.
    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        self.compare_with(a, self, b)
    }

    /// Like [`FieldStore::compare`], with the second field taken from `other`.
    pub fn compare_with(
        &self,
        name: &str,
        other: &FieldStore,
        other_name: &str,
    ) -> Option<Ordering> {
        let left = self.get_bytes(name)?;
        let right = other.get_bytes(other_name)?;
        Some(left.cmp(right))
    }

    /// Renames the first `old_name` entry in place, dropping any existing `new_name`.
    ///
    /// Returns false, and changes nothing, when `old_name` is absent.
    pub fn rename(&mut self, new_name: &str, old_name: &str) -> bool {
        if !self.contains(old_name) {
            return false;
        }
        if new_name != old_name {
            self.remove(new_name);
        }
        if let Some(field) = self.get_mut(old_name) {
            field.name = new_name.to_string();
        }
        true
    }

    fn entry(&mut self, name: &str, kind: FieldType) -> &mut Field {
        match self.fields.iter().position(|f| f.name == name) {
            Some(pos) => &mut self.fields[pos],
            None => self.set(name, kind, Vec::new()),
        }
    }

    fn grow(&mut self, name: &str, kind: FieldType, value: &[u8]) {
        match self.get_mut(name) {
            Some(field) => field.bytes.extend_from_slice(value),
            None => {
                self.set(name, kind, value.to_vec());
            }
        }
    }
}

struct Elements<'a>(&'a Field);

impl Serialize for Elements<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let field = self.0;
        let width = field.kind.width();
        let mut seq = serializer.serialize_seq(Some(field.bytes.len() / width))?;
        for chunk in field.bytes.chunks_exact(width) {
            match field.kind {
                FieldType::U32 => {
                    seq.serialize_element(&u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))?
                }
                _ => {
                    let mut raw = [0_u8; 8];
                    raw[..width].copy_from_slice(chunk);
                    seq.serialize_element(&u64::from_le_bytes(raw))?
                }
            }
        }
        seq.end()
    }
}

impl Serialize for FieldStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for field in &self.fields {
            match field.kind {
                FieldType::Char => map.serialize_entry(&field.name, &field.text())?,
                FieldType::Binary => map.serialize_entry(&field.name, &hex::encode(&field.bytes))?,
                FieldType::U32 | FieldType::U64 | FieldType::Size => {
                    map.serialize_entry(&field.name, &Elements(field))?
                }
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_returns_first_match() {
        let mut store = FieldStore::new();
        store.set_text("a", "first");
        store.push(Field::new("a", FieldType::Char, b"second".to_vec()));

        assert_eq!(store.get_text("a").unwrap(), "first");
        assert_eq!(store.len(), 2);

        store.remove("a");
        assert_eq!(store.get_text("a").unwrap(), "second");
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut store = FieldStore::new();
        store.set_text("a", "1");
        store.set_text("b", "2");
        store.set_text("a", "3");

        let names: Vec<&str> = store.iter().map(Field::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.get_text("a").unwrap(), "3");
    }

    #[test]
    fn test_missing_is_distinct_from_empty() {
        let mut store = FieldStore::new();
        store.set_text("empty", "");

        assert_eq!(store.get_bytes("empty"), Some(&b""[..]));
        assert_eq!(store.get_bytes("missing"), None);
        assert_eq!(store.size("missing"), 0);
    }

    #[test]
    fn test_size_array_indexing() {
        let mut store = FieldStore::new();
        store.set_size(names::SIG_RANGE, 2, 7);

        assert_eq!(store.size(names::SIG_RANGE), 3 * size_of::<usize>());
        assert_eq!(store.get_size(names::SIG_RANGE, 0), Some(0));
        assert_eq!(store.get_size(names::SIG_RANGE, 2), Some(7));
        assert_eq!(store.get_size(names::SIG_RANGE, 3), None);

        store.inc_size(names::SIG_RANGE, 0, 10);
        store.inc_size(names::SIG_RANGE, 2, 1);
        assert_eq!(store.get_size(names::SIG_RANGE, 0), Some(10));
        assert_eq!(store.get_size(names::SIG_RANGE, 2), Some(8));
    }

    #[test]
    fn test_integer_widths() {
        let mut store = FieldStore::new();
        store.set_u32("w", 1, 0xdead_beef);
        store.set_u64("q", 0, u64::MAX - 1);

        assert_eq!(store.size("w"), 8);
        assert_eq!(store.get_u32("w", 1), Some(0xdead_beef));
        assert_eq!(store.get_u64("q", 0), Some(u64::MAX - 1));
        // Reading with the wrong width is not a reinterpretation.
        assert_eq!(store.get_u64("w", 0), None);
    }

    #[test]
    fn test_grow_never_truncates() {
        let mut store = FieldStore::new();
        store.add_text("b", "F");
        store.add_text("b", "~S");
        store.add_char("b", b',');
        store.add_bytes("bin", &[1, 2]);
        store.add_bytes("bin", &[3]);

        assert_eq!(store.get_text("b").unwrap(), "F~S,");
        assert_eq!(store.get_bytes("bin").unwrap(), &[1, 2, 3]);
        assert_eq!(store.get("b").unwrap().kind(), FieldType::Char);
    }

    #[test]
    fn test_set_char_extends() {
        let mut store = FieldStore::new();
        store.set_char(names::SIG_FLAGS, 1, b'F');

        assert_eq!(store.get_bytes(names::SIG_FLAGS).unwrap(), &[0, b'F']);
        assert_eq!(store.get_char(names::SIG_FLAGS, 0), Some(0));
        assert_eq!(store.get_char(names::SIG_FLAGS, 5), None);
    }

    #[test]
    fn test_set_char_retypes_other_kinds() {
        let mut store = FieldStore::new();
        store.set_size(names::SIG_FLAGS, 0, 7);
        store.set_char(names::SIG_FLAGS, 0, b'F');

        let field = store.get(names::SIG_FLAGS).unwrap();
        assert_eq!(field.kind(), FieldType::Char);
        assert_eq!(field.bytes(), b"F");
    }

    #[test]
    fn test_compare_fields() {
        let mut store = FieldStore::new();
        store.set_text("a", "abc");
        store.set_text("b", "abd");
        store.set_text("c", "abc");
        store.push(Field::new("c", FieldType::Char, b"zzz".to_vec()));

        assert_eq!(store.compare("a", "c"), Some(Ordering::Equal));
        assert_eq!(store.compare("a", "b"), Some(Ordering::Less));
        assert_eq!(store.compare("b", "a"), Some(Ordering::Greater));
        assert_eq!(store.compare("a", "missing"), None);
        assert_eq!(store.compare("missing", "a"), None);
    }

    #[test]
    fn test_compare_across_stores() {
        let mut ctx = FieldStore::new();
        ctx.set_text(names::PUBLIC_KEY, "key");
        let mut record = FieldStore::new();
        record.set_text("pk", "key");
        record.set_text("other", "keys");

        assert_eq!(
            ctx.compare_with(names::PUBLIC_KEY, &record, "pk"),
            Some(Ordering::Equal)
        );
        assert_eq!(
            ctx.compare_with(names::PUBLIC_KEY, &record, "other"),
            Some(Ordering::Less)
        );
        assert_eq!(ctx.compare_with(names::PUBLIC_KEY, &record, "gone"), None);
    }

    #[test]
    fn test_rename_in_place() {
        let mut store = FieldStore::new();
        store.set_text("first", "1");
        store.set_text("old", "2");
        store.set_text("new", "stale");
        store.set_text("last", "3");

        assert!(store.rename("new", "old"));
        let names: Vec<&str> = store.iter().map(Field::name).collect();
        assert_eq!(names, vec!["first", "new", "last"]);
        assert_eq!(store.get_text("new").unwrap(), "2");
        assert!(!store.contains("old"));

        assert!(!store.rename("x", "missing"));
        assert!(!store.contains("x"));

        assert!(store.rename("new", "new"));
        assert_eq!(store.get_text("new").unwrap(), "2");
    }

    #[test]
    fn test_copy_between_stores_duplicates_bytes() {
        let mut src = FieldStore::new();
        src.set_size(names::SIG_RANGE, 0, 5);
        src.set_size(names::SIG_RANGE, 1, 9);

        let mut dst = FieldStore::new();
        dst.copy_from(names::PREV_RANGE, &src, names::SIG_RANGE);
        src.set_size(names::SIG_RANGE, 0, 100);

        assert_eq!(dst.get_size(names::PREV_RANGE, 0), Some(5));
        assert_eq!(dst.get_size(names::PREV_RANGE, 1), Some(9));

        dst.set_text("keep", "x");
        dst.copy_from("keep", &src, "missing");
        assert_eq!(dst.get_text("keep").unwrap(), "x");

        dst.copy("again", "keep");
        assert_eq!(dst.get_text("again").unwrap(), "x");
    }

    #[test]
    fn test_alloc_zeroes_and_retypes() {
        let mut store = FieldStore::new();
        store.set_text("x", "hello");
        store.alloc("x", 3, FieldType::Binary);

        let field = store.get("x").unwrap();
        assert_eq!(field.kind(), FieldType::Binary);
        assert_eq!(field.bytes(), &[0, 0, 0]);
    }

    #[test]
    fn test_serializes_in_order() {
        let mut store = FieldStore::new();
        store.set_text("b", "F~S,s~f");
        store.set_bytes("bin", &[0xab, 0x01]);
        store.set_size(names::SIG_RANGE, 0, 3);
        store.set_size(names::SIG_RANGE, 1, 4);

        let json = serde_json::to_string(&store).unwrap();
        assert_eq!(json, r#"{"b":"F~S,s~f","bin":"ab01","@s":[3,4]}"#);
    }
}
