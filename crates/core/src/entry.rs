//! Record model: `Entry` (one row) and `RowSet` (all rows of one key)
//!
//! # Mutation tracking
//!
//! Every write through `Entry::set_field`, `Entry::remove_field` or
//! `Entry::set_status` sets the row's dirty flag. Nothing clears it: a row
//! that was touched and then restored by rollback still counts as touched.
//! `RowSet` carries an aggregate flag with the same one-way semantics.
//!
//! # Sharing
//!
//! A `RowSet` is shared through `Arc` between the table cache and every
//! mutation that resolves its key, so rows live behind a `parking_lot::RwLock`.
//! Appends take the write lock and report the index they landed at, which
//! keeps the index in an insert's change record exact even when two threads
//! append to the same row-set.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Reserved identifier field, writable in every table
pub const ID_FIELD: &str = "_id_";

/// Reserved status pseudo-field name, always part of the state hash
pub const STATUS_FIELD: &str = "_status_";

/// Row lifecycle status
///
/// Only `Normal → Deleted` (remove) and `Deleted → Normal` (rollback of a
/// remove) transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Live row
    #[default]
    Normal,
    /// Logically removed; retained physically
    Deleted,
}

impl EntryStatus {
    /// Textual code used when the status is hashed
    pub fn code(self) -> &'static str {
        match self {
            EntryStatus::Normal => "0",
            EntryStatus::Deleted => "1",
        }
    }
}

type Fields = SmallVec<[(String, String); 8]>;

/// A single row: ordered field list, status and dirty flag
///
/// Field order is insertion order and is preserved across overwrites, since
/// the state hash walks fields in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    fields: Fields,
    status: EntryStatus,
    dirty: bool,
}

impl Entry {
    /// Create an empty, clean row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Get a field value
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a field value, treating a missing field as the empty string
    pub fn field_or_empty(&self, name: &str) -> &str {
        self.field(name).unwrap_or("")
    }

    /// Set a field, returning the previous value if it existed.
    ///
    /// Overwrites keep the field's original position.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        self.dirty = true;
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    /// Remove a field entirely, returning its value
    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        self.dirty = true;
        Some(self.fields.remove(pos).1)
    }

    /// Iterate fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Current status
    #[inline]
    pub fn status(&self) -> EntryStatus {
        self.status
    }

    /// Set the status (marks the row dirty)
    pub fn set_status(&mut self, status: EntryStatus) {
        self.status = status;
        self.dirty = true;
    }

    /// Shorthand for `status() == Deleted`
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.status == EntryStatus::Deleted
    }

    /// Whether the row was mutated during this cache's lifetime
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the row as mutated
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Return a copy with the dirty flag cleared.
    ///
    /// Backends use this for the copy they persist; the cached row keeps
    /// its flag.
    pub fn to_clean(&self) -> Entry {
        Entry {
            fields: self.fields.clone(),
            status: self.status,
            dirty: false,
        }
    }

    /// Compare field values and status, ignoring the dirty flag
    pub fn content_eq(&self, other: &Entry) -> bool {
        self.fields == other.fields && self.status == other.status
    }
}

impl<K, V> FromIterator<(K, V)> for Entry
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entry = Entry::new();
        for (k, v) in iter {
            entry.set_field(k, v);
        }
        entry
    }
}

/// All rows stored under one key, plus an aggregate dirty flag
#[derive(Debug, Default)]
pub struct RowSet {
    rows: RwLock<Vec<Entry>>,
    dirty: AtomicBool,
}

impl RowSet {
    /// Create an empty, clean row-set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clean row-set holding `rows`
    pub fn from_rows(rows: Vec<Entry>) -> Self {
        Self {
            rows: RwLock::new(rows),
            dirty: AtomicBool::new(false),
        }
    }

    /// Number of rows, including logically removed ones
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check for zero rows
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of the row at `index`
    pub fn get(&self, index: usize) -> Option<Entry> {
        self.rows.read().get(index).cloned()
    }

    /// Copy of all rows in order
    pub fn rows(&self) -> Vec<Entry> {
        self.rows.read().clone()
    }

    /// Append a row, returning the index it landed at
    pub fn push(&self, entry: Entry) -> usize {
        let mut rows = self.rows.write();
        rows.push(entry);
        rows.len() - 1
    }

    /// Physically remove the row at `index`.
    ///
    /// Only the undo of an insert uses this; ordinary removal is logical.
    pub fn remove_at(&self, index: usize) -> Option<Entry> {
        let mut rows = self.rows.write();
        if index < rows.len() {
            Some(rows.remove(index))
        } else {
            None
        }
    }

    /// Run `f` over the rows under the read lock
    pub fn with_rows<R>(&self, f: impl FnOnce(&[Entry]) -> R) -> R {
        f(&self.rows.read())
    }

    /// Run `f` over the rows under the write lock
    pub fn with_rows_mut<R>(&self, f: impl FnOnce(&mut Vec<Entry>) -> R) -> R {
        f(&mut self.rows.write())
    }

    /// Whether any row in the set was mutated
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Mark the set as mutated
    #[inline]
    pub fn set_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Detached copy of rows and dirty flag
    pub fn snapshot(&self) -> RowSet {
        let rows = self.rows.read().clone();
        RowSet {
            rows: RwLock::new(rows),
            dirty: AtomicBool::new(self.is_dirty()),
        }
    }
}

impl Clone for RowSet {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

impl From<Vec<Entry>> for RowSet {
    fn from(rows: Vec<Entry>) -> Self {
        RowSet::from_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_entry_is_clean_and_normal() {
        let entry = Entry::new();
        assert!(!entry.is_dirty());
        assert_eq!(entry.status(), EntryStatus::Normal);
        assert_eq!(entry.field_count(), 0);
    }

    #[test]
    fn test_set_field_marks_dirty_and_returns_previous() {
        let mut entry = Entry::new();
        assert_eq!(entry.set_field("balance", "100"), None);
        assert!(entry.is_dirty());
        assert_eq!(entry.set_field("balance", "150"), Some("100".to_string()));
        assert_eq!(entry.field("balance"), Some("150"));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut entry = Entry::new()
            .with_field("a", "1")
            .with_field("b", "2")
            .with_field("c", "3");
        entry.set_field("a", "9");

        let names: Vec<&str> = entry.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(entry.field("a"), Some("9"));
    }

    #[test]
    fn test_missing_field_reads_as_empty() {
        let entry = Entry::new().with_field("a", "1");
        assert_eq!(entry.field("missing"), None);
        assert_eq!(entry.field_or_empty("missing"), "");
    }

    #[test]
    fn test_remove_field() {
        let mut entry = Entry::new().with_field("a", "1").with_field("b", "2");
        assert_eq!(entry.remove_field("a"), Some("1".to_string()));
        assert_eq!(entry.remove_field("a"), None);
        assert_eq!(entry.field_count(), 1);
    }

    #[test]
    fn test_status_transitions_mark_dirty() {
        let mut entry = Entry::new();
        entry.set_status(EntryStatus::Deleted);
        assert!(entry.is_deleted());
        assert!(entry.is_dirty());
        entry.set_status(EntryStatus::Normal);
        assert!(!entry.is_deleted());
        assert!(entry.is_dirty());
    }

    #[test]
    fn test_content_eq_ignores_dirty() {
        let a = Entry::new().with_field("x", "1");
        let b = a.to_clean();
        assert!(!b.is_dirty());
        assert!(a.content_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_row_set_push_returns_index() {
        let rows = RowSet::new();
        assert!(rows.is_empty());
        assert_eq!(rows.push(Entry::new().with_field("a", "1")), 0);
        assert_eq!(rows.push(Entry::new().with_field("a", "2")), 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.get(1).unwrap().field("a"), Some("2"));
        assert!(rows.get(2).is_none());
    }

    #[test]
    fn test_row_set_remove_at() {
        let rows = RowSet::from_rows(vec![Entry::new().with_field("a", "1")]);
        assert!(rows.remove_at(5).is_none());
        assert!(rows.remove_at(0).is_some());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_row_set_dirty_is_sticky_and_snapshotted() {
        let rows = RowSet::new();
        assert!(!rows.is_dirty());
        rows.set_dirty();
        assert!(rows.is_dirty());

        let copy = rows.snapshot();
        assert!(copy.is_dirty());
        copy.push(Entry::new());
        assert_eq!(rows.len(), 0, "snapshot must be detached");
    }

    proptest! {
        #[test]
        fn prop_fields_keep_first_insertion_order(names in proptest::collection::vec("[a-e]", 1..20)) {
            let mut entry = Entry::new();
            let mut expected: Vec<String> = Vec::new();
            for (i, name) in names.iter().enumerate() {
                entry.set_field(name.clone(), i.to_string());
                if !expected.contains(name) {
                    expected.push(name.clone());
                }
            }
            let actual: Vec<String> = entry.fields().map(|(n, _)| n.to_string()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
