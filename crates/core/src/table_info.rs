//! Table metadata and table snapshots
//!
//! `TableInfo` is loaded outside the cache and is immutable for a table's
//! lifetime. `TableData` is what a table hands the commit path: every
//! populated row-set, plus whether any of them changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::entry::{RowSet, ID_FIELD};
use crate::types::Address;

/// Name, writable fields and authority list of one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Fields writable in this table (the reserved `_id_` is always writable)
    pub fields: Vec<String>,
    /// Writers allowed to mutate the table; empty means everyone
    pub authorized: Vec<Address>,
}

impl TableInfo {
    /// Metadata with the given fields and no authority restriction
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            authorized: Vec::new(),
        }
    }

    /// Builder-style authority list
    pub fn with_authorized<I, A>(mut self, writers: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        self.authorized = writers.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `field` may be written
    pub fn allows_field(&self, field: &str) -> bool {
        field == ID_FIELD || self.fields.iter().any(|f| f == field)
    }

    /// Whether `origin` may write
    pub fn is_authorized(&self, origin: &Address) -> bool {
        self.authorized.is_empty() || self.authorized.contains(origin)
    }
}

/// Snapshot of one table's cache for the commit path
#[derive(Debug, Clone)]
pub struct TableData {
    /// Table metadata
    pub info: Arc<TableInfo>,
    /// Populated row-sets by key, in key order
    pub rows: BTreeMap<String, RowSet>,
    /// Whether any row-set is dirty
    pub dirty: bool,
}

impl TableData {
    /// Number of keys in the snapshot
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check for an empty snapshot
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
