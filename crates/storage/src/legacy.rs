//! Fault-degrading view over a `CachedTable`
//!
//! The historic table API never raised: selects degraded to an empty
//! row-set and mutations to a count, with only authority failures
//! distinguishable through `CODE_NO_AUTHORIZED`. `LegacyTable` reproduces
//! that contract on top of the `StateResult` API for callers that depend on
//! it. Every swallowed fault is logged.
//!
//! Inserts report `1` even when a non-authority fault dropped the row, as
//! the historic API did.

use tracing::error;

use statecache_core::{AccessOptions, Condition, Entry, RowSet, StateError};

use crate::table::CachedTable;

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Borrowed view returning integer codes instead of errors
#[derive(Debug, Clone, Copy)]
pub struct LegacyTable<'a> {
    table: &'a CachedTable,
}

impl CachedTable {
    /// View this table through the fault-degrading API
    pub fn legacy(&self) -> LegacyTable<'_> {
        LegacyTable { table: self }
    }
}

impl<'a> LegacyTable<'a> {
    fn log_fault(&self, op: &str, key: &str, err: &StateError) {
        error!(
            target: "statecache::table",
            table = %self.table.name(),
            key,
            op,
            error = %err,
            "Access CachedTable failed"
        );
    }

    /// `select`, with faults degraded to an empty row-set
    pub fn select(&self, key: &str, condition: &Condition) -> RowSet {
        self.table.select(key, condition).unwrap_or_else(|e| {
            self.log_fault("select", key, &e);
            RowSet::new()
        })
    }

    /// `insert`, returning `1` or `CODE_NO_AUTHORIZED`
    pub fn insert(&self, key: &str, entry: Entry, options: &AccessOptions) -> i32 {
        match self.table.insert(key, entry, options) {
            Ok(n) => count(n),
            Err(e) if e.is_not_authorized() => e.legacy_code(),
            Err(e) => {
                self.log_fault("insert", key, &e);
                1
            }
        }
    }

    /// `update`, returning the row count, `0` on fault, or `CODE_NO_AUTHORIZED`
    pub fn update(&self, key: &str, entry: &Entry, condition: &Condition, options: &AccessOptions) -> i32 {
        match self.table.update(key, entry, condition, options) {
            Ok(n) => count(n),
            Err(e) => {
                if !e.is_not_authorized() {
                    self.log_fault("update", key, &e);
                }
                e.legacy_code()
            }
        }
    }

    /// `remove`, returning the row count, `0` on fault, or `CODE_NO_AUTHORIZED`
    pub fn remove(&self, key: &str, condition: &Condition, options: &AccessOptions) -> i32 {
        match self.table.remove(key, condition, options) {
            Ok(n) => count(n),
            Err(e) => {
                if !e.is_not_authorized() {
                    self.log_fault("remove", key, &e);
                }
                e.legacy_code()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheMode;
    use crate::mem_backend::MemBackend;
    use statecache_core::{TableInfo, CODE_NO_AUTHORIZED};
    use std::sync::Arc;

    fn table() -> CachedTable {
        CachedTable::new(
            TableInfo::new("t", ["balance"]).with_authorized(["alice"]),
            CacheMode::Exclusive,
        )
    }

    #[test]
    fn test_authority_failure_is_distinguishable() {
        let table = table();
        let bob = AccessOptions::new("bob");
        let row = Entry::new().with_field("balance", "1");
        assert_eq!(table.legacy().insert("k", row.clone(), &bob), CODE_NO_AUTHORIZED);
        assert_eq!(
            table.legacy().update("k", &row, &Condition::new(), &bob),
            CODE_NO_AUTHORIZED
        );
        assert_eq!(table.legacy().remove("k", &Condition::new(), &bob), CODE_NO_AUTHORIZED);
    }

    #[test]
    fn test_other_faults_degrade() {
        let table = table();
        let alice = AccessOptions::new("alice");
        let bad = Entry::new().with_field("nickname", "x");
        assert_eq!(table.legacy().insert("k", bad.clone(), &alice), 1);
        assert_eq!(table.legacy().update("k", &bad, &Condition::new(), &alice), 0);
        assert!(table.legacy().select("k", &Condition::new()).is_empty());
    }

    #[test]
    fn test_backend_fault_degrades_select() {
        let backend = Arc::new(MemBackend::new());
        backend.set_failing(true);
        let table = table().with_backend(backend);
        assert!(table.legacy().select("k", &Condition::new()).is_empty());
        assert_eq!(
            table.legacy().remove("k", &Condition::new(), &AccessOptions::new("alice")),
            0
        );
    }

    #[test]
    fn test_success_counts_pass_through() {
        let table = table();
        let alice = AccessOptions::new("alice");
        let legacy = table.legacy();
        assert_eq!(legacy.insert("k", Entry::new().with_field("balance", "1"), &alice), 1);
        assert_eq!(legacy.insert("k", Entry::new().with_field("balance", "2"), &alice), 1);
        assert_eq!(legacy.remove("k", &Condition::new().ge("balance", "1"), &alice), 2);
        assert!(legacy.select("k", &Condition::new()).is_empty());
    }
}
