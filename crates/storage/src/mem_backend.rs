//! In-memory state backend for testing.
//!
//! `MemBackend` implements `StateBackend` using a `BTreeMap` keyed by
//! `(table, key)` for deterministic ordering. It keeps only the latest
//! committed state; snapshot coordinates are recorded but not used to pick
//! a version. Useful for unit tests, integration tests and benchmarks where
//! a real storage backend is not needed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use statecache_core::{BlockCoordinates, Entry, StateBackend, StateError, StateResult, TableData};

/// In-memory backend keyed by `(table, key)`
#[derive(Debug, Default)]
pub struct MemBackend {
    data: RwLock<BTreeMap<(String, String), Vec<Entry>>>,
    fetches: AtomicU64,
    failing: AtomicBool,
    last_fetch_at: Mutex<Option<BlockCoordinates>>,
    committed_at: Mutex<Vec<BlockCoordinates>>,
}

impl MemBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Store rows for `(table, key)`, replacing what was there.
    ///
    /// Rows are stored clean, as a persisted row would be.
    pub fn put(&self, table: &str, key: &str, rows: Vec<Entry>) {
        let rows = rows.iter().map(Entry::to_clean).collect();
        self.data
            .write()
            .insert((table.to_string(), key.to_string()), rows);
    }

    /// Stored rows for `(table, key)`
    pub fn get(&self, table: &str, key: &str) -> Option<Vec<Entry>> {
        self.data
            .read()
            .get(&(table.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of `(table, key)` pairs stored
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the backend is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Number of `fetch` calls served so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Acquire)
    }

    /// Coordinates of the most recent fetch
    pub fn last_fetch_at(&self) -> Option<BlockCoordinates> {
        *self.last_fetch_at.lock()
    }

    /// Coordinates of every commit, oldest first
    pub fn commits(&self) -> Vec<BlockCoordinates> {
        self.committed_at.lock().clone()
    }

    /// Make every subsequent fetch and commit fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    fn check_failing(&self) -> StateResult<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(StateError::backend("backend unavailable"));
        }
        Ok(())
    }
}

impl StateBackend for MemBackend {
    fn fetch(&self, at: &BlockCoordinates, table: &str, key: &str) -> StateResult<Option<Vec<Entry>>> {
        self.check_failing()?;
        self.fetches.fetch_add(1, Ordering::AcqRel);
        *self.last_fetch_at.lock() = Some(*at);
        Ok(self.get(table, key))
    }

    /// Write every dirty row-set, dropping deleted rows. A row-set with no
    /// live rows left removes the key.
    fn commit(&self, at: &BlockCoordinates, tables: &[TableData]) -> StateResult<usize> {
        self.check_failing()?;
        let mut written = 0;
        let mut data = self.data.write();
        for table in tables.iter().filter(|t| t.dirty) {
            for (key, rows) in table.rows.iter().filter(|(_, rows)| rows.is_dirty()) {
                let live: Vec<Entry> = rows.with_rows(|rows| {
                    rows.iter()
                        .filter(|r| !r.is_deleted())
                        .map(Entry::to_clean)
                        .collect()
                });
                let slot = (table.info.name.clone(), key.clone());
                written += live.len();
                if live.is_empty() {
                    data.remove(&slot);
                } else {
                    data.insert(slot, live);
                }
            }
        }
        self.committed_at.lock().push(*at);
        debug!(target: "statecache::backend", block = at.number, rows = written, "Committed block");
        Ok(written)
    }
}
