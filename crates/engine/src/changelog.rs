//! Undo stack of change records for one block
//!
//! `ChangeLog` is the `ChangeSink` every table of a block reports to. It
//! keeps `(table, change)` pairs in mutation order; savepoints are stack
//! depths, and rolling back to one drains everything above it newest first.

use parking_lot::Mutex;

use statecache_core::{Change, ChangeSink};

/// Stack of `(table name, change)` pairs
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Mutex<Vec<(String, Change)>>,
}

impl ChangeLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded changes
    pub fn len(&self) -> usize {
        self.changes.lock().len()
    }

    /// Check for an empty log
    pub fn is_empty(&self) -> bool {
        self.changes.lock().is_empty()
    }

    /// Current depth, usable with `drain_from`
    pub fn savepoint(&self) -> usize {
        self.len()
    }

    /// Remove and return every change recorded after `savepoint`, newest
    /// first. A savepoint beyond the current depth drains nothing.
    pub fn drain_from(&self, savepoint: usize) -> Vec<(String, Change)> {
        let mut changes = self.changes.lock();
        if savepoint >= changes.len() {
            return Vec::new();
        }
        let mut drained = changes.split_off(savepoint);
        drained.reverse();
        drained
    }

    /// Put back changes taken by `drain_from` that were not undone.
    ///
    /// `changes` is newest first, as `drain_from` returns them; they land on
    /// top of the stack in their original order.
    pub fn restore(&self, changes: Vec<(String, Change)>) {
        let mut log = self.changes.lock();
        log.extend(changes.into_iter().rev());
    }

    /// Forget all recorded changes
    pub fn clear(&self) {
        self.changes.lock().clear();
    }
}

impl ChangeSink for ChangeLog {
    fn record(&self, table: &str, change: Change) {
        self.changes.lock().push((table.to_string(), change));
    }
}
