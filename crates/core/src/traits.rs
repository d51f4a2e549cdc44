//! Core traits for backend and change-recorder abstraction
//!
//! This module defines the `StateBackend` and `ChangeSink` traits that keep
//! the table cache independent of where rows come from and who keeps the
//! undo log.

use crate::change::Change;
use crate::entry::Entry;
use crate::error::StateResult;
use crate::table_info::TableData;
use crate::types::BlockCoordinates;

/// Persistent state the cache loads from
///
/// Thread safety: tables in shared mode call `fetch` concurrently from
/// multiple threads (requires Send + Sync).
pub trait StateBackend: Send + Sync {
    /// Point lookup of all rows stored under `key` in `table`, as of the
    /// snapshot named by `at`.
    ///
    /// Returns `Ok(None)` if the backend has nothing for the key. Blocks
    /// until the backend answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend lookup fails.
    fn fetch(&self, at: &BlockCoordinates, table: &str, key: &str) -> StateResult<Option<Vec<Entry>>>;

    /// Persist dirty table snapshots produced for the block at `at`.
    ///
    /// Returns the number of rows written. Read-only backends keep the
    /// default, which writes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn commit(&self, at: &BlockCoordinates, tables: &[TableData]) -> StateResult<usize> {
        let _ = (at, tables);
        Ok(0)
    }
}

/// Receiver of change records
///
/// Invoked synchronously, once per mutation that produced records, before
/// the mutating call returns to its caller.
pub trait ChangeSink: Send + Sync {
    /// Accept the change just applied to `table`
    fn record(&self, table: &str, change: Change);
}

impl<F> ChangeSink for F
where
    F: Fn(&str, Change) + Send + Sync,
{
    fn record(&self, table: &str, change: Change) {
        self(table, change)
    }
}
