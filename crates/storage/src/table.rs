//! CachedTable: one table's working set above the persistent backend
//!
//! # Load path
//!
//! A key is resolved in three steps:
//!
//! 1. **Fast path**: a populated slot is returned directly.
//! 2. **Miss**: the row-set is fetched from the backend at the table's
//!    snapshot coordinates and offered to the cache with
//!    `insert_if_absent`. When two threads race on the same key, the first
//!    insertion wins and the loser adopts the winner's row-set, so rows
//!    appended by either land in the same place.
//! 3. **Sentinel**: a `Checked` slot (left behind when a rollback emptied a
//!    row-set) is reloaded under the table's reload mutex. The slot is
//!    re-checked after acquiring the mutex so only one thread fetches.
//!
//! # Mutations
//!
//! `insert`, `update` and `remove` check authority and schema, apply the
//! mutation, hand exactly one [`Change`] to the recorder, then mark the
//! row-set dirty. This holds even when the condition matched no row: the
//! change then carries no records, but the key still enters the hash. The
//! only exception is `update` on a key with no rows, which does nothing.
//!
//! Deleted rows are invisible to `select` and never targeted by `remove`.
//! `update` follows the condition alone, so an empty condition also
//! rewrites deleted rows.
//!
//! # Hashing
//!
//! `hash` walks keys in byte order regardless of cache mode, so the digest
//! depends only on content.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use statecache_core::{
    AccessOptions, Address, BlockCoordinates, Change, ChangeSink, Condition, Entry, EntryStatus,
    FieldUndo, RowSet, StateBackend, StateError, StateResult, TableData, TableInfo, H256,
    STATUS_FIELD,
};

use crate::cache::{CacheMode, RowCache, Slot};
use crate::condition::matching_indices;

/// Whether a field takes part in the state hash.
///
/// Names starting or ending with `_` are bookkeeping fields and are skipped.
/// The status pseudo-field is hashed separately for every dirty row.
pub fn is_hash_field(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('_') && !name.ends_with('_')
}

/// Indices of live (non-deleted) rows matching `condition`
fn live_indices(rows: &[Entry], condition: &Condition) -> Vec<usize> {
    matching_indices(rows, condition)
        .into_iter()
        .filter(|&i| !rows[i].is_deleted())
        .collect()
}

/// A cached table
///
/// Tables are shared through `Arc` by the engine; every operation takes
/// `&self`. The configuration setters may be called at any time and are not
/// validated against each other.
pub struct CachedTable {
    info: RwLock<Arc<TableInfo>>,
    cache: Box<dyn RowCache>,
    backend: RwLock<Option<Arc<dyn StateBackend>>>,
    coordinates: RwLock<BlockCoordinates>,
    recorder: RwLock<Option<Arc<dyn ChangeSink>>>,
    /// Serializes the sentinel reload path and insert rollback
    reload: Mutex<()>,
}

impl std::fmt::Debug for CachedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTable")
            .field("name", &self.info.read().name)
            .field("mode", &self.cache.mode())
            .field("keys", &self.cache.len())
            .finish()
    }
}

impl CachedTable {
    /// Create a table with an empty cache of the given mode
    pub fn new(info: TableInfo, mode: CacheMode) -> Self {
        Self {
            info: RwLock::new(Arc::new(info)),
            cache: mode.build(),
            backend: RwLock::new(None),
            coordinates: RwLock::new(BlockCoordinates::default()),
            recorder: RwLock::new(None),
            reload: Mutex::new(()),
        }
    }

    /// Builder-style backend
    pub fn with_backend(self, backend: Arc<dyn StateBackend>) -> Self {
        self.set_backend(backend);
        self
    }

    /// Builder-style snapshot coordinates
    pub fn with_coordinates(self, at: BlockCoordinates) -> Self {
        *self.coordinates.write() = at;
        self
    }

    /// Builder-style recorder
    pub fn with_recorder(self, recorder: Arc<dyn ChangeSink>) -> Self {
        self.set_recorder(recorder);
        self
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Set the backend rows are loaded from
    pub fn set_backend(&self, backend: Arc<dyn StateBackend>) {
        *self.backend.write() = Some(backend);
    }

    /// Set the snapshot block hash used for backend loads
    pub fn set_block_hash(&self, hash: H256) {
        self.coordinates.write().hash = hash;
    }

    /// Set the snapshot block number used for backend loads
    pub fn set_block_number(&self, number: u64) {
        self.coordinates.write().number = number;
    }

    /// Replace the table metadata
    pub fn set_table_info(&self, info: TableInfo) {
        *self.info.write() = Arc::new(info);
    }

    /// Register the change recorder
    pub fn set_recorder(&self, recorder: Arc<dyn ChangeSink>) {
        *self.recorder.write() = Some(recorder);
    }

    /// Current table metadata
    pub fn info(&self) -> Arc<TableInfo> {
        Arc::clone(&self.info.read())
    }

    /// Table name
    pub fn name(&self) -> String {
        self.info.read().name.clone()
    }

    /// Current snapshot coordinates
    pub fn coordinates(&self) -> BlockCoordinates {
        *self.coordinates.read()
    }

    /// Cache strategy in use
    pub fn mode(&self) -> CacheMode {
        self.cache.mode()
    }

    /// Number of cached slots, sentinels included
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no key holds a populated row-set
    pub fn is_empty(&self) -> bool {
        self.cache
            .entries()
            .iter()
            .all(|(_, slot)| slot.is_checked())
    }

    /// Drop all cached state
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Whether `origin` may write this table
    pub fn check_authority(&self, origin: &Address) -> bool {
        self.info.read().is_authorized(origin)
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    fn load(&self, info: &TableInfo, key: &str) -> StateResult<RowSet> {
        let backend = self.backend.read().clone();
        let Some(backend) = backend else {
            return Ok(RowSet::new());
        };
        let at = self.coordinates();
        let rows = backend.fetch(&at, &info.name, key)?;
        trace!(
            target: "statecache::table",
            table = %info.name,
            key,
            rows = rows.as_ref().map_or(0, Vec::len),
            "Loaded from backend"
        );
        Ok(RowSet::from_rows(rows.unwrap_or_default()))
    }

    fn resolve(&self, info: &TableInfo, key: &str, may_load: bool) -> StateResult<Arc<RowSet>> {
        match self.cache.lookup(key) {
            Some(Slot::Loaded(rows)) => Ok(rows),
            Some(Slot::Checked) => self.reload(info, key, may_load),
            None => {
                let fresh = if may_load {
                    self.load(info, key)?
                } else {
                    RowSet::new()
                };
                match self.cache.insert_if_absent(key, Slot::Loaded(Arc::new(fresh))) {
                    Slot::Loaded(rows) => Ok(rows),
                    // A rollback left a sentinel between our lookup and insert
                    Slot::Checked => self.reload(info, key, may_load),
                }
            }
        }
    }

    fn reload(&self, info: &TableInfo, key: &str, may_load: bool) -> StateResult<Arc<RowSet>> {
        let _guard = self.reload.lock();
        if let Some(Slot::Loaded(rows)) = self.cache.lookup(key) {
            return Ok(rows);
        }
        debug!(target: "statecache::table", table = %info.name, key, "Reloading checked key");
        let fresh = if may_load {
            self.load(info, key)?
        } else {
            RowSet::new()
        };
        let rows = Arc::new(fresh);
        self.cache.replace(key, Slot::Loaded(Arc::clone(&rows)));
        Ok(rows)
    }

    fn cached(&self, info: &TableInfo, key: &str) -> StateResult<Arc<RowSet>> {
        match self.cache.lookup(key) {
            Some(Slot::Loaded(rows)) => Ok(rows),
            _ => Err(StateError::rollback_mismatch(
                &info.name,
                key,
                "no cached row-set",
            )),
        }
    }

    // ========================================================================
    // Checks
    // ========================================================================

    fn authorize(&self, info: &TableInfo, options: &AccessOptions) -> StateResult<()> {
        if options.check && !info.is_authorized(&options.origin) {
            debug!(
                target: "statecache::table",
                table = %info.name,
                origin = %options.origin,
                "Write rejected by authority list"
            );
            return Err(StateError::NotAuthorized {
                table: info.name.clone(),
                origin: options.origin.to_string(),
            });
        }
        Ok(())
    }

    fn check_fields(info: &TableInfo, entry: &Entry) -> StateResult<()> {
        match entry.fields().find(|(name, _)| !info.allows_field(name)) {
            Some((field, _)) => Err(StateError::InvalidField {
                table: info.name.clone(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn emit(&self, info: &TableInfo, change: Change) {
        let recorder = self.recorder.read().clone();
        if let Some(recorder) = recorder {
            recorder.record(&info.name, change);
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Live rows under `key` matching `condition`, in row order.
    ///
    /// The result is detached from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend load fails.
    pub fn select(&self, key: &str, condition: &Condition) -> StateResult<RowSet> {
        let info = self.info();
        let rows = self.resolve(&info, key, true)?;
        let selected = rows.with_rows(|rows| {
            live_indices(rows, condition)
                .into_iter()
                .map(|i| rows[i].clone())
                .collect::<Vec<_>>()
        });
        Ok(RowSet::from_rows(selected))
    }

    /// Append `entry` under `key`. Returns 1.
    ///
    /// # Errors
    ///
    /// `NotAuthorized`, `InvalidField`, or a backend load error.
    pub fn insert(&self, key: &str, entry: Entry, options: &AccessOptions) -> StateResult<usize> {
        self.insert_with(key, entry, options, true)
    }

    /// `insert` with control over the backend load.
    ///
    /// Callers that know the backend has nothing for a fresh key pass
    /// `may_load = false` to skip the fetch.
    ///
    /// # Errors
    ///
    /// `NotAuthorized`, `InvalidField`, or a backend load error.
    pub fn insert_with(
        &self,
        key: &str,
        mut entry: Entry,
        options: &AccessOptions,
        may_load: bool,
    ) -> StateResult<usize> {
        let info = self.info();
        self.authorize(&info, options)?;
        Self::check_fields(&info, &entry)?;

        let rows = self.resolve(&info, key, may_load)?;
        entry.mark_dirty();
        let index = rows.push(entry);
        self.emit(
            &info,
            Change::Insert {
                key: key.to_string(),
                index,
            },
        );
        rows.set_dirty();
        trace!(target: "statecache::table", table = %info.name, key, index, "Inserted row");
        Ok(1)
    }

    /// Overwrite the fields present in `entry` on every row matching
    /// `condition`. Returns the number of rows updated; 0 for a key with no
    /// rows, which records nothing.
    ///
    /// Deleted rows fail any non-empty condition, but an empty condition
    /// rewrites them too. A populated key is dirtied and recorded even when
    /// nothing matched.
    ///
    /// # Errors
    ///
    /// `NotAuthorized`, `InvalidField`, or a backend load error.
    pub fn update(
        &self,
        key: &str,
        entry: &Entry,
        condition: &Condition,
        options: &AccessOptions,
    ) -> StateResult<usize> {
        let info = self.info();
        self.authorize(&info, options)?;
        Self::check_fields(&info, entry)?;

        let rows = self.resolve(&info, key, true)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let (count, records) = rows.with_rows_mut(|rows| {
            let indices = matching_indices(rows, condition);
            let mut records = Vec::with_capacity(indices.len() * entry.field_count());
            for &i in &indices {
                let row = &mut rows[i];
                for (name, value) in entry.fields() {
                    let old_value = row.set_field(name, value);
                    records.push(FieldUndo {
                        index: i,
                        field: name.to_string(),
                        old_value,
                    });
                }
            }
            (indices.len(), records)
        });

        self.emit(
            &info,
            Change::Update {
                key: key.to_string(),
                records,
            },
        );
        rows.set_dirty();
        trace!(target: "statecache::table", table = %info.name, key, count, "Updated rows");
        Ok(count)
    }

    /// Mark every live row matching `condition` as deleted. Rows stay in
    /// place. Returns the number of rows removed.
    ///
    /// The key is dirtied and recorded even when nothing matched.
    ///
    /// # Errors
    ///
    /// `NotAuthorized`, or a backend load error.
    pub fn remove(&self, key: &str, condition: &Condition, options: &AccessOptions) -> StateResult<usize> {
        let info = self.info();
        self.authorize(&info, options)?;

        let rows = self.resolve(&info, key, true)?;
        let indices = rows.with_rows_mut(|rows| {
            let indices = live_indices(rows, condition);
            for &i in &indices {
                rows[i].set_status(EntryStatus::Deleted);
            }
            indices
        });

        let count = indices.len();
        self.emit(
            &info,
            Change::Remove {
                key: key.to_string(),
                indices,
            },
        );
        rows.set_dirty();
        trace!(target: "statecache::table", table = %info.name, key, count, "Removed rows");
        Ok(count)
    }

    /// Digest of all dirty state.
    ///
    /// For each dirty row-set in key byte order: the key, then for each
    /// dirty row the status pseudo-field followed by its hashable fields,
    /// each as name bytes then value bytes. Returns the zero digest when
    /// nothing is dirty.
    pub fn hash(&self) -> H256 {
        let mut slots = self.cache.entries();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        let mut fed = 0usize;
        let mut feed = |bytes: &[u8]| {
            hasher.update(bytes);
            fed += bytes.len();
        };

        for (key, slot) in &slots {
            let Some(rows) = slot.rows() else { continue };
            if !rows.is_dirty() {
                continue;
            }
            feed(key.as_bytes());
            rows.with_rows(|rows| {
                for row in rows.iter().filter(|r| r.is_dirty()) {
                    feed(STATUS_FIELD.as_bytes());
                    feed(row.status().code().as_bytes());
                    for (name, value) in row.fields().filter(|(n, _)| is_hash_field(n)) {
                        feed(name.as_bytes());
                        feed(value.as_bytes());
                    }
                }
            });
        }

        if fed == 0 {
            return H256::zero();
        }
        H256(hasher.finalize().into())
    }

    /// Snapshot of every populated row-set, and whether any is dirty
    pub fn dump(&self) -> TableData {
        let mut data = TableData {
            info: self.info(),
            rows: Default::default(),
            dirty: false,
        };
        for (key, slot) in self.cache.entries() {
            let Some(rows) = slot.rows() else { continue };
            data.dirty |= rows.is_dirty();
            data.rows.insert(key, rows.snapshot());
        }
        data
    }

    /// Check that `change` fits the cached rows, without touching them.
    ///
    /// A change without records always fits.
    ///
    /// # Errors
    ///
    /// The same `RollbackMismatch` that `rollback` would return.
    pub fn check_rollback(&self, change: &Change) -> StateResult<()> {
        if change.record_count() == 0 {
            return Ok(());
        }
        let info = self.info();
        let key = change.key();
        let rows = self.cached(&info, key)?;
        let len = rows.len();
        let bad = match change {
            Change::Insert { index, .. } => Some(*index).filter(|&i| i >= len),
            Change::Update { records, .. } => records.iter().map(|r| r.index).find(|&i| i >= len),
            Change::Remove { indices, .. } => indices.iter().copied().find(|&i| i >= len),
        };
        match bad {
            Some(index) => Err(StateError::rollback_mismatch(
                &info.name,
                key,
                format!("row {} out of range", index),
            )),
            None => Ok(()),
        }
    }

    /// Undo one change record. Dirty flags are left as they are.
    ///
    /// The record is validated against the cached rows before anything is
    /// touched, so a mismatched record changes nothing. A change without
    /// records undoes nothing.
    ///
    /// # Errors
    ///
    /// `RollbackMismatch` if the key is not cached or a recorded index is
    /// out of range.
    pub fn rollback(&self, change: &Change) -> StateResult<()> {
        if change.record_count() == 0 {
            return Ok(());
        }
        let info = self.info();
        let key = change.key();
        let out_of_range =
            |index: usize| StateError::rollback_mismatch(&info.name, key, format!("row {} out of range", index));

        match change {
            Change::Insert { index, .. } => {
                let _guard = self.reload.lock();
                let rows = self.cached(&info, key)?;
                rows.remove_at(*index).ok_or_else(|| out_of_range(*index))?;
                if rows.is_empty() {
                    self.cache.replace(key, Slot::Checked);
                }
            }
            Change::Update { records, .. } => {
                let rows = self.cached(&info, key)?;
                rows.with_rows_mut(|rows| {
                    if let Some(bad) = records.iter().find(|r| r.index >= rows.len()) {
                        return Err(out_of_range(bad.index));
                    }
                    for record in records.iter().rev() {
                        let row = &mut rows[record.index];
                        match &record.old_value {
                            Some(value) => {
                                row.set_field(record.field.as_str(), value.as_str());
                            }
                            None => {
                                row.remove_field(&record.field);
                            }
                        }
                    }
                    Ok(())
                })?;
            }
            Change::Remove { indices, .. } => {
                let rows = self.cached(&info, key)?;
                rows.with_rows_mut(|rows| {
                    if let Some(&bad) = indices.iter().find(|&&i| i >= rows.len()) {
                        return Err(out_of_range(bad));
                    }
                    for &i in indices {
                        rows[i].set_status(EntryStatus::Normal);
                    }
                    Ok(())
                })?;
            }
        }
        trace!(
            target: "statecache::table",
            table = %info.name,
            key,
            kind = ?change.kind(),
            "Rolled back change"
        );
        Ok(())
    }
}
