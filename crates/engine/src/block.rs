//! BlockState: the working set of every table touched by one block
//!
//! All tables of a block share one backend, one pair of snapshot
//! coordinates and one [`ChangeLog`]. Execution takes savepoints before
//! running a transaction and rolls back to them when it fails; at the end of
//! the block the aggregate hash is computed and dirty tables are committed.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use statecache_core::{
    AccessOptions, Address, BlockCoordinates, ChangeSink, StateBackend, StateError, StateResult,
    TableData, TableInfo, H256,
};
use statecache_storage::{CacheMode, CachedTable};

use crate::changelog::ChangeLog;
use crate::config::CacheConfig;

/// Tables opened for one block, keyed by name
pub struct BlockState {
    backend: Arc<dyn StateBackend>,
    coordinates: BlockCoordinates,
    mode: CacheMode,
    check_authority: bool,
    tables: RwLock<BTreeMap<String, Arc<CachedTable>>>,
    log: Arc<ChangeLog>,
}

impl std::fmt::Debug for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockState")
            .field("number", &self.coordinates.number)
            .field("mode", &self.mode)
            .field("tables", &self.tables.read().len())
            .field("changes", &self.log.len())
            .finish()
    }
}

impl BlockState {
    /// Create the working set for the block at `coordinates`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configured cache mode is unknown.
    pub fn new(
        backend: Arc<dyn StateBackend>,
        coordinates: BlockCoordinates,
        config: &CacheConfig,
    ) -> StateResult<Self> {
        let mode = config.cache_mode()?;
        debug!(
            target: "statecache::block",
            number = coordinates.number,
            %mode,
            "Opened block state"
        );
        Ok(Self {
            backend,
            coordinates,
            mode,
            check_authority: config.check_authority,
            tables: RwLock::new(BTreeMap::new()),
            log: Arc::new(ChangeLog::new()),
        })
    }

    /// Snapshot coordinates every table reads from
    pub fn coordinates(&self) -> BlockCoordinates {
        self.coordinates
    }

    /// Cache mode used for new tables
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// The shared change log
    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    /// Open a table, creating it on first use.
    ///
    /// A table that is already open is returned as is; `info` is only used
    /// the first time.
    pub fn open_table(&self, info: TableInfo) -> Arc<CachedTable> {
        if let Some(table) = self.tables.read().get(&info.name) {
            return Arc::clone(table);
        }

        let mut tables = self.tables.write();
        let name = info.name.clone();
        let table = tables.entry(name.clone()).or_insert_with(|| {
            let recorder: Arc<dyn ChangeSink> = self.log.clone();
            Arc::new(
                CachedTable::new(info, self.mode)
                    .with_backend(Arc::clone(&self.backend))
                    .with_coordinates(self.coordinates)
                    .with_recorder(recorder),
            )
        });
        debug!(target: "statecache::block", table = %name, "Opened table");
        Arc::clone(table)
    }

    /// Look up an open table
    pub fn table(&self, name: &str) -> Option<Arc<CachedTable>> {
        self.tables.read().get(name).cloned()
    }

    /// Names of open tables, sorted
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Access options for `origin` using the configured enforcement flag
    pub fn access(&self, origin: impl Into<Address>) -> AccessOptions {
        AccessOptions {
            origin: origin.into(),
            check: self.check_authority,
        }
    }

    /// Current depth of the change log
    pub fn savepoint(&self) -> usize {
        self.log.savepoint()
    }

    /// Undo every change recorded after `savepoint`, newest first.
    ///
    /// Returns the number of changes undone.
    ///
    /// Every change is checked against its table before any is undone. If
    /// one still fails while undoing, the changes not yet undone go back on
    /// the log, so the log always matches the cached rows and the call can
    /// be retried.
    ///
    /// # Errors
    ///
    /// `RollbackMismatch` if a change names a table that is not open or does
    /// not fit the table's rows.
    pub fn rollback_to(&self, savepoint: usize) -> StateResult<usize> {
        let changes = self.log.drain_from(savepoint);
        let tables = self.tables.read();

        let checked = changes.iter().try_for_each(|(name, change)| match tables.get(name) {
            Some(table) => table.check_rollback(change),
            None => Err(StateError::rollback_mismatch(
                name,
                change.key(),
                "table is not open",
            )),
        });
        if let Err(e) = checked {
            warn!(target: "statecache::block", savepoint, error = %e, "Rollback rejected");
            self.log.restore(changes);
            return Err(e);
        }

        for (done, (name, change)) in changes.iter().enumerate() {
            let undone = match tables.get(name) {
                Some(table) => table.rollback(change),
                None => Ok(()),
            };
            if let Err(e) = undone {
                warn!(
                    target: "statecache::block",
                    savepoint,
                    undone = done,
                    error = %e,
                    "Rollback stopped partway"
                );
                self.log.restore(changes[done..].to_vec());
                return Err(e);
            }
        }
        if !changes.is_empty() {
            debug!(
                target: "statecache::block",
                savepoint,
                undone = changes.len(),
                "Rolled back to savepoint"
            );
        }
        Ok(changes.len())
    }

    /// Aggregate digest of every open table.
    ///
    /// Non-zero table hashes are concatenated in table name order and hashed
    /// once more. Returns the zero digest when no table has dirty state.
    pub fn hash(&self) -> H256 {
        let tables = self.tables.read();
        let mut hasher = Sha256::new();
        let mut any = false;
        for table in tables.values() {
            let digest = table.hash();
            if digest.is_zero() {
                continue;
            }
            hasher.update(digest.as_bytes());
            any = true;
        }
        if !any {
            return H256::zero();
        }
        H256(hasher.finalize().into())
    }

    /// Snapshots of every table with dirty state, in name order
    pub fn dump(&self) -> Vec<TableData> {
        self.tables
            .read()
            .values()
            .map(|table| table.dump())
            .filter(|data| data.dirty)
            .collect()
    }

    /// Hand dirty tables to the backend and forget the change log.
    ///
    /// Returns the number of rows the backend reports as written.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error; the change log is kept so the block
    /// can still be rolled back.
    pub fn commit(&self) -> StateResult<usize> {
        let data = self.dump();
        let written = match self.backend.commit(&self.coordinates, &data) {
            Ok(written) => written,
            Err(e) => {
                warn!(
                    target: "statecache::block",
                    number = self.coordinates.number,
                    error = %e,
                    "Commit failed"
                );
                return Err(e);
            }
        };
        self.log.clear();
        info!(
            target: "statecache::block",
            number = self.coordinates.number,
            tables = data.len(),
            rows = written,
            "Committed block state"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statecache_core::{Change, ChangeSink, Condition, Entry};
    use statecache_storage::MemBackend;

    fn block(mode: CacheMode) -> (Arc<MemBackend>, BlockState) {
        let backend = Arc::new(MemBackend::new());
        let state = BlockState::new(
            backend.clone(),
            BlockCoordinates::new(H256::zero(), 1),
            &CacheConfig::with_mode(mode),
        )
        .unwrap();
        (backend, state)
    }

    fn info(name: &str) -> TableInfo {
        TableInfo::new(name, ["v"])
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let config = CacheConfig {
            mode: "bogus".to_string(),
            check_authority: true,
        };
        let err = BlockState::new(
            Arc::new(MemBackend::new()),
            BlockCoordinates::default(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, StateError::InvalidConfig(_)));
    }

    #[test]
    fn test_open_table_is_idempotent() {
        let (_, state) = block(CacheMode::Exclusive);
        let a = state.open_table(info("t"));
        let b = state.open_table(TableInfo::new("t", ["other"]));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(b.info().allows_field("v"));
        assert_eq!(state.table_names(), vec!["t".to_string()]);
        assert!(state.table("missing").is_none());
    }

    #[test]
    fn test_tables_share_coordinates_and_mode() {
        let (_, state) = block(CacheMode::Shared);
        let table = state.open_table(info("t"));
        assert_eq!(table.mode(), CacheMode::Shared);
        assert_eq!(table.coordinates().number, 1);
    }

    #[test]
    fn test_access_uses_config_flag() {
        let backend = Arc::new(MemBackend::new());
        let config = CacheConfig {
            check_authority: false,
            ..CacheConfig::default()
        };
        let state = BlockState::new(backend, BlockCoordinates::default(), &config).unwrap();
        let options = state.access("alice");
        assert_eq!(options.origin.as_str(), "alice");
        assert!(!options.check);
    }

    #[test]
    fn test_mutations_are_logged() {
        let (_, state) = block(CacheMode::Exclusive);
        let table = state.open_table(info("t"));
        let opts = state.access("alice");
        table
            .insert("k", Entry::new().with_field("v", "1"), &opts)
            .unwrap();
        table.remove("k", &Condition::new(), &opts).unwrap();
        assert_eq!(state.change_log().len(), 2);
    }

    #[test]
    fn test_rollback_to_savepoint() {
        let (_, state) = block(CacheMode::Exclusive);
        let table = state.open_table(info("t"));
        let opts = state.access("alice");
        table
            .insert("k", Entry::new().with_field("v", "1"), &opts)
            .unwrap();
        let sp = state.savepoint();
        table
            .insert("k", Entry::new().with_field("v", "2"), &opts)
            .unwrap();
        assert_eq!(state.rollback_to(sp).unwrap(), 1);
        assert_eq!(table.select("k", &Condition::new()).unwrap().len(), 1);
        assert_eq!(state.rollback_to(sp).unwrap(), 0);
    }

    #[test]
    fn test_rejected_rollback_keeps_log_and_rows() {
        let (_, state) = block(CacheMode::Exclusive);
        let table = state.open_table(info("t"));
        let sp = state.savepoint();
        table
            .insert("k", Entry::new().with_field("v", "1"), &state.access("alice"))
            .unwrap();
        state.change_log().record(
            "t",
            Change::Remove {
                key: "k".to_string(),
                indices: vec![7],
            },
        );

        let err = state.rollback_to(sp).unwrap_err();
        assert!(matches!(err, StateError::RollbackMismatch { .. }));
        assert_eq!(state.change_log().len(), 2);
        assert_eq!(table.select("k", &Condition::new()).unwrap().len(), 1);

        // Dropping the bad record lets the rest roll back
        let mut rest = state.change_log().drain_from(sp);
        rest.remove(0);
        state.change_log().restore(rest);
        assert_eq!(state.rollback_to(sp).unwrap(), 1);
        assert!(table.select("k", &Condition::new()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_block_hash_is_zero() {
        let (_, state) = block(CacheMode::Exclusive);
        state.open_table(info("t"));
        assert!(state.hash().is_zero());
        assert!(state.dump().is_empty());
    }

    #[test]
    fn test_commit_clears_log() {
        let (backend, state) = block(CacheMode::Exclusive);
        let table = state.open_table(info("t"));
        table
            .insert("k", Entry::new().with_field("v", "1"), &state.access("alice"))
            .unwrap();
        assert_eq!(state.commit().unwrap(), 1);
        assert!(state.change_log().is_empty());
        assert_eq!(backend.commits().len(), 1);
    }

    #[test]
    fn test_failed_commit_keeps_log() {
        let (backend, state) = block(CacheMode::Exclusive);
        let table = state.open_table(info("t"));
        table
            .insert("k", Entry::new().with_field("v", "1"), &state.access("alice"))
            .unwrap();
        backend.set_failing(true);
        assert!(state.commit().is_err());
        assert_eq!(state.change_log().len(), 1);
    }
}
