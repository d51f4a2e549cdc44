//! statecache - in-memory working set of blockchain state tables
//!
//! Executing a block reads and writes rows of many tables. statecache keeps
//! every touched row in memory above the persistent backend, records an undo
//! record for each mutation, and produces a deterministic digest of what the
//! block changed before the dirty rows are committed.
//!
//! # Quick Start
//!
//! ```ignore
//! use statecache::{BlockState, CacheConfig, Condition, Entry, MemBackend, TableInfo};
//!
//! let backend = std::sync::Arc::new(MemBackend::new());
//! let state = BlockState::new(backend, Default::default(), &CacheConfig::default())?;
//!
//! let accounts = state.open_table(TableInfo::new("t_account", ["balance"]));
//! accounts.insert("alice", Entry::new().with_field("balance", "100"), &state.access("alice"))?;
//!
//! let rows = accounts.select("alice", &Condition::new().ge("balance", "50"))?;
//! let digest = state.hash();
//! state.commit()?;
//! ```
//!
//! # Architecture
//!
//! The common types are re-exported at the top level; each layer is also
//! reachable as a module (`core`, `storage`, `engine`).
//!
//! - `statecache-core`: rows, conditions, change records, errors, backend trait
//! - `statecache-storage`: the cached table, both cache modes, in-memory backend
//! - `statecache-engine`: block state, change log with savepoints, configuration

pub use statecache_core as core;
pub use statecache_engine as engine;
pub use statecache_storage as storage;

pub use statecache_core::{
    AccessOptions, Address, BlockCoordinates, Change, ChangeKind, ChangeSink, Clause, Condition,
    ConditionOp, Entry, EntryStatus, FieldUndo, RowSet, StateBackend, StateError, StateResult,
    TableData, TableInfo, CODE_NO_AUTHORIZED, H256, ID_FIELD, STATUS_FIELD,
};
pub use statecache_engine::{BlockState, CacheConfig, ChangeLog, CONFIG_FILE_NAME};
pub use statecache_storage::{
    is_hash_field, CacheMode, CachedTable, ExclusiveCache, LegacyTable, MemBackend, RowCache,
    SharedCache, Slot,
};
