//! Storage layer for statecache
//!
//! This crate implements the cached table with:
//! - ExclusiveCache: BTreeMap under one RwLock, for sequential access
//! - SharedCache: DashMap + FxHash, for concurrent execution threads
//! - Condition evaluation over rows
//! - CachedTable: lazy backend loads, mutations with undo records,
//!   authority and schema checks, deterministic hashing, rollback
//! - LegacyTable: fault-degrading view returning integer codes
//! - MemBackend: in-memory backend for tests and benchmarks
//!
//! # Concurrency
//!
//! In shared mode several threads may work on different keys of one table
//! at once. Rows of a single key are guarded by the row-set's own lock, but
//! conflicting mutations of the same key from different threads are the
//! caller's responsibility to avoid.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod condition;
pub mod legacy;
pub mod mem_backend;
pub mod table;

pub use cache::{CacheMode, ExclusiveCache, RowCache, SharedCache, Slot};
pub use condition::{compare, matches, matching_indices};
pub use legacy::LegacyTable;
pub use mem_backend::MemBackend;
pub use table::{is_hash_field, CachedTable};
