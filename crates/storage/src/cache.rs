//! Key → row-set cache strategies
//!
//! A table's cache maps each key to a [`Slot`]. A missing slot means the key
//! was never looked up; [`Slot::Checked`] means the backend was consulted and
//! the key currently has no cached rows. The shared strategy never deletes
//! slots, so the sentinel is what stands in for removal.
//!
//! # Strategies
//!
//! - [`ExclusiveCache`]: `BTreeMap` behind one `parking_lot::RwLock`, for
//!   tables the engine accesses from a single thread at a time
//! - [`SharedCache`]: `DashMap` with FxHash, sharded writes and lock-free
//!   reads, for tables touched by several execution threads at once
//!
//! Both implement [`RowCache`]; the table picks one at construction through
//! [`CacheMode`].

use std::collections::BTreeMap;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry as DashMapEntry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;

use statecache_core::{RowSet, StateError};

/// Cached state of one key
#[derive(Debug, Clone)]
pub enum Slot {
    /// Looked up before; no rows are cached (the backend had none, or
    /// every cached row was rolled back)
    Checked,
    /// Populated row-set
    Loaded(Arc<RowSet>),
}

impl Slot {
    /// Row-set if populated
    pub fn rows(&self) -> Option<&Arc<RowSet>> {
        match self {
            Slot::Loaded(rows) => Some(rows),
            Slot::Checked => None,
        }
    }

    /// Whether this is the sentinel
    pub fn is_checked(&self) -> bool {
        matches!(self, Slot::Checked)
    }
}

/// Concurrency mode of a table's cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    /// Single ordered map under one reader/writer lock
    #[default]
    Exclusive,
    /// Sharded concurrent map for multi-threaded execution
    Shared,
}

impl CacheMode {
    /// Construct an empty cache of this mode
    pub fn build(self) -> Box<dyn RowCache> {
        match self {
            CacheMode::Exclusive => Box::new(ExclusiveCache::new()),
            CacheMode::Shared => Box::new(SharedCache::new()),
        }
    }

    /// Config-file spelling of the mode
    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::Exclusive => "exclusive",
            CacheMode::Shared => "shared",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exclusive" => Ok(CacheMode::Exclusive),
            "shared" => Ok(CacheMode::Shared),
            other => Err(StateError::InvalidConfig(format!(
                "unknown cache mode '{}', expected \"exclusive\" or \"shared\"",
                other
            ))),
        }
    }
}

/// Storage contract shared by both cache strategies
///
/// Implementations never remove a slot except through `clear`.
pub trait RowCache: Send + Sync + fmt::Debug {
    /// Current slot for `key`, or `None` if never looked up
    fn lookup(&self, key: &str) -> Option<Slot>;

    /// Store `slot` unless the key already has one.
    ///
    /// Returns whichever slot is in the cache afterwards, so the first
    /// writer wins and later writers get the winner's row-set.
    fn insert_if_absent(&self, key: &str, slot: Slot) -> Slot;

    /// Overwrite the slot for `key`
    fn replace(&self, key: &str, slot: Slot);

    /// All slots in the cache's native order
    fn entries(&self) -> Vec<(String, Slot)>;

    /// Number of slots, sentinels included
    fn len(&self) -> usize;

    /// Check for zero slots
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every slot
    fn clear(&self);

    /// Which strategy this is
    fn mode(&self) -> CacheMode;
}

/// Ordered map under a single reader/writer lock
#[derive(Debug, Default)]
pub struct ExclusiveCache {
    slots: RwLock<BTreeMap<String, Slot>>,
}

impl ExclusiveCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowCache for ExclusiveCache {
    fn lookup(&self, key: &str) -> Option<Slot> {
        self.slots.read().get(key).cloned()
    }

    fn insert_if_absent(&self, key: &str, slot: Slot) -> Slot {
        let mut slots = self.slots.write();
        slots.entry(key.to_string()).or_insert(slot).clone()
    }

    fn replace(&self, key: &str, slot: Slot) {
        self.slots.write().insert(key.to_string(), slot);
    }

    fn entries(&self) -> Vec<(String, Slot)> {
        self.slots
            .read()
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.slots.read().len()
    }

    fn clear(&self) {
        self.slots.write().clear();
    }

    fn mode(&self) -> CacheMode {
        CacheMode::Exclusive
    }
}

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Sharded concurrent map
///
/// Reads go through DashMap's per-shard read guards; writes lock only the
/// target shard. Iteration order is arbitrary, so anything that must be
/// deterministic sorts the output of `entries`.
pub struct SharedCache {
    slots: DashMap<String, Slot, FxBuildHasher>,
}

impl SharedCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl RowCache for SharedCache {
    fn lookup(&self, key: &str) -> Option<Slot> {
        self.slots.get(key).map(|slot| slot.value().clone())
    }

    fn insert_if_absent(&self, key: &str, slot: Slot) -> Slot {
        match self.slots.entry(key.to_string()) {
            DashMapEntry::Occupied(occupied) => occupied.get().clone(),
            DashMapEntry::Vacant(vacant) => {
                vacant.insert(slot.clone());
                slot
            }
        }
    }

    fn replace(&self, key: &str, slot: Slot) {
        self.slots.insert(key.to_string(), slot);
    }

    fn entries(&self) -> Vec<(String, Slot)> {
        self.slots
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&self) {
        self.slots.clear();
    }

    fn mode(&self) -> CacheMode {
        CacheMode::Shared
    }
}
