//! Block-level engine for statecache
//!
//! This crate ties cached tables together for one block:
//! - BlockState: opens tables against one backend and snapshot, computes the
//!   aggregate hash and commits dirty tables
//! - ChangeLog: undo stack shared by every table, with savepoints
//! - CacheConfig: `statecache.toml` settings (cache mode, authority checks)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod changelog;
pub mod config;

pub use block::BlockState;
pub use changelog::ChangeLog;
pub use config::{CacheConfig, CONFIG_FILE_NAME};
