//! Core types and traits for statecache
//!
//! This crate defines the foundational types used throughout the system:
//! - Entry / RowSet: the unit of stored data and its mutation tracking
//! - Condition: conjunction of field comparisons used to select rows
//! - Change: undo records produced by mutations
//! - TableInfo / TableData: table metadata and commit snapshots
//! - H256, Address, BlockCoordinates, AccessOptions: identity and coordinates
//! - StateError: Error type hierarchy
//! - Traits: StateBackend (persistent rows), ChangeSink (undo recorder)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod condition;
pub mod entry;
pub mod error;
pub mod table_info;
pub mod traits;
pub mod types;

// Re-export commonly used types and traits
pub use change::{Change, ChangeKind, FieldUndo};
pub use condition::{Clause, Condition, ConditionOp};
pub use entry::{Entry, EntryStatus, RowSet, ID_FIELD, STATUS_FIELD};
pub use error::{StateError, StateResult, CODE_NO_AUTHORIZED};
pub use table_info::{TableData, TableInfo};
pub use traits::{ChangeSink, StateBackend};
pub use types::{AccessOptions, Address, BlockCoordinates, H256};
