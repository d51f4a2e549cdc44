//! Error types for statecache
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! The table API returns these errors directly. Callers that want the
//! historical "degrade to zero" behavior go through the legacy view in
//! `statecache-storage`, which maps errors with [`StateError::legacy_code`].

use std::io;
use thiserror::Error;

/// Return code reported by the legacy API when the authority check fails.
pub const CODE_NO_AUTHORIZED: i32 = -50000;

/// Result type alias for statecache operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Error types for the table cache
#[derive(Debug, Error)]
pub enum StateError {
    /// Writer identity is not on the table's authority list
    #[error("origin {origin} is not authorized to write table {table}")]
    NotAuthorized {
        /// Table name
        table: String,
        /// Rejected writer identity
        origin: String,
    },

    /// Write to a field the table does not declare
    #[error("field {field:?} is not declared by table {table}")]
    InvalidField {
        /// Table name
        table: String,
        /// Offending field name
        field: String,
    },

    /// Malformed numeric operand in a condition clause
    #[error("cannot compare field {field:?} numerically: {lhs:?} vs {rhs:?}")]
    Compare {
        /// Field being compared
        field: String,
        /// Row-side value
        lhs: String,
        /// Condition-side value
        rhs: String,
    },

    /// Backend fetch or commit failed
    #[error("backend error: {message}")]
    Backend {
        /// Diagnostic message from the backend
        message: String,
    },

    /// A change record does not line up with the cached rows
    #[error("cannot roll back change on {table}/{key}: {reason}")]
    RollbackMismatch {
        /// Table name
        table: String,
        /// Affected key
        key: String,
        /// What did not match
        reason: String,
    },

    /// Configuration value out of range or unparseable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (config file access)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StateError {
    /// Create a backend error from any displayable message
    pub fn backend(message: impl Into<String>) -> Self {
        StateError::Backend {
            message: message.into(),
        }
    }

    /// Create a rollback mismatch error
    pub fn rollback_mismatch(
        table: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        StateError::RollbackMismatch {
            table: table.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is an authority failure
    pub fn is_not_authorized(&self) -> bool {
        matches!(self, StateError::NotAuthorized { .. })
    }

    /// Integer code the legacy API returns in place of this error.
    ///
    /// Only authority failures are distinguishable; every other fault
    /// degrades to `0`.
    pub fn legacy_code(&self) -> i32 {
        match self {
            StateError::NotAuthorized { .. } => CODE_NO_AUTHORIZED,
            _ => 0,
        }
    }
}
