//! Identity, digest and coordinate types
//!
//! - `H256`: fixed-width 32-byte digest (state hashes, block hashes)
//! - `Address`: writer identity checked against a table's authority list
//! - `BlockCoordinates`: the (hash, number) pair naming a backend state view
//! - `AccessOptions`: per-mutation requester identity and enforcement flag

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct H256(pub [u8; 32]);

impl H256 {
    /// Width in bytes
    pub const LEN: usize = 32;

    /// The all-zero digest, used for "nothing changed"
    pub const fn zero() -> Self {
        H256([0u8; 32])
    }

    /// Check for the all-zero digest
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Writer identity
///
/// Identities are opaque strings; the table only ever compares them for
/// equality against its authority list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Wrap an identity string
    pub fn new(id: impl Into<String>) -> Self {
        Address(id.into())
    }

    /// Identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(id: &str) -> Self {
        Address(id.to_string())
    }
}

impl From<String> for Address {
    fn from(id: String) -> Self {
        Address(id)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot coordinates: which backend state view a table reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockCoordinates {
    /// Block hash of the snapshot
    pub hash: H256,
    /// Block number of the snapshot
    pub number: u64,
}

impl BlockCoordinates {
    /// Create coordinates for a block
    pub fn new(hash: H256, number: u64) -> Self {
        Self { hash, number }
    }
}

/// Options attached to every mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessOptions {
    /// Identity of the requester
    pub origin: Address,
    /// Whether to enforce the table's authority list
    pub check: bool,
}

impl AccessOptions {
    /// Options for `origin` with enforcement enabled
    pub fn new(origin: impl Into<Address>) -> Self {
        Self {
            origin: origin.into(),
            check: true,
        }
    }

    /// Options that skip the authority check (system writes)
    pub fn unchecked() -> Self {
        Self {
            origin: Address::default(),
            check: false,
        }
    }
}

impl Default for AccessOptions {
    fn default() -> Self {
        Self {
            origin: Address::default(),
            check: true,
        }
    }
}
