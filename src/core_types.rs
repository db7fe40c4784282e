//! Core type definitions shared by every module.
//!
//! Monetary amounts are always integer minor units (cents, kopecks);
//! `u64` for balances (non-negative by construction), `i64` for deltas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Account identifier
pub type AccountId = u64;

/// Owning user identifier
pub type UserId = u64;

/// Optimistic concurrency token on an account (bumped on every mutation)
pub type Version = u64;

/// Amount in minor units (always positive in requests)
pub type Amount = u64;

/// Signed balance change in minor units
pub type Delta = i64;

/// Operation ID - ULID-based unique identifier
///
/// Monotonic, sortable, 128-bit with good entropy; no coordination
/// needed between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(ulid::Ulid);

impl OperationId {
    /// Generate a new unique OperationId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// ISO-4217 style three-letter currency code, stored uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const fn from_bytes(code: [u8; 3]) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        // Invariant: only ASCII uppercase letters are ever stored
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 3 || !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("Invalid currency code: {:?}", s));
        }
        let mut code = [0u8; 3];
        for (i, c) in s.chars().enumerate() {
            code[i] = c.to_ascii_uppercase() as u8;
        }
        Ok(Self(code))
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
