//! Idempotency Store
//!
//! Durable mapping from a client-supplied key to the operation it
//! identifies. Reservation is the mutual-exclusion primitive against
//! duplicate submissions: when two callers race on one key, exactly one
//! gets `New` and creates the operation, the other gets `Existing` and
//! must poll the recorded operation until it is terminal. No result is
//! ever fabricated early.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::core_types::OperationId;
use crate::oplog::{OperationKind, OperationOutcome};

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// This caller won the key; it must create and drive the operation.
    New,
    /// The key was already reserved. `outcome` is present once the
    /// recorded operation reached a terminal state.
    Existing {
        operation_id: OperationId,
        outcome: Option<OperationOutcome>,
    },
}

/// Durable record behind one idempotency key.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,
    pub kind: OperationKind,
    pub operation_id: OperationId,
    pub outcome: Option<OperationOutcome>,
    /// Reservation timestamp (millis), drives retention
    pub reserved_at: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdempotencyError {
    #[error("Key {key:?} already used for a {existing} operation, got {requested}")]
    KindMismatch {
        key: String,
        existing: OperationKind,
        requested: OperationKind,
    },

    /// Finalize called twice with different results. Must never happen
    /// when operation transitions are respected.
    #[error("Conflicting finalize for key {0:?}")]
    ResultMismatch(String),

    #[error("Finalize for unreserved key {0:?}")]
    NotReserved(String),
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically reserve `key` for `candidate` operation id. Exactly
    /// one of N racing callers receives [`Reservation::New`].
    async fn reserve(
        &self,
        key: &str,
        kind: OperationKind,
        candidate: OperationId,
    ) -> Result<Reservation, IdempotencyError>;

    /// Store the terminal result for `key`. First write wins; a repeat
    /// with an equal outcome is a no-op, a repeat with a different
    /// outcome is a programming-error fault.
    async fn finalize(&self, key: &str, outcome: OperationOutcome)
    -> Result<(), IdempotencyError>;

    /// Look up the record behind a key.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError>;
}

/// In-memory [`IdempotencyStore`]; the dashmap entry API makes the
/// reservation race atomic.
pub struct MemoryIdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Drop finalized records older than `retention`. In-flight
    /// reservations are never purged: a key maps to the same operation
    /// id for its whole lifetime.
    pub fn purge_expired(&self, retention: Duration) -> usize {
        let cutoff = chrono::Utc::now().timestamp_millis() - retention.as_millis() as i64;
        let before = self.records.len();
        self.records
            .retain(|_, r| r.outcome.is_none() || r.reserved_at >= cutoff);
        before - self.records.len()
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn reserve(
        &self,
        key: &str,
        kind: OperationKind,
        candidate: OperationId,
    ) -> Result<Reservation, IdempotencyError> {
        match self.records.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                let record = e.get();
                if record.kind != kind {
                    return Err(IdempotencyError::KindMismatch {
                        key: key.to_string(),
                        existing: record.kind,
                        requested: kind,
                    });
                }
                debug!(key = key, operation_id = %record.operation_id, "Duplicate client key");
                Ok(Reservation::Existing {
                    operation_id: record.operation_id,
                    outcome: record.outcome.clone(),
                })
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(IdempotencyRecord {
                    key: key.to_string(),
                    kind,
                    operation_id: candidate,
                    outcome: None,
                    reserved_at: chrono::Utc::now().timestamp_millis(),
                });
                Ok(Reservation::New)
            }
        }
    }

    async fn finalize(
        &self,
        key: &str,
        outcome: OperationOutcome,
    ) -> Result<(), IdempotencyError> {
        let mut record = self
            .records
            .get_mut(key)
            .ok_or_else(|| IdempotencyError::NotReserved(key.to_string()))?;

        match &record.outcome {
            None => {
                record.outcome = Some(outcome);
                Ok(())
            }
            Some(existing) if *existing == outcome => Ok(()),
            Some(_) => Err(IdempotencyError::ResultMismatch(key.to_string())),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }
}
