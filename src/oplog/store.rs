//! Operation Log persistence contract.
//!
//! All state changes go through atomic CAS (compare-and-swap) updates,
//! so concurrent coordinator instances and the recovery worker can race
//! on the same operation without double-applying a transition. A
//! terminal operation is immutable: CAS against it always fails.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use super::state::OpState;
use super::types::Operation;
use crate::core_types::OperationId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OplogError {
    #[error("Operation not found: {0}")]
    NotFound(OperationId),

    #[error("Operation already exists: {0}")]
    AlreadyExists(OperationId),
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist a freshly created operation in `Pending` state.
    async fn create(&self, op: &Operation) -> Result<(), OplogError>;

    /// Read an operation record.
    async fn get(&self, id: OperationId) -> Result<Option<Operation>, OplogError>;

    /// Atomic CAS: transition `expected -> new` only if the stored state
    /// still equals `expected` and is not terminal. Returns whether the
    /// update happened.
    async fn update_state_if(
        &self,
        id: OperationId,
        expected: OpState,
        new: OpState,
    ) -> Result<bool, OplogError>;

    /// CAS with a reason code recorded alongside the transition.
    async fn update_state_with_error(
        &self,
        id: OperationId,
        expected: OpState,
        new: OpState,
        error: &str,
    ) -> Result<bool, OplogError>;

    /// Bump the retry counter; returns the new count.
    async fn increment_retry(&self, id: OperationId) -> Result<u32, OplogError>;

    /// Zero the retry counter (used when the FSM enters a new phase so
    /// compensation retries are counted from scratch).
    async fn reset_retry(&self, id: OperationId) -> Result<(), OplogError>;

    /// Non-terminal operations that have not progressed within
    /// `threshold`; recovery re-drives these.
    async fn find_stale(&self, threshold: Duration) -> Result<Vec<Operation>, OplogError>;
}

/// In-memory [`OperationStore`] backed by a concurrent map. The dashmap
/// entry lock makes each CAS atomic.
pub struct MemoryOperationStore {
    ops: DashMap<OperationId, Operation>,
}

impl MemoryOperationStore {
    pub fn new() -> Self {
        Self {
            ops: DashMap::new(),
        }
    }
}

impl Default for MemoryOperationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn create(&self, op: &Operation) -> Result<(), OplogError> {
        match self.ops.entry(op.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(OplogError::AlreadyExists(op.id)),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(op.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: OperationId) -> Result<Option<Operation>, OplogError> {
        Ok(self.ops.get(&id).map(|op| op.clone()))
    }

    async fn update_state_if(
        &self,
        id: OperationId,
        expected: OpState,
        new: OpState,
    ) -> Result<bool, OplogError> {
        let mut op = self.ops.get_mut(&id).ok_or(OplogError::NotFound(id))?;
        if op.state != expected || op.state.is_terminal() {
            return Ok(false);
        }
        op.state = new;
        op.updated_at = now_millis();
        Ok(true)
    }

    async fn update_state_with_error(
        &self,
        id: OperationId,
        expected: OpState,
        new: OpState,
        error: &str,
    ) -> Result<bool, OplogError> {
        let mut op = self.ops.get_mut(&id).ok_or(OplogError::NotFound(id))?;
        if op.state != expected || op.state.is_terminal() {
            return Ok(false);
        }
        op.state = new;
        op.error = Some(error.to_string());
        op.updated_at = now_millis();
        Ok(true)
    }

    async fn increment_retry(&self, id: OperationId) -> Result<u32, OplogError> {
        let mut op = self.ops.get_mut(&id).ok_or(OplogError::NotFound(id))?;
        op.retry_count += 1;
        op.updated_at = now_millis();
        Ok(op.retry_count)
    }

    async fn reset_retry(&self, id: OperationId) -> Result<(), OplogError> {
        let mut op = self.ops.get_mut(&id).ok_or(OplogError::NotFound(id))?;
        op.retry_count = 0;
        Ok(())
    }

    async fn find_stale(&self, threshold: Duration) -> Result<Vec<Operation>, OplogError> {
        let cutoff = now_millis() - threshold.as_millis() as i64;
        let mut stale: Vec<Operation> = self
            .ops
            .iter()
            .filter(|op| !op.state.is_terminal() && op.updated_at < cutoff)
            .map(|op| op.clone())
            .collect();
        stale.sort_by_key(|op| op.updated_at);
        Ok(stale)
    }
}
