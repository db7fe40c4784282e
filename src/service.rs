//! Service surface.
//!
//! [`PayflowService`] is the single entry point callers go through:
//! validate, reserve the idempotency key, persist, execute. The key
//! reservation happens only after validation passes, so a rejected
//! request never consumes its key. Whatever transport fronts this
//! (HTTP, message consumer) maps 1:1 onto these methods.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core_types::{AccountId, Currency, OperationId};
use crate::idempotency::{IdempotencyStore, Reservation};
use crate::ledger::{Account, AccountStore, LedgerEntry};
use crate::oplog::{Operation, OperationOutcome, OperationRequest, PublicStatus};
use crate::saga::{OperationError, SagaCoordinator};

/// What the caller gets back from a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResult {
    pub outcome: OperationOutcome,
    /// True when the idempotency key matched an earlier submission and
    /// no new operation was created.
    pub replayed: bool,
}

pub struct PayflowService {
    coordinator: Arc<SagaCoordinator>,
    ledger: Arc<dyn AccountStore>,
    idempotency: Arc<dyn IdempotencyStore>,
}

impl PayflowService {
    pub fn new(
        coordinator: Arc<SagaCoordinator>,
        ledger: Arc<dyn AccountStore>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            coordinator,
            ledger,
            idempotency,
        }
    }

    pub async fn open_account(
        &self,
        user_id: u64,
        currency: &str,
    ) -> Result<Account, OperationError> {
        let currency: Currency = currency
            .parse()
            .map_err(|_| OperationError::InvalidCurrency(currency.to_string()))?;
        let account = self.ledger.open_account(user_id, currency).await?;
        info!(
            account_id = account.id,
            user_id = user_id,
            currency = %account.currency,
            "Account opened"
        );
        Ok(account)
    }

    /// Submit any operation: validate, reserve the client key, persist,
    /// then drive to completion (or hand off to recovery).
    pub async fn submit(&self, req: OperationRequest) -> Result<SubmitResult, OperationError> {
        // Validation first: a rejected request must not consume the key
        let op = self.coordinator.prepare(&req).await?;

        match self
            .idempotency
            .reserve(&req.client_key, req.kind, op.id)
            .await?
        {
            Reservation::New => {
                self.coordinator.submit(&op).await?;
                self.coordinator.execute(op.id).await?;
                let outcome = self.current_outcome(op.id).await?;
                Ok(SubmitResult {
                    outcome,
                    replayed: false,
                })
            }
            Reservation::Existing {
                operation_id,
                outcome: Some(outcome),
            } => {
                // Terminal result already recorded: pure replay
                debug!(
                    client_key = %req.client_key,
                    operation_id = %operation_id,
                    "Replaying recorded result"
                );
                Ok(SubmitResult {
                    outcome,
                    replayed: true,
                })
            }
            Reservation::Existing {
                operation_id,
                outcome: None,
            } => {
                // Original submission still in flight: report its current
                // state, never start a second operation
                debug!(
                    client_key = %req.client_key,
                    operation_id = %operation_id,
                    "Duplicate submission for in-flight operation"
                );
                let outcome = self.inflight_outcome(operation_id).await?;
                Ok(SubmitResult {
                    outcome,
                    replayed: true,
                })
            }
        }
    }

    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: u64,
        client_key: impl Into<String>,
    ) -> Result<SubmitResult, OperationError> {
        self.submit(OperationRequest::deposit(account_id, amount, client_key))
            .await
    }

    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount: u64,
        client_key: impl Into<String>,
    ) -> Result<SubmitResult, OperationError> {
        self.submit(OperationRequest::withdrawal(account_id, amount, client_key))
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        mode: crate::commission::CommissionMode,
        amount: u64,
        commission_percent: Option<rust_decimal::Decimal>,
        commission_fixed: Option<u64>,
        client_key: impl Into<String>,
    ) -> Result<SubmitResult, OperationError> {
        self.submit(OperationRequest::transfer(
            from,
            to,
            mode,
            amount,
            commission_percent,
            commission_fixed,
            client_key,
        ))
        .await
    }

    pub async fn get_operation(
        &self,
        id: OperationId,
    ) -> Result<Option<Operation>, OperationError> {
        self.coordinator.get(id).await
    }

    /// Current caller-visible status of an operation.
    pub async fn get_status(
        &self,
        id: OperationId,
    ) -> Result<OperationOutcome, OperationError> {
        self.current_outcome(id).await
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, OperationError> {
        Ok(self.ledger.get(id).await?)
    }

    /// Full audit trail for an account, in apply order.
    pub async fn account_entries(
        &self,
        id: AccountId,
    ) -> Result<Vec<LedgerEntry>, OperationError> {
        Ok(self.ledger.entries(id).await?)
    }

    async fn current_outcome(&self, id: OperationId) -> Result<OperationOutcome, OperationError> {
        let op = self
            .coordinator
            .get(id)
            .await?
            .ok_or(OperationError::OperationNotFound(id))?;
        Ok(op.outcome())
    }

    /// Status of another caller's in-flight submission. The winner
    /// reserves the key before it persists the operation, so for a
    /// brief window the record may not be readable yet; a duplicate
    /// landing there is still a valid request and gets `pending`,
    /// never an error.
    async fn inflight_outcome(
        &self,
        id: OperationId,
    ) -> Result<OperationOutcome, OperationError> {
        for _ in 0..3 {
            if let Some(op) = self.coordinator.get(id).await? {
                return Ok(op.outcome());
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        Ok(OperationOutcome {
            operation_id: id,
            status: PublicStatus::Pending,
            reason: None,
        })
    }
}

/// Convenience for callers that only care about success.
pub fn is_committed(result: &SubmitResult) -> bool {
    result.outcome.status == PublicStatus::Committed
}
