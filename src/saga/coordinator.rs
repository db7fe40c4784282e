//! Saga Coordinator
//!
//! Drives every operation through its state machine. Two invariants
//! carried by all handlers:
//!
//! 1. **Persist-before-call**: the operation state is CAS-advanced in
//!    the log before the corresponding ledger step is issued, so a
//!    crash never loses track of an issued command.
//! 2. **Explicit-fail rule**: compensation is triggered only by an
//!    explicit rejection from the account side. An unknown outcome
//!    (timeout, channel down) re-issues the same idempotent step.
//!
//! The coordinator owns no durable state; on restart the recovery
//! worker re-reads pending operations and calls [`SagaCoordinator::step`]
//! exactly as the original caller would.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::error::{
    OperationError, REASON_COMPENSATION_FAILED, REASON_VERSION_CONFLICT,
};
use super::gateway::{LedgerGateway, StepResult};
use crate::channel::{ChannelMessage, MessageChannel, OperationEvent, TOPIC_OPERATION_EVENTS};
use crate::commission::{self, TransferAmounts};
use crate::config::AppConfig;
use crate::core_types::{Amount, Delta, OperationId};
use crate::idempotency::IdempotencyStore;
use crate::ledger::{AccountStore, LedgerError, StepName, apply_with_retry};
use crate::oplog::{OpState, Operation, OperationKind, OperationRequest, OperationStore};

pub struct SagaCoordinator {
    oplog: Arc<dyn OperationStore>,
    ledger: Arc<dyn AccountStore>,
    gateway: Arc<dyn LedgerGateway>,
    idempotency: Arc<dyn IdempotencyStore>,
    channel: Arc<dyn MessageChannel>,
    engine: crate::config::EngineConfig,
    default_percent: Decimal,
    default_fixed: Amount,
}

impl SagaCoordinator {
    pub fn new(
        oplog: Arc<dyn OperationStore>,
        ledger: Arc<dyn AccountStore>,
        gateway: Arc<dyn LedgerGateway>,
        idempotency: Arc<dyn IdempotencyStore>,
        channel: Arc<dyn MessageChannel>,
        config: &AppConfig,
    ) -> Self {
        let default_percent = config
            .commission
            .default_percent
            .parse()
            .unwrap_or(Decimal::ONE);
        Self {
            oplog,
            ledger,
            gateway,
            idempotency,
            channel,
            engine: config.engine.clone(),
            default_percent,
            default_fixed: config.commission.default_fixed,
        }
    }

    /// Validate a request and build the operation record. Nothing is
    /// persisted here: validation failures reject the request before
    /// any Operation exists and before the idempotency key is consumed.
    pub async fn prepare(&self, req: &OperationRequest) -> Result<Operation, OperationError> {
        if req.client_key.trim().is_empty() {
            return Err(OperationError::EmptyClientKey);
        }
        if req.amount == 0 {
            return Err(OperationError::InvalidAmount);
        }
        if req.amount > Delta::MAX as Amount {
            return Err(OperationError::AmountTooLarge);
        }

        match req.kind {
            OperationKind::Deposit | OperationKind::Withdraw => {
                self.ledger
                    .get(req.account_id)
                    .await
                    .map_err(OperationError::from)?
                    .ok_or(OperationError::AccountNotFound(req.account_id))?;

                let amounts = TransferAmounts {
                    debit: req.amount,
                    credit: req.amount,
                    commission: 0,
                };
                Ok(Operation::new(
                    OperationId::new(),
                    req,
                    Decimal::ZERO,
                    0,
                    amounts,
                ))
            }
            OperationKind::Transfer => {
                let to_id = req
                    .to_account_id
                    .ok_or_else(|| OperationError::StoreError("transfer without destination".into()))?;
                if req.account_id == to_id {
                    return Err(OperationError::SameAccount);
                }

                let from_acc = self
                    .ledger
                    .get(req.account_id)
                    .await
                    .map_err(OperationError::from)?
                    .ok_or(OperationError::AccountNotFound(req.account_id))?;
                let to_acc = self
                    .ledger
                    .get(to_id)
                    .await
                    .map_err(OperationError::from)?
                    .ok_or(OperationError::AccountNotFound(to_id))?;

                // Same-currency transfers only; conversion is out of scope
                if from_acc.currency != to_acc.currency {
                    return Err(OperationError::CurrencyMismatch {
                        from: from_acc.currency,
                        to: to_acc.currency,
                    });
                }

                let percent = req.commission_percent.unwrap_or(self.default_percent);
                let fixed = req.commission_fixed.unwrap_or(self.default_fixed);
                let mode = req.mode.unwrap_or(crate::commission::CommissionMode::From);
                let amounts = commission::compute(req.amount, percent, fixed, mode)?;

                Ok(Operation::new(OperationId::new(), req, percent, fixed, amounts))
            }
        }
    }

    /// Persist a prepared operation in `Pending` state.
    pub async fn submit(&self, op: &Operation) -> Result<(), OperationError> {
        self.oplog.create(op).await?;
        info!(operation_id = %op.id, kind = %op.kind, "Operation created: {}", op);
        Ok(())
    }

    /// Execute one step of the FSM; call repeatedly until terminal.
    pub async fn step(&self, id: OperationId) -> Result<OpState, OperationError> {
        let op = self
            .oplog
            .get(id)
            .await?
            .ok_or(OperationError::OperationNotFound(id))?;

        if op.state.is_terminal() {
            return Ok(op.state);
        }

        let new_state = match op.kind {
            OperationKind::Deposit | OperationKind::Withdraw => self.step_direct(&op).await?,
            OperationKind::Transfer => match op.state {
                OpState::Pending => self.step_pending(&op).await?,
                OpState::DebitPending => self.step_debit(&op).await?,
                OpState::DebitDone => self.step_debit_done(&op).await?,
                OpState::CreditPending => self.step_credit(&op).await?,
                OpState::Compensating => self.step_compensating(&op).await?,
                _ => op.state,
            },
        };

        // No progress this step: count the attempt
        if !new_state.is_terminal() && new_state == op.state {
            self.oplog.increment_retry(id).await?;
        }

        Ok(new_state)
    }

    /// Drive an operation until it reaches a terminal state or the
    /// iteration budget runs out (the recovery worker picks it up then).
    pub async fn execute(&self, id: OperationId) -> Result<OpState, OperationError> {
        let mut state = OpState::Pending;

        for i in 0..self.engine.max_step_iterations {
            state = self.step(id).await?;

            if state.is_terminal() {
                debug!(
                    operation_id = %id,
                    state = %state,
                    iterations = i + 1,
                    "Operation completed"
                );
                return Ok(state);
            }

            tokio::time::sleep(std::time::Duration::from_millis(self.engine.step_pause_ms)).await;
        }

        warn!(
            operation_id = %id,
            state = %state,
            "Operation did not complete within iteration budget, leaving to recovery"
        );
        Ok(state)
    }

    pub async fn get(&self, id: OperationId) -> Result<Option<Operation>, OperationError> {
        Ok(self.oplog.get(id).await?)
    }

    pub fn oplog(&self) -> &Arc<dyn OperationStore> {
        &self.oplog
    }

    /// Deposit/withdraw: a single conditional ledger apply plus a log
    /// transition. Replays after a crash are deduplicated through the
    /// ledger entry written by the first apply.
    async fn step_direct(&self, op: &Operation) -> Result<OpState, OperationError> {
        let (step, delta) = match op.kind {
            OperationKind::Deposit => (StepName::Credit, op.amounts.credit as Delta),
            _ => (StepName::Debit, -(op.amounts.debit as Delta)),
        };

        // Crash replay: the apply already happened, only commit the log
        if self
            .ledger
            .find_entry(op.id, step)
            .await
            .map_err(OperationError::from)?
            .is_some()
        {
            self.oplog
                .update_state_if(op.id, op.state, OpState::Committed)
                .await?;
            self.finish(op, OpState::Committed, None).await;
            return Ok(OpState::Committed);
        }

        let result = apply_with_retry(
            self.ledger.as_ref(),
            op.account_id,
            op.id,
            step,
            delta,
            self.engine.max_version_retries,
            self.engine.version_retry_backoff_ms,
        )
        .await;

        match result {
            Ok(applied) => {
                self.oplog
                    .update_state_if(op.id, op.state, OpState::Committed)
                    .await?;
                info!(
                    operation_id = %op.id,
                    kind = %op.kind,
                    account_id = op.account_id,
                    balance = applied.new_balance,
                    "Operation committed"
                );
                self.finish(op, OpState::Committed, None).await;
                Ok(OpState::Committed)
            }
            Err(e) => {
                let reason = direct_reason(&e);
                self.oplog
                    .update_state_with_error(op.id, op.state, OpState::Failed, reason)
                    .await?;
                info!(
                    operation_id = %op.id,
                    kind = %op.kind,
                    reason = reason,
                    "Operation failed"
                );
                self.finish(op, OpState::Failed, Some(reason)).await;
                Ok(OpState::Failed)
            }
        }
    }

    /// Pending: persist DebitPending, then issue the source debit.
    async fn step_pending(&self, op: &Operation) -> Result<OpState, OperationError> {
        if !self
            .oplog
            .update_state_if(op.id, OpState::Pending, OpState::DebitPending)
            .await?
        {
            // Another worker advanced it; report the current state
            return match self.oplog.get(op.id).await? {
                Some(current) => Ok(current.state),
                None => {
                    error!(operation_id = %op.id, "Operation vanished after CAS failure");
                    Err(OperationError::OperationNotFound(op.id))
                }
            };
        }

        self.issue_debit(op).await
    }

    /// DebitPending: re-issue the (idempotent) source debit.
    async fn step_debit(&self, op: &Operation) -> Result<OpState, OperationError> {
        self.issue_debit(op).await
    }

    async fn issue_debit(&self, op: &Operation) -> Result<OpState, OperationError> {
        let result = self
            .gateway
            .apply_step(op.id, op.account_id, op.debit_delta(), StepName::Debit)
            .await;

        match result {
            StepResult::Success => {
                self.oplog
                    .update_state_if(op.id, OpState::DebitPending, OpState::DebitDone)
                    .await?;
                Ok(OpState::DebitDone)
            }
            StepResult::Failed(reason) => {
                // First leg rejected: no money moved, nothing to compensate
                self.oplog
                    .update_state_with_error(op.id, OpState::DebitPending, OpState::Failed, &reason)
                    .await?;
                info!(operation_id = %op.id, reason = %reason, "Transfer failed on debit");
                self.finish(op, OpState::Failed, Some(&reason)).await;
                Ok(OpState::Failed)
            }
            StepResult::Pending => Ok(OpState::DebitPending),
        }
    }

    /// DebitDone: money is in-flight. Persist CreditPending, then issue
    /// the destination credit.
    async fn step_debit_done(&self, op: &Operation) -> Result<OpState, OperationError> {
        if !self
            .oplog
            .update_state_if(op.id, OpState::DebitDone, OpState::CreditPending)
            .await?
        {
            return match self.oplog.get(op.id).await? {
                Some(current) => Ok(current.state),
                None => {
                    error!(operation_id = %op.id, "Operation vanished after CAS failure");
                    Err(OperationError::OperationNotFound(op.id))
                }
            };
        }

        self.issue_credit(op).await
    }

    /// CreditPending: re-issue the (idempotent) destination credit.
    async fn step_credit(&self, op: &Operation) -> Result<OpState, OperationError> {
        self.issue_credit(op).await
    }

    async fn issue_credit(&self, op: &Operation) -> Result<OpState, OperationError> {
        let to_id = op
            .to_account_id
            .ok_or_else(|| OperationError::StoreError("transfer without destination".into()))?;

        let result = self
            .gateway
            .apply_step(op.id, to_id, op.credit_delta(), StepName::Credit)
            .await;

        match result {
            StepResult::Success => {
                self.oplog
                    .update_state_if(op.id, OpState::CreditPending, OpState::Committed)
                    .await?;
                info!(
                    operation_id = %op.id,
                    from = op.account_id,
                    to = to_id,
                    debit = op.amounts.debit,
                    credit = op.amounts.credit,
                    commission = op.amounts.commission,
                    "Transfer committed"
                );
                self.finish(op, OpState::Committed, None).await;
                Ok(OpState::Committed)
            }
            StepResult::Failed(reason) => {
                // Explicit rejection after a successful debit: reverse it.
                // Compensation retries are counted from zero.
                self.oplog.reset_retry(op.id).await?;
                self.oplog
                    .update_state_with_error(
                        op.id,
                        OpState::CreditPending,
                        OpState::Compensating,
                        &reason,
                    )
                    .await?;
                warn!(
                    operation_id = %op.id,
                    reason = %reason,
                    "Credit rejected, compensating source debit"
                );
                Ok(OpState::Compensating)
            }
            // Unknown outcome MUST NOT compensate; keep re-issuing
            StepResult::Pending => Ok(OpState::CreditPending),
        }
    }

    /// Compensating: refund the original debit to the source account.
    async fn step_compensating(&self, op: &Operation) -> Result<OpState, OperationError> {
        let result = self
            .gateway
            .apply_step(op.id, op.account_id, op.reverse_delta(), StepName::Reverse)
            .await;

        match result {
            StepResult::Success => {
                self.oplog
                    .update_state_if(op.id, OpState::Compensating, OpState::Compensated)
                    .await?;
                info!(operation_id = %op.id, "Transfer compensated, source made whole");
                let reason = op.error.as_deref();
                self.finish(op, OpState::Compensated, reason).await;
                Ok(OpState::Compensated)
            }
            StepResult::Failed(reason) => {
                if op.retry_count + 1 >= self.engine.max_compensation_retries {
                    // Money is provably stuck on the source-debit side.
                    // Terminal failure, flagged for manual reconciliation.
                    self.oplog
                        .update_state_with_error(
                            op.id,
                            OpState::Compensating,
                            OpState::Failed,
                            REASON_COMPENSATION_FAILED,
                        )
                        .await?;
                    error!(
                        operation_id = %op.id,
                        account_id = op.account_id,
                        debit = op.amounts.debit,
                        reason = %reason,
                        "ALERT: compensation failed, manual reconciliation required"
                    );
                    self.finish(op, OpState::Failed, Some(REASON_COMPENSATION_FAILED))
                        .await;
                    Ok(OpState::Failed)
                } else {
                    warn!(
                        operation_id = %op.id,
                        retry = op.retry_count,
                        reason = %reason,
                        "Reversal rejected, will retry"
                    );
                    Ok(OpState::Compensating)
                }
            }
            StepResult::Pending => Ok(OpState::Compensating),
        }
    }

    /// Terminal bookkeeping: cache the result under the idempotency key
    /// and publish a best-effort completion event.
    async fn finish(&self, op: &Operation, state: OpState, reason: Option<&str>) {
        let outcome = crate::oplog::OperationOutcome {
            operation_id: op.id,
            status: state.public(),
            reason: reason.map(String::from),
        };

        if let Err(e) = self.idempotency.finalize(&op.client_key, outcome).await {
            // ResultMismatch here would mean a broken state machine
            warn!(operation_id = %op.id, error = %e, "Idempotency finalize failed");
        }

        let event = OperationEvent {
            operation_id: op.id,
            kind: op.kind,
            status: state.public(),
        };
        if let Err(e) = self
            .channel
            .publish(TOPIC_OPERATION_EVENTS, ChannelMessage::Event(event))
            .await
        {
            // Notifications are best-effort; never fail the operation
            debug!(operation_id = %op.id, error = %e, "No-op completion event: {}", e);
        }
    }
}

fn direct_reason(e: &LedgerError) -> &'static str {
    match e {
        LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
        LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
        LedgerError::VersionConflict { .. } => REASON_VERSION_CONFLICT,
        LedgerError::Overflow(_) => "OVERFLOW",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InProcessChannel;
    use crate::commission::CommissionMode;
    use crate::idempotency::MemoryIdempotencyStore;
    use crate::ledger::MemoryLedger;
    use crate::oplog::{MemoryOperationStore, PublicStatus};
    use crate::saga::gateway::MockGateway;

    struct Harness {
        coordinator: SagaCoordinator,
        ledger: Arc<MemoryLedger>,
        gateway: Arc<MockGateway>,
        idempotency: Arc<MemoryIdempotencyStore>,
    }

    impl Harness {
        fn new() -> Self {
            let mut config = AppConfig::default();
            config.engine.step_pause_ms = 1;
            config.engine.max_compensation_retries = 3;

            let oplog = Arc::new(MemoryOperationStore::new());
            let ledger = Arc::new(MemoryLedger::new());
            let gateway = Arc::new(MockGateway::new());
            let idempotency = Arc::new(MemoryIdempotencyStore::new());
            let channel = Arc::new(InProcessChannel::new(16));

            let coordinator = SagaCoordinator::new(
                oplog,
                ledger.clone(),
                gateway.clone(),
                idempotency.clone(),
                channel,
                &config,
            );
            Self {
                coordinator,
                ledger,
                gateway,
                idempotency,
            }
        }

        async fn transfer_op(&self, amount: u64, key: &str) -> Operation {
            let from = self.ledger.open_account(1, "USD".parse().unwrap()).await.unwrap();
            let to = self.ledger.open_account(2, "USD".parse().unwrap()).await.unwrap();
            // Fund the source directly
            self.ledger
                .apply_delta(from.id, OperationId::new(), StepName::Credit, 1_000, 0)
                .await
                .unwrap();

            let req = OperationRequest::transfer(
                from.id,
                to.id,
                CommissionMode::From,
                amount,
                Some(Decimal::ONE),
                Some(0),
                key,
            );
            let op = self.coordinator.prepare(&req).await.unwrap();
            self.idempotency
                .reserve(key, OperationKind::Transfer, op.id)
                .await
                .unwrap();
            self.coordinator.submit(&op).await.unwrap();
            op
        }
    }

    #[tokio::test]
    async fn test_happy_transfer_walks_all_states() {
        let h = Harness::new();
        let op = h.transfer_op(100, "tx-1").await;

        let state = h.coordinator.execute(op.id).await.unwrap();
        assert_eq!(state, OpState::Committed);

        // One debit, one credit, no reversal
        assert_eq!(h.gateway.debit_count(), 1);
        assert_eq!(h.gateway.credit_count(), 1);
        assert_eq!(h.gateway.reverse_count(), 0);
        assert_eq!(
            h.gateway.steps_for(op.id),
            vec![StepName::Debit, StepName::Credit]
        );

        // Result cached under the key
        let record = h.idempotency.get("tx-1").await.unwrap().unwrap();
        assert_eq!(record.outcome.unwrap().status, PublicStatus::Committed);
    }

    #[tokio::test]
    async fn test_credit_rejection_compensates() {
        let h = Harness::new();
        let op = h.transfer_op(100, "tx-2").await;
        h.gateway.set_fail_credit(Some("ACCOUNT_NOT_FOUND"));

        let state = h.coordinator.execute(op.id).await.unwrap();
        assert_eq!(state, OpState::Compensated);
        assert_eq!(h.gateway.reverse_count(), 1);

        let stored = h.coordinator.get(op.id).await.unwrap().unwrap();
        assert_eq!(stored.state, OpState::Compensated);
        assert_eq!(stored.error.as_deref(), Some("ACCOUNT_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_exhausted_compensation_fails_with_alert_reason() {
        let h = Harness::new();
        let op = h.transfer_op(100, "tx-3").await;
        h.gateway.set_fail_credit(Some("ACCOUNT_NOT_FOUND"));
        h.gateway.set_fail_reverse(Some("ACCOUNT_FROZEN"));

        let state = h.coordinator.execute(op.id).await.unwrap();
        assert_eq!(state, OpState::Failed);

        let stored = h.coordinator.get(op.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some(REASON_COMPENSATION_FAILED));
        // Bounded: exactly max_compensation_retries reversal attempts
        assert_eq!(h.gateway.reverse_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_credit_outcome_never_compensates() {
        let h = Harness::new();
        let op = h.transfer_op(100, "tx-4").await;
        h.gateway.set_pending_credit(true);

        // Step past the debit, then attempt credits a few times
        for _ in 0..5 {
            h.coordinator.step(op.id).await.unwrap();
        }
        let stored = h.coordinator.get(op.id).await.unwrap().unwrap();
        assert_eq!(stored.state, OpState::CreditPending);
        assert_eq!(h.gateway.reverse_count(), 0);

        // Outcome resolves: transfer commits on the next step
        h.gateway.set_pending_credit(false);
        let state = h.coordinator.execute(op.id).await.unwrap();
        assert_eq!(state, OpState::Committed);
    }

    #[tokio::test]
    async fn test_direct_deposit_and_withdraw() {
        let h = Harness::new();
        let account = h.ledger.open_account(1, "USD".parse().unwrap()).await.unwrap();

        let req = OperationRequest::deposit(account.id, 200, "dep-1");
        let op = h.coordinator.prepare(&req).await.unwrap();
        h.idempotency
            .reserve("dep-1", OperationKind::Deposit, op.id)
            .await
            .unwrap();
        h.coordinator.submit(&op).await.unwrap();
        assert_eq!(h.coordinator.execute(op.id).await.unwrap(), OpState::Committed);
        assert_eq!(h.ledger.get(account.id).await.unwrap().unwrap().balance, 200);

        let req = OperationRequest::withdrawal(account.id, 50, "wd-1");
        let op = h.coordinator.prepare(&req).await.unwrap();
        h.idempotency
            .reserve("wd-1", OperationKind::Withdraw, op.id)
            .await
            .unwrap();
        h.coordinator.submit(&op).await.unwrap();
        assert_eq!(h.coordinator.execute(op.id).await.unwrap(), OpState::Committed);
        assert_eq!(h.ledger.get(account.id).await.unwrap().unwrap().balance, 150);

        // Overdraft fails terminally, no compensation involved
        let req = OperationRequest::withdrawal(account.id, 500, "wd-2");
        let op = h.coordinator.prepare(&req).await.unwrap();
        h.idempotency
            .reserve("wd-2", OperationKind::Withdraw, op.id)
            .await
            .unwrap();
        h.coordinator.submit(&op).await.unwrap();
        assert_eq!(h.coordinator.execute(op.id).await.unwrap(), OpState::Failed);
        let stored = h.coordinator.get(op.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("INSUFFICIENT_FUNDS"));
        assert_eq!(h.ledger.get(account.id).await.unwrap().unwrap().balance, 150);
    }

    #[tokio::test]
    async fn test_direct_replay_after_crash_commits_without_reapply() {
        let h = Harness::new();
        let account = h.ledger.open_account(1, "USD".parse().unwrap()).await.unwrap();

        let req = OperationRequest::deposit(account.id, 100, "dep-crash");
        let op = h.coordinator.prepare(&req).await.unwrap();
        h.idempotency
            .reserve("dep-crash", OperationKind::Deposit, op.id)
            .await
            .unwrap();
        h.coordinator.submit(&op).await.unwrap();

        // Simulate a crash after the apply but before the log commit:
        // the ledger entry exists, the operation is still Pending
        h.ledger
            .apply_delta(account.id, op.id, StepName::Credit, 100, 0)
            .await
            .unwrap();

        let state = h.coordinator.step(op.id).await.unwrap();
        assert_eq!(state, OpState::Committed);
        // Applied exactly once
        assert_eq!(h.ledger.get(account.id).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_prepare_validation() {
        let h = Harness::new();
        let a = h.ledger.open_account(1, "USD".parse().unwrap()).await.unwrap();
        let b = h.ledger.open_account(2, "EUR".parse().unwrap()).await.unwrap();

        let err = h
            .coordinator
            .prepare(&OperationRequest::deposit(a.id, 0, "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidAmount));

        let err = h
            .coordinator
            .prepare(&OperationRequest::deposit(999, 10, "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::AccountNotFound(999)));

        let err = h
            .coordinator
            .prepare(&OperationRequest::deposit(a.id, 10, "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::EmptyClientKey));

        let err = h
            .coordinator
            .prepare(&OperationRequest::transfer(
                a.id,
                a.id,
                CommissionMode::From,
                10,
                None,
                None,
                "k",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::SameAccount));

        let err = h
            .coordinator
            .prepare(&OperationRequest::transfer(
                a.id,
                b.id,
                CommissionMode::From,
                10,
                None,
                None,
                "k",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::CurrencyMismatch { .. }));
    }
}
