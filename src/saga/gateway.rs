//! Ledger gateway
//!
//! The coordinator's view of the account-owning side. A step crosses a
//! service boundary, so its result is three-way: success, explicit
//! failure, or unknown. Unknown (timeout, transport outage) must never
//! be treated as failure - the step is simply re-issued, and receivers
//! deduplicate by `(operation_id, step)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::channel::{
    ChannelMessage, LedgerCommand, MessageChannel, StepAck, StepOutcome, TOPIC_LEDGER_ACKS,
    TOPIC_LEDGER_COMMANDS,
};
use crate::config::{ChannelConfig, EngineConfig};
use crate::core_types::{AccountId, Delta, OperationId};
use crate::ledger::StepName;

/// Step result from the account-owning side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Step applied (possibly earlier - duplicates report success too)
    Success,
    /// Step explicitly rejected; safe to fail or compensate
    Failed(String),
    /// Outcome unknown (timeout, channel down) - must retry, MUST NOT
    /// compensate
    Pending,
}

impl StepResult {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success)
    }

    /// Explicit failure - the only result that may trigger compensation
    #[inline]
    pub fn is_explicit_fail(&self) -> bool {
        matches!(self, StepResult::Failed(_))
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, StepResult::Pending)
    }
}

/// Boundary between the coordinator and whoever owns the account
/// balances.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Issue one idempotent balance-mutation step and wait for its
    /// outcome.
    async fn apply_step(
        &self,
        operation_id: OperationId,
        account_id: AccountId,
        delta: Delta,
        step: StepName,
    ) -> StepResult;
}

/// [`LedgerGateway`] over the message channel: publishes a
/// [`LedgerCommand`] and awaits the matching [`StepAck`].
///
/// Publication is retried with exponential backoff while the channel is
/// unavailable; an ack that does not arrive within the timeout yields
/// `Pending` (the command may or may not have been applied - redelivery
/// is safe either way).
pub struct ChannelGateway {
    channel: Arc<dyn MessageChannel>,
    waiting: Arc<DashMap<(OperationId, StepName), oneshot::Sender<StepAck>>>,
    ack_timeout: Duration,
    max_publish_retries: u32,
    publish_backoff: Duration,
}

impl ChannelGateway {
    /// Create the gateway and spawn its ack dispatcher task.
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        engine: &EngineConfig,
        channel_cfg: &ChannelConfig,
    ) -> Arc<Self> {
        let gateway = Arc::new(Self {
            channel: channel.clone(),
            waiting: Arc::new(DashMap::new()),
            ack_timeout: Duration::from_millis(channel_cfg.ack_timeout_ms),
            max_publish_retries: engine.max_publish_retries,
            publish_backoff: Duration::from_millis(engine.publish_backoff_ms),
        });

        let waiting = gateway.waiting.clone();
        let mut acks = channel.subscribe(TOPIC_LEDGER_ACKS);
        tokio::spawn(async move {
            loop {
                match acks.recv().await {
                    Ok(ChannelMessage::Ack(ack)) => {
                        if let Some((_, tx)) = waiting.remove(&(ack.operation_id, ack.step)) {
                            // Receiver may be gone (timed out); duplicate
                            // acks land here too and are dropped
                            let _ = tx.send(ack);
                        } else {
                            debug!(
                                operation_id = %ack.operation_id,
                                step = %ack.step,
                                "Ack with no waiter (duplicate or late)"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed = missed, "Ack subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        gateway
    }
}

#[async_trait]
impl LedgerGateway for ChannelGateway {
    async fn apply_step(
        &self,
        operation_id: OperationId,
        account_id: AccountId,
        delta: Delta,
        step: StepName,
    ) -> StepResult {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert((operation_id, step), tx);

        let command = LedgerCommand {
            operation_id,
            account_id,
            delta,
            step,
        };

        // Bounded publish retries with exponential backoff; the channel
        // being down keeps the operation pending, never fails it.
        let mut published = false;
        let mut backoff = self.publish_backoff;
        for attempt in 0..=self.max_publish_retries {
            match self
                .channel
                .publish(
                    TOPIC_LEDGER_COMMANDS,
                    ChannelMessage::Command(command.clone()),
                )
                .await
            {
                Ok(()) => {
                    published = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        operation_id = %operation_id,
                        step = %step,
                        attempt = attempt,
                        error = %e,
                        "Command publish failed"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        if !published {
            self.waiting.remove(&(operation_id, step));
            return StepResult::Pending;
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(ack)) => match ack.outcome {
                StepOutcome::Applied { .. } => StepResult::Success,
                StepOutcome::Rejected { reason } => StepResult::Failed(reason),
            },
            // Dispatcher dropped the sender or we timed out: outcome unknown
            _ => {
                self.waiting.remove(&(operation_id, step));
                StepResult::Pending
            }
        }
    }
}


#[cfg(test)]
pub use mock::MockGateway;
