//! Ledger command worker
//!
//! Account-side consumer of the commands topic. Every invocation may be
//! a duplicate: before applying, the worker checks whether the
//! `(operation_id, step)` pair already wrote a ledger entry and, if so,
//! re-acks the recorded result instead of touching the balance. The
//! channel is never trusted for exactly-once delivery.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{
    ChannelMessage, LedgerCommand, MessageChannel, StepAck, StepOutcome, TOPIC_LEDGER_ACKS,
    TOPIC_LEDGER_COMMANDS,
};
use crate::config::EngineConfig;
use crate::ledger::{AccountStore, LedgerError, apply_with_retry};

pub struct LedgerWorker {
    channel: Arc<dyn MessageChannel>,
    ledger: Arc<dyn AccountStore>,
    engine: EngineConfig,
}

impl LedgerWorker {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        ledger: Arc<dyn AccountStore>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            channel,
            ledger,
            engine,
        }
    }

    /// Subscribe to the commands topic and process until the channel
    /// closes.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut commands = self.channel.subscribe(TOPIC_LEDGER_COMMANDS);
        tokio::spawn(async move {
            info!("Ledger worker started");
            loop {
                match commands.recv().await {
                    Ok(ChannelMessage::Command(cmd)) => {
                        let ack = self.handle(&cmd).await;
                        if let Err(e) = self
                            .channel
                            .publish(TOPIC_LEDGER_ACKS, ChannelMessage::Ack(ack))
                            .await
                        {
                            // The orchestrator will re-issue the command;
                            // dedup makes the replay harmless
                            warn!(operation_id = %cmd.operation_id, error = %e, "Ack publish failed");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed = missed, "Command subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Command topic closed, ledger worker stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Process one command, deduplicating redeliveries.
    async fn handle(&self, cmd: &LedgerCommand) -> StepAck {
        // Dedup: a redelivered command re-acks the original result
        match self.ledger.find_entry(cmd.operation_id, cmd.step).await {
            Ok(Some(entry)) => {
                debug!(
                    operation_id = %cmd.operation_id,
                    step = %cmd.step,
                    "Duplicate command, re-acking recorded entry"
                );
                return StepAck {
                    operation_id: cmd.operation_id,
                    step: cmd.step,
                    outcome: StepOutcome::Applied {
                        balance: entry.balance_after,
                        version: entry.version,
                    },
                };
            }
            Ok(None) => {}
            Err(e) => {
                error!(operation_id = %cmd.operation_id, error = %e, "Dedup lookup failed");
                return StepAck {
                    operation_id: cmd.operation_id,
                    step: cmd.step,
                    outcome: StepOutcome::Rejected {
                        reason: format!("STORE_ERROR: {}", e),
                    },
                };
            }
        }

        let result = apply_with_retry(
            self.ledger.as_ref(),
            cmd.account_id,
            cmd.operation_id,
            cmd.step,
            cmd.delta,
            self.engine.max_version_retries,
            self.engine.version_retry_backoff_ms,
        )
        .await;

        let outcome = match result {
            Ok(applied) => {
                debug!(
                    operation_id = %cmd.operation_id,
                    step = %cmd.step,
                    account_id = cmd.account_id,
                    delta = cmd.delta,
                    balance = applied.new_balance,
                    "Step applied"
                );
                StepOutcome::Applied {
                    balance: applied.new_balance,
                    version: applied.new_version,
                }
            }
            Err(e) => {
                let reason = match &e {
                    LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS".to_string(),
                    LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND".to_string(),
                    LedgerError::VersionConflict { .. } => {
                        // Bounded retries exhausted; explicit reject so the
                        // orchestrator can decide (fail or compensate)
                        crate::saga::error::REASON_VERSION_CONFLICT.to_string()
                    }
                    LedgerError::Overflow(_) => "OVERFLOW".to_string(),
                };
                warn!(
                    operation_id = %cmd.operation_id,
                    step = %cmd.step,
                    reason = %reason,
                    "Step rejected"
                );
                StepOutcome::Rejected { reason }
            }
        };

        StepAck {
            operation_id: cmd.operation_id,
            step: cmd.step,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InProcessChannel;
    use crate::core_types::OperationId;
    use crate::ledger::{MemoryLedger, StepName};

    async fn harness() -> (Arc<InProcessChannel>, Arc<MemoryLedger>) {
        let channel = Arc::new(InProcessChannel::new(64));
        let ledger = Arc::new(MemoryLedger::new());
        let worker = LedgerWorker::new(
            channel.clone(),
            ledger.clone(),
            EngineConfig::default(),
        );
        worker.spawn();
        (channel, ledger)
    }

    #[tokio::test]
    async fn test_worker_applies_and_acks() {
        let (channel, ledger) = harness().await;
        let account = ledger.open_account(1, "USD".parse().unwrap()).await.unwrap();
        let mut acks = channel.subscribe(TOPIC_LEDGER_ACKS);

        let cmd = LedgerCommand {
            operation_id: OperationId::new(),
            account_id: account.id,
            delta: 150,
            step: StepName::Credit,
        };
        channel
            .publish(TOPIC_LEDGER_COMMANDS, ChannelMessage::Command(cmd.clone()))
            .await
            .unwrap();

        let ack = loop {
            if let ChannelMessage::Ack(a) = acks.recv().await.unwrap() {
                break a;
            }
        };
        assert_eq!(ack.operation_id, cmd.operation_id);
        assert_eq!(
            ack.outcome,
            StepOutcome::Applied {
                balance: 150,
                version: 1
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_command_has_single_effect() {
        let (channel, ledger) = harness().await;
        let account = ledger.open_account(1, "USD".parse().unwrap()).await.unwrap();
        let mut acks = channel.subscribe(TOPIC_LEDGER_ACKS);

        let cmd = LedgerCommand {
            operation_id: OperationId::new(),
            account_id: account.id,
            delta: 100,
            step: StepName::Credit,
        };
        // Same command delivered twice
        for _ in 0..2 {
            channel
                .publish(TOPIC_LEDGER_COMMANDS, ChannelMessage::Command(cmd.clone()))
                .await
                .unwrap();
        }

        let mut applied_acks = 0;
        for _ in 0..2 {
            if let ChannelMessage::Ack(ack) = acks.recv().await.unwrap() {
                assert_eq!(
                    ack.outcome,
                    StepOutcome::Applied {
                        balance: 100,
                        version: 1
                    }
                );
                applied_acks += 1;
            }
        }
        assert_eq!(applied_acks, 2);

        // Applied exactly once
        let read = ledger.get(account.id).await.unwrap().unwrap();
        assert_eq!(read.balance, 100);
        assert_eq!(read.version, 1);
        assert_eq!(ledger.entries(account.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_rejects_insufficient_funds() {
        let (channel, ledger) = harness().await;
        let account = ledger.open_account(1, "USD".parse().unwrap()).await.unwrap();
        let mut acks = channel.subscribe(TOPIC_LEDGER_ACKS);

        let cmd = LedgerCommand {
            operation_id: OperationId::new(),
            account_id: account.id,
            delta: -100,
            step: StepName::Debit,
        };
        channel
            .publish(TOPIC_LEDGER_COMMANDS, ChannelMessage::Command(cmd))
            .await
            .unwrap();

        let ack = loop {
            if let ChannelMessage::Ack(a) = acks.recv().await.unwrap() {
                break a;
            }
        };
        assert_eq!(
            ack.outcome,
            StepOutcome::Rejected {
                reason: "INSUFFICIENT_FUNDS".to_string()
            }
        );
        // No mutation
        assert_eq!(ledger.get(account.id).await.unwrap().unwrap().balance, 0);
    }
}
