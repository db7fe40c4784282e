//! Message Channel
//!
//! Abstract at-least-once command/event transport between the saga
//! coordinator and the account-owning side. The contract deliberately
//! promises little: messages may be delivered more than once and
//! delayed arbitrarily; order is only preserved within a topic. Every
//! consumer is written to be safely repeatable.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::core_types::{AccountId, Amount, Delta, OperationId, Version};
use crate::ledger::StepName;
use crate::oplog::{OperationKind, PublicStatus};

/// Debit/credit commands from the orchestrator to account owners
pub const TOPIC_LEDGER_COMMANDS: &str = "ledger.commands";
/// Step acknowledgments back to the orchestrator
pub const TOPIC_LEDGER_ACKS: &str = "ledger.acks";
/// Best-effort completion notifications
pub const TOPIC_OPERATION_EVENTS: &str = "operation.events";

/// One idempotent balance-mutation command. Redelivery of the same
/// `(operation_id, step)` pair must have no additional effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCommand {
    pub operation_id: OperationId,
    pub account_id: AccountId,
    pub delta: Delta,
    pub step: StepName,
}

/// Result of one applied (or rejected) step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Applied { balance: Amount, version: Version },
    Rejected { reason: String },
}

/// Acknowledgment event for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAck {
    pub operation_id: OperationId,
    pub step: StepName,
    pub outcome: StepOutcome,
}

/// Published when an operation reaches a terminal state. Best-effort:
/// consumers (notifications) must tolerate gaps and duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub status: PublicStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMessage {
    Command(LedgerCommand),
    Ack(StepAck),
    Event(OperationEvent),
}

impl fmt::Display for ChannelMessage {
    // JSON form, used in debug logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum ChannelError {
    /// Transient: the transport cannot accept the message right now.
    /// The operation stays pending and publication is retried.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish `message` to `topic`. May deliver more than once.
    async fn publish(&self, topic: &str, message: ChannelMessage) -> Result<(), ChannelError>;

    /// Subscribe to a topic. Slow consumers may observe a lag error and
    /// must treat missed messages as lost (commands are re-driven by
    /// recovery, never by the channel).
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<ChannelMessage>;
}

/// In-process [`MessageChannel`] on tokio broadcast channels, one per
/// topic. `set_duplicate_delivery(true)` makes every publish deliver
/// twice, which is how tests exercise at-least-once tolerance.
pub struct InProcessChannel {
    topics: DashMap<String, broadcast::Sender<ChannelMessage>>,
    capacity: usize,
    duplicate_delivery: AtomicBool,
}

impl InProcessChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
            duplicate_delivery: AtomicBool::new(false),
        }
    }

    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.duplicate_delivery.store(enabled, Ordering::SeqCst);
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<ChannelMessage> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl MessageChannel for InProcessChannel {
    async fn publish(&self, topic: &str, message: ChannelMessage) -> Result<(), ChannelError> {
        let sender = self.sender(topic);
        debug!(topic = topic, message = %message, "publish");
        sender
            .send(message.clone())
            .map_err(|_| ChannelError::Unavailable(format!("No subscribers on {}", topic)))?;
        if self.duplicate_delivery.load(Ordering::SeqCst) {
            // Deliberate redelivery; consumers must dedup
            let _ = sender.send(message);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<ChannelMessage> {
        self.sender(topic).subscribe()
    }
}
