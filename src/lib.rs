//! Payflow - Idempotent Balance Mutation & Transfer Orchestration
//!
//! Exactly-once-effect money movement over at-least-once delivery.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (AccountId, OperationId, Currency)
//! - [`config`] - YAML-backed application configuration
//! - [`logging`] - Structured logging setup (tracing)
//! - [`commission`] - Commission math and from/to split modes
//! - [`ledger`] - Accounts, versioned balances, append-only entries
//! - [`oplog`] - Operation records and the CAS state machine log
//! - [`idempotency`] - Client-key reservation and result replay
//! - [`channel`] - At-least-once message channel (commands, acks, events)
//! - [`saga`] - Coordinator, ledger gateway/worker, recovery
//! - [`service`] - The caller-facing surface

// Core types - must be first!
pub mod core_types;

pub mod channel;
pub mod commission;
pub mod config;
pub mod idempotency;
pub mod ledger;
pub mod logging;
pub mod oplog;
pub mod saga;
pub mod service;

// Convenient re-exports at crate root
pub use commission::{CommissionMode, TransferAmounts};
pub use config::AppConfig;
pub use core_types::{AccountId, Amount, Currency, Delta, OperationId, UserId, Version};
pub use idempotency::{IdempotencyStore, MemoryIdempotencyStore, Reservation};
pub use ledger::{Account, AccountStore, LedgerEntry, MemoryLedger, StepName};
pub use oplog::{
    MemoryOperationStore, OpState, Operation, OperationKind, OperationOutcome, OperationRequest,
    OperationStore, PublicStatus,
};
pub use saga::{
    ChannelGateway, LedgerWorker, OperationError, RecoveryWorker, SagaCoordinator, StepResult,
};
pub use service::{PayflowService, SubmitResult};

pub use channel::{InProcessChannel, MessageChannel};
