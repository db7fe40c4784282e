//! Transfer orchestration.
//!
//! The saga layer sits between the service surface and the ledger:
//! [`coordinator::SagaCoordinator`] drives the per-operation state
//! machine, [`gateway::LedgerGateway`] abstracts how ledger steps
//! reach the account side (in-process channel by default), and
//! [`recovery::RecoveryWorker`] re-drives anything a crash left
//! behind.

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod recovery;
pub mod worker;


pub use coordinator::SagaCoordinator;
pub use error::{OperationError, REASON_COMPENSATION_FAILED, REASON_VERSION_CONFLICT};
pub use gateway::{ChannelGateway, LedgerGateway, StepResult};
pub use recovery::RecoveryWorker;
pub use worker::LedgerWorker;
