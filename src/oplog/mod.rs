//! Operation Log
//!
//! Durable record of every accepted operation with a per-operation
//! state machine:
//!
//! ```text
//! PENDING → DEBIT_PENDING → DEBIT_DONE → CREDIT_PENDING → COMMITTED
//!      ↓                                      ↓
//!   FAILED                            COMPENSATING → COMPENSATED
//!                                             ↓
//!                                          FAILED (manual reconciliation)
//! ```
//!
//! Deposits and withdrawals skip the leg states and go straight from
//! PENDING to a terminal state.

pub mod state;
pub mod store;
pub mod types;

pub use state::{OpState, PublicStatus};
pub use store::{MemoryOperationStore, OperationStore, OplogError};
pub use types::{Operation, OperationKind, OperationOutcome, OperationRequest};
