//! Operation error taxonomy.
//!
//! Only terminal classifications are ever reported to callers; transient
//! conditions (version conflicts, channel outages) are retried inside
//! the component that owns the retry and surface here only when
//! exhausted, as the operation's terminal reason code.

use thiserror::Error;

use crate::commission::CommissionError;
use crate::core_types::{AccountId, Currency, OperationId};
use crate::idempotency::IdempotencyError;
use crate::ledger::LedgerError;
use crate::oplog::OplogError;

#[derive(Debug, Error, Clone)]
pub enum OperationError {
    // === Validation (rejected before any Operation is created) ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount is too large")]
    AmountTooLarge,

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Currency mismatch: {from} -> {to}")]
    CurrencyMismatch { from: Currency, to: Currency },

    #[error("Invalid commission parameters: {0}")]
    InvalidCommission(#[from] CommissionError),

    #[error("Client key must not be empty")]
    EmptyClientKey,

    #[error("Client key reused for a different operation kind")]
    ClientKeyKindMismatch,

    // === Execution ===
    #[error("Insufficient funds on account {0}")]
    InsufficientFunds(AccountId),

    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    // === System ===
    #[error("Store error: {0}")]
    StoreError(String),
}

impl OperationError {
    /// Stable reason code recorded on failed operations and returned to
    /// callers.
    pub fn code(&self) -> &'static str {
        match self {
            OperationError::InvalidAmount => "INVALID_AMOUNT",
            OperationError::AmountTooLarge => "AMOUNT_TOO_LARGE",
            OperationError::SameAccount => "SAME_ACCOUNT",
            OperationError::InvalidCurrency(_) => "INVALID_CURRENCY",
            OperationError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            OperationError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            OperationError::InvalidCommission(_) => "INVALID_COMMISSION",
            OperationError::EmptyClientKey => "EMPTY_CLIENT_KEY",
            OperationError::ClientKeyKindMismatch => "CLIENT_KEY_KIND_MISMATCH",
            OperationError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            OperationError::OperationNotFound(_) => "OPERATION_NOT_FOUND",
            OperationError::StoreError(_) => "STORE_ERROR",
        }
    }

    /// Whether this error belongs to the pre-creation validation class.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OperationError::InvalidAmount
                | OperationError::AmountTooLarge
                | OperationError::SameAccount
                | OperationError::InvalidCurrency(_)
                | OperationError::AccountNotFound(_)
                | OperationError::CurrencyMismatch { .. }
                | OperationError::InvalidCommission(_)
                | OperationError::EmptyClientKey
                | OperationError::ClientKeyKindMismatch
        )
    }
}

impl From<OplogError> for OperationError {
    fn from(e: OplogError) -> Self {
        match e {
            OplogError::NotFound(id) => OperationError::OperationNotFound(id),
            other => OperationError::StoreError(other.to_string()),
        }
    }
}

impl From<LedgerError> for OperationError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountNotFound(id) => OperationError::AccountNotFound(id),
            LedgerError::InsufficientFunds { account_id, .. } => {
                OperationError::InsufficientFunds(account_id)
            }
            other => OperationError::StoreError(other.to_string()),
        }
    }
}

impl From<IdempotencyError> for OperationError {
    fn from(e: IdempotencyError) -> Self {
        match e {
            IdempotencyError::KindMismatch { .. } => OperationError::ClientKeyKindMismatch,
            other => OperationError::StoreError(other.to_string()),
        }
    }
}

/// Reason code recorded when compensation could not complete and money
/// is provably stuck on the source-debit side. The one case that must
/// raise an operational alert, never just a failed API response.
pub const REASON_COMPENSATION_FAILED: &str = "COMPENSATION_FAILED";

/// Reason recorded when a leg fails after exhausting optimistic retries.
pub const REASON_VERSION_CONFLICT: &str = "VERSION_CONFLICT";
