//! Account Ledger
//!
//! Durable per-account balances with optimistic versioning plus an
//! append-only audit trail. The conditional `apply_delta` is the single
//! serialization point in the system: two mutators racing on one
//! account lose on the version check and retry, never corrupt state.
//!
//! Every successful apply writes the balance change and its
//! `LedgerEntry` in one atomic unit - the two are never observed
//! independently. Entries are keyed by `(operation_id, step)` so
//! command receivers can deduplicate redelivered messages and
//! compensation can replay the exact original debit.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core_types::{AccountId, Amount, Currency, Delta, OperationId, UserId, Version};

/// A saga step name, part of the dedup key on ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepName {
    /// Debit the source account (also used for direct withdrawals)
    Debit,
    /// Credit the destination account (also used for direct deposits)
    Credit,
    /// Compensating credit back to the source account
    Reverse,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Debit => "DEBIT",
            StepName::Credit => "CREDIT",
            StepName::Reverse => "REVERSE",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A currency-denominated account with an optimistic concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub currency: Currency,
    /// Balance in minor units; non-negative by type
    pub balance: Amount,
    /// Bumped on every successful mutation
    pub version: Version,
}

/// Append-only audit record of one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub operation_id: OperationId,
    pub step: StepName,
    pub account_id: AccountId,
    pub delta: Delta,
    pub balance_after: Amount,
    /// Account version stamped by this mutation
    pub version: Version,
    /// Entry timestamp (millis)
    pub at: i64,
}

/// Result of a successful conditional apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaApplied {
    pub new_balance: Amount,
    pub new_version: Version,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Version conflict on account {account_id}: expected {expected}, actual {actual}")]
    VersionConflict {
        account_id: AccountId,
        expected: Version,
        actual: Version,
    },

    #[error("Insufficient funds on account {account_id}: need {need}, have {have}")]
    InsufficientFunds {
        account_id: AccountId,
        need: Amount,
        have: Amount,
    },

    #[error("Balance overflow on account {0}")]
    Overflow(AccountId),
}

/// Contract of the account-owning store.
///
/// Any durable backend with atomic single-record conditional writes can
/// implement this; [`MemoryLedger`] is the in-process implementation.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Open a new zero-balance account for a user.
    async fn open_account(&self, user_id: UserId, currency: Currency)
    -> Result<Account, LedgerError>;

    /// Read an account's current state (balance + version token).
    async fn get(&self, account_id: AccountId) -> Result<Option<Account>, LedgerError>;

    /// Conditionally apply a balance change.
    ///
    /// Fails with `VersionConflict` if the account was mutated since the
    /// caller read `expected_version`, with `InsufficientFunds` if a
    /// negative delta would take the balance below zero. On success the
    /// matching [`LedgerEntry`] is persisted in the same atomic unit.
    async fn apply_delta(
        &self,
        account_id: AccountId,
        operation_id: OperationId,
        step: StepName,
        delta: Delta,
        expected_version: Version,
    ) -> Result<DeltaApplied, LedgerError>;

    /// Look up the entry a given operation step already wrote, if any.
    /// This is the receiver-side dedup primitive.
    async fn find_entry(
        &self,
        operation_id: OperationId,
        step: StepName,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Audit trail for one account, in apply order.
    async fn entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// Apply a delta with bounded optimistic retry.
///
/// Re-reads the account version on every `VersionConflict`, up to
/// `max_retries` attempts with linear backoff. All other errors are
/// returned immediately.
pub async fn apply_with_retry(
    store: &dyn AccountStore,
    account_id: AccountId,
    operation_id: OperationId,
    step: StepName,
    delta: Delta,
    max_retries: u32,
    backoff_ms: u64,
) -> Result<DeltaApplied, LedgerError> {
    let mut attempt = 0;
    loop {
        let account = store
            .get(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        match store
            .apply_delta(account_id, operation_id, step, delta, account.version)
            .await
        {
            Err(LedgerError::VersionConflict { .. }) if attempt < max_retries => {
                attempt += 1;
                debug!(
                    account_id = account_id,
                    operation_id = %operation_id,
                    attempt = attempt,
                    "Version conflict, retrying apply"
                );
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms * attempt as u64))
                    .await;
            }
            other => return other,
        }
    }
}

/// In-memory [`AccountStore`].
///
/// Per-account atomicity comes from the dashmap entry lock; the entry
/// append happens while the account entry is still held, so balance and
/// audit record commit together.
pub struct MemoryLedger {
    accounts: DashMap<AccountId, Account>,
    entries: Mutex<Vec<LedgerEntry>>,
    next_id: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Total of all entry deltas; for a closed set of transfers the
    /// negation is what the system retained in commissions.
    pub fn net_delta(&self) -> i64 {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.delta)
            .sum()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryLedger {
    async fn open_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let account = Account {
            id,
            user_id,
            currency,
            balance: 0,
            version: 0,
        };
        self.accounts.insert(id, account.clone());
        debug!(account_id = id, user_id = user_id, currency = %currency, "Account opened");
        Ok(account)
    }

    async fn get(&self, account_id: AccountId) -> Result<Option<Account>, LedgerError> {
        Ok(self.accounts.get(&account_id).map(|a| a.clone()))
    }

    async fn apply_delta(
        &self,
        account_id: AccountId,
        operation_id: OperationId,
        step: StepName,
        delta: Delta,
        expected_version: Version,
    ) -> Result<DeltaApplied, LedgerError> {
        let mut account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        if account.version != expected_version {
            return Err(LedgerError::VersionConflict {
                account_id,
                expected: expected_version,
                actual: account.version,
            });
        }

        let new_balance = if delta < 0 {
            let need = delta.unsigned_abs();
            account
                .balance
                .checked_sub(need)
                .ok_or(LedgerError::InsufficientFunds {
                    account_id,
                    need,
                    have: account.balance,
                })?
        } else {
            account
                .balance
                .checked_add(delta as u64)
                .ok_or(LedgerError::Overflow(account_id))?
        };

        let new_version = account.version + 1;
        let entry = LedgerEntry {
            operation_id,
            step,
            account_id,
            delta,
            balance_after: new_balance,
            version: new_version,
            at: chrono::Utc::now().timestamp_millis(),
        };

        // Entry append while the account entry lock is held: balance and
        // audit record are observed together or not at all.
        self.entries.lock().unwrap().push(entry);
        account.balance = new_balance;
        account.version = new_version;

        Ok(DeltaApplied {
            new_balance,
            new_version,
        })
    }

    async fn find_entry(
        &self,
        operation_id: OperationId,
        step: StepName,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.operation_id == operation_id && e.step == step)
            .cloned())
    }

    async fn entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }
}
