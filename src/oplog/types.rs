//! Operation Log record types.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::{OpState, PublicStatus};
use crate::commission::{CommissionMode, TransferAmounts};
use crate::core_types::{AccountId, Amount, Delta, OperationId};

/// Kind of a client-submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit = 1,
    Withdraw = 2,
    Transfer = 3,
}

impl OperationKind {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(OperationKind::Deposit),
            2 => Some(OperationKind::Withdraw),
            3 => Some(OperationKind::Transfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client-submitted operation request, validated before any record is
/// created.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    /// Account being mutated; the debit side for transfers
    pub account_id: AccountId,
    /// Credit side for transfers
    pub to_account_id: Option<AccountId>,
    /// Requested amount in minor units; its meaning for transfers
    /// depends on `mode`
    pub amount: Amount,
    pub mode: Option<CommissionMode>,
    pub commission_percent: Option<Decimal>,
    pub commission_fixed: Option<Amount>,
    /// Caller-chosen idempotency key
    pub client_key: String,
}

impl OperationRequest {
    pub fn deposit(account_id: AccountId, amount: Amount, client_key: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Deposit,
            account_id,
            to_account_id: None,
            amount,
            mode: None,
            commission_percent: None,
            commission_fixed: None,
            client_key: client_key.into(),
        }
    }

    pub fn withdrawal(
        account_id: AccountId,
        amount: Amount,
        client_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: OperationKind::Withdraw,
            account_id,
            to_account_id: None,
            amount,
            mode: None,
            commission_percent: None,
            commission_fixed: None,
            client_key: client_key.into(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        from_account_id: AccountId,
        to_account_id: AccountId,
        mode: CommissionMode,
        amount: Amount,
        commission_percent: Option<Decimal>,
        commission_fixed: Option<Amount>,
        client_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: OperationKind::Transfer,
            account_id: from_account_id,
            to_account_id: Some(to_account_id),
            amount,
            mode: Some(mode),
            commission_percent,
            commission_fixed,
            client_key: client_key.into(),
        }
    }
}

/// Durable record of one accepted operation.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub client_key: String,
    /// Account being mutated; debit side for transfers
    pub account_id: AccountId,
    /// Credit side for transfers
    pub to_account_id: Option<AccountId>,
    /// Requested amount as submitted by the caller
    pub amount: Amount,
    pub mode: Option<CommissionMode>,
    pub commission_percent: Decimal,
    pub commission_fixed: Amount,
    /// Computed money movement. For deposits/withdrawals debit == credit
    /// == amount and commission is zero.
    pub amounts: TransferAmounts,
    pub state: OpState,
    /// Last error reason code (for debugging and caller reporting)
    pub error: Option<String>,
    pub retry_count: u32,
    /// Created timestamp (millis)
    pub created_at: i64,
    /// Last updated timestamp (millis); terminal timestamp once terminal
    pub updated_at: i64,
}

impl Operation {
    pub fn new(
        id: OperationId,
        req: &OperationRequest,
        commission_percent: Decimal,
        commission_fixed: Amount,
        amounts: TransferAmounts,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id,
            kind: req.kind,
            client_key: req.client_key.clone(),
            account_id: req.account_id,
            to_account_id: req.to_account_id,
            amount: req.amount,
            mode: req.mode,
            commission_percent,
            commission_fixed,
            amounts,
            state: OpState::Pending,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Signed delta for the source debit leg
    pub fn debit_delta(&self) -> Delta {
        -(self.amounts.debit as Delta)
    }

    /// Signed delta for the destination credit leg
    pub fn credit_delta(&self) -> Delta {
        self.amounts.credit as Delta
    }

    /// Signed delta for the compensating refund (reverses the debit)
    pub fn reverse_delta(&self) -> Delta {
        self.amounts.debit as Delta
    }

    /// Caller-visible outcome snapshot
    pub fn outcome(&self) -> OperationOutcome {
        OperationOutcome {
            operation_id: self.id,
            status: self.state.public(),
            reason: self.error.clone(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Operation[{}] {} account={} amount={} state={}",
            self.id, self.kind, self.account_id, self.amount, self.state
        )
    }
}

/// Snapshot of an operation's caller-visible status, cached by the
/// idempotency store once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub operation_id: OperationId,
    pub status: PublicStatus,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            OperationKind::Deposit,
            OperationKind::Withdraw,
            OperationKind::Transfer,
        ] {
            assert_eq!(OperationKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(OperationKind::from_id(0), None);
        assert_eq!(OperationKind::Transfer.as_str(), "transfer");
    }

    #[test]
    fn test_operation_deltas() {
        let req = OperationRequest::transfer(
            1,
            2,
            CommissionMode::From,
            100,
            None,
            None,
            "tx-1",
        );
        let amounts = TransferAmounts {
            debit: 100,
            credit: 99,
            commission: 1,
        };
        let op = Operation::new(OperationId::new(), &req, Decimal::ONE, 0, amounts);

        assert_eq!(op.debit_delta(), -100);
        assert_eq!(op.credit_delta(), 99);
        assert_eq!(op.reverse_delta(), 100);
        assert_eq!(op.state, OpState::Pending);
        assert_eq!(op.outcome().status, PublicStatus::Pending);
    }
}
