//! Operation FSM state definitions.
//!
//! State IDs are i16 so a relational backend can store them as SMALLINT.
//! Terminal states: COMMITTED (40), FAILED (-10), COMPENSATED (-30).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal operation states.
///
/// The leg-level states (`DebitPending`, `DebitDone`, `CreditPending`)
/// exist so recovery knows which transfer leg to resume; callers only
/// ever see the collapsed [`PublicStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum OpState {
    /// Request validated and recorded, nothing applied yet
    Pending = 0,

    /// Source debit initiated (persist-before-call)
    DebitPending = 10,

    /// Source debit confirmed - money is IN-FLIGHT.
    /// Must eventually reach COMMITTED, COMPENSATED or FAILED-with-alert.
    DebitDone = 20,

    /// Destination credit initiated (persist-before-call)
    CreditPending = 30,

    /// Terminal: operation completed successfully
    Committed = 40,

    /// Terminal: rejected before any lasting mutation, or compensation
    /// exhausted (the latter carries a reconciliation alert)
    Failed = -10,

    /// Reversing credit back to the source in progress
    Compensating = -20,

    /// Terminal: source refund completed, net zero effect
    Compensated = -30,
}

/// Caller-visible operation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicStatus {
    Pending,
    Committed,
    Failed,
    Compensating,
    Compensated,
}

impl PublicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicStatus::Pending => "pending",
            PublicStatus::Committed => "committed",
            PublicStatus::Failed => "failed",
            PublicStatus::Compensating => "compensating",
            PublicStatus::Compensated => "compensated",
        }
    }
}

impl fmt::Display for PublicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OpState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OpState::Committed | OpState::Failed | OpState::Compensated
        )
    }

    /// Check if money is in-flight (debit applied, outcome not settled)
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            OpState::DebitDone | OpState::CreditPending | OpState::Compensating
        )
    }

    /// Collapse internal leg states to the public five-status contract
    pub fn public(&self) -> PublicStatus {
        match self {
            OpState::Pending | OpState::DebitPending | OpState::DebitDone
            | OpState::CreditPending => PublicStatus::Pending,
            OpState::Committed => PublicStatus::Committed,
            OpState::Failed => PublicStatus::Failed,
            OpState::Compensating => PublicStatus::Compensating,
            OpState::Compensated => PublicStatus::Compensated,
        }
    }

    /// Get the numeric state ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from a stored state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(OpState::Pending),
            10 => Some(OpState::DebitPending),
            20 => Some(OpState::DebitDone),
            30 => Some(OpState::CreditPending),
            40 => Some(OpState::Committed),
            -10 => Some(OpState::Failed),
            -20 => Some(OpState::Compensating),
            -30 => Some(OpState::Compensated),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            OpState::Pending => "PENDING",
            OpState::DebitPending => "DEBIT_PENDING",
            OpState::DebitDone => "DEBIT_DONE",
            OpState::CreditPending => "CREDIT_PENDING",
            OpState::Committed => "COMMITTED",
            OpState::Failed => "FAILED",
            OpState::Compensating => "COMPENSATING",
            OpState::Compensated => "COMPENSATED",
        }
    }
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for OpState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        OpState::from_id(value).ok_or(())
    }
}
