//! Commission Calculator
//!
//! Pure fee computation for transfers. All arithmetic is done in
//! `rust_decimal` and truncated (never rounded) back to integer minor
//! units, so results are deterministic. The truncation remainder is
//! retained by the system: `debit - credit == commission` holds exactly
//! for both modes.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::Amount;

/// Which side of the transfer the requested amount is pinned to.
///
/// Consumed only by the calculator; no other component branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionMode {
    /// `amount` is what the sender is debited; recipient gets the rest
    From,
    /// `amount` is what the recipient is credited; sender covers the fee
    To,
}

impl CommissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionMode::From => "from",
            CommissionMode::To => "to",
        }
    }
}

impl fmt::Display for CommissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CommissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from" => Ok(CommissionMode::From),
            "to" => Ok(CommissionMode::To),
            other => Err(format!("Invalid commission mode: {:?}", other)),
        }
    }
}

/// Computed money movement for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAmounts {
    /// Amount the source account is debited
    pub debit: Amount,
    /// Amount the destination account is credited
    pub credit: Amount,
    /// Fee retained by the system (`debit - credit`)
    pub commission: Amount,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommissionError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Commission percent must be in [0, 100): {0}")]
    InvalidPercent(Decimal),

    #[error("Credit amount is not positive after commission")]
    NonPositiveCredit,

    #[error("Debit amount would overflow")]
    Overflow,
}

/// Compute debit/credit/commission for a transfer.
///
/// Commission is `trunc(amount * percent / 100) + fixed` for both modes;
/// mode only decides which leg `amount` is pinned to:
/// - `from`: debit = amount, credit = amount - commission
/// - `to`:   credit = amount, debit = amount + commission
pub fn compute(
    amount: Amount,
    percent: Decimal,
    fixed: Amount,
    mode: CommissionMode,
) -> Result<TransferAmounts, CommissionError> {
    if amount == 0 {
        return Err(CommissionError::ZeroAmount);
    }
    if percent < Decimal::ZERO || percent >= Decimal::ONE_HUNDRED {
        return Err(CommissionError::InvalidPercent(percent));
    }

    let percent_part = (Decimal::from(amount) * percent / Decimal::ONE_HUNDRED).trunc();
    let percent_part = percent_part.to_u64().ok_or(CommissionError::Overflow)?;
    let commission = percent_part
        .checked_add(fixed)
        .ok_or(CommissionError::Overflow)?;

    match mode {
        CommissionMode::From => {
            if commission >= amount {
                return Err(CommissionError::NonPositiveCredit);
            }
            Ok(TransferAmounts {
                debit: amount,
                credit: amount - commission,
                commission,
            })
        }
        CommissionMode::To => {
            let debit = amount
                .checked_add(commission)
                .ok_or(CommissionError::Overflow)?;
            Ok(TransferAmounts {
                debit,
                credit: amount,
                commission,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_mode_from_vector() {
        // amount=100, percent=1, fixed=0, mode=from -> commission=1, credit=99, debit=100
        let amounts = compute(100, pct("1"), 0, CommissionMode::From).unwrap();
        assert_eq!(amounts.debit, 100);
        assert_eq!(amounts.credit, 99);
        assert_eq!(amounts.commission, 1);
    }

    #[test]
    fn test_mode_to_vector() {
        // amount=100, percent=1, fixed=0, mode=to -> credit=100, commission=1, debit=101
        let amounts = compute(100, pct("1"), 0, CommissionMode::To).unwrap();
        assert_eq!(amounts.debit, 101);
        assert_eq!(amounts.credit, 100);
        assert_eq!(amounts.commission, 1);
    }

    #[test]
    fn test_truncation_retains_remainder() {
        // 1.5% of 99 = 1.485 -> commission truncates to 1
        let amounts = compute(99, pct("1.5"), 0, CommissionMode::From).unwrap();
        assert_eq!(amounts.commission, 1);
        assert_eq!(amounts.credit, 98);
        assert_eq!(amounts.debit - amounts.credit, amounts.commission);
    }

    #[test]
    fn test_fixed_part() {
        let amounts = compute(1_000, pct("0"), 25, CommissionMode::From).unwrap();
        assert_eq!(amounts.commission, 25);
        assert_eq!(amounts.credit, 975);

        let amounts = compute(1_000, pct("2"), 25, CommissionMode::To).unwrap();
        assert_eq!(amounts.commission, 45);
        assert_eq!(amounts.debit, 1_045);
        assert_eq!(amounts.credit, 1_000);
    }

    #[test]
    fn test_zero_percent_zero_fixed() {
        let amounts = compute(500, pct("0"), 0, CommissionMode::From).unwrap();
        assert_eq!(amounts.debit, 500);
        assert_eq!(amounts.credit, 500);
        assert_eq!(amounts.commission, 0);
    }

    #[test]
    fn test_commission_eats_whole_amount() {
        // fixed fee >= amount in `from` mode leaves nothing to credit
        assert_eq!(
            compute(10, pct("0"), 10, CommissionMode::From),
            Err(CommissionError::NonPositiveCredit)
        );
        // but is fine in `to` mode (sender pays it on top)
        let amounts = compute(10, pct("0"), 10, CommissionMode::To).unwrap();
        assert_eq!(amounts.debit, 20);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(
            compute(0, pct("1"), 0, CommissionMode::From),
            Err(CommissionError::ZeroAmount)
        );
        assert!(matches!(
            compute(100, pct("-1"), 0, CommissionMode::From),
            Err(CommissionError::InvalidPercent(_))
        ));
        assert!(matches!(
            compute(100, pct("100"), 0, CommissionMode::To),
            Err(CommissionError::InvalidPercent(_))
        ));
        assert_eq!(
            compute(u64::MAX, pct("0"), 1, CommissionMode::To),
            Err(CommissionError::Overflow)
        );
    }

    #[test]
    fn test_mode_roundtrip() {
        assert_eq!("from".parse::<CommissionMode>().unwrap(), CommissionMode::From);
        assert_eq!("to".parse::<CommissionMode>().unwrap(), CommissionMode::To);
        assert!("both".parse::<CommissionMode>().is_err());
        assert_eq!(CommissionMode::From.to_string(), "from");
    }
}
