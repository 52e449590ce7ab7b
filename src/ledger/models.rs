//! Ledger data models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{ClientId, TransactionId};

/// Fractional digits kept by storage (`NUMERIC(20, 2)`)
pub const AMOUNT_SCALE: u32 = 2;

/// Exclusive upper bound: at most 18 integer digits fit `NUMERIC(20, 2)`
const AMOUNT_LIMIT: u64 = 1_000_000_000_000_000_000;

/// Positive and storable without rounding
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO
        && amount.normalize().scale() <= AMOUNT_SCALE
        && amount < Decimal::from(AMOUNT_LIMIT)
}

/// Transaction status
///
/// Transitions only `Pending -> Completed` or `Pending -> Error`.
/// `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Error,
}

impl TransactionStatus {
    /// Storage representation (matches the `transactions.status` column)
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Error => "error",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "error" => Ok(TransactionStatus::Error),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Client account
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub token: String,
    pub balance: Decimal,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>, token: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            token: token.into(),
            balance,
        }
    }
}

/// Transfer record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender_id: ClientId,
    pub receiver_id: ClientId,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// New record in `Pending` state, stamped now
    pub fn pending(
        id: TransactionId,
        sender_id: ClientId,
        receiver_id: ClientId,
        amount: Decimal,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            status: TransactionStatus::Pending,
            amount,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_storage_form() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("done".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Error.is_terminal());
    }

    #[test]
    fn test_amount_must_fit_storage_precision() {
        assert!(is_valid_amount(Decimal::new(1050, 2)));
        // Trailing zeros are not extra precision
        assert!(is_valid_amount(Decimal::new(11000, 4)));
        assert!(is_valid_amount(Decimal::from_i128_with_scale(
            99_999_999_999_999_999_999,
            2
        )));

        assert!(!is_valid_amount(Decimal::ZERO));
        assert!(!is_valid_amount(Decimal::new(-1, 0)));
        assert!(!is_valid_amount(Decimal::new(1, 3)));
        assert!(!is_valid_amount(Decimal::new(5, 3)));
        assert!(!is_valid_amount(Decimal::from(AMOUNT_LIMIT)));
    }

    #[test]
    fn test_transaction_serializes_amount_as_string() {
        let tx = Transaction::pending(TransactionId::from("abc"), 1, 2, Decimal::new(3050, 2));
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["amount"], "30.50");
        assert_eq!(json["status"], "pending");
    }
}
