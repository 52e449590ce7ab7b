//! Ledger Error Types

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{ClientId, TransactionId};

/// Errors returned by a [`super::LedgerStore`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Client not found")]
    ClientNotFound,

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("Transaction already exists: {0}")]
    DuplicateTransaction(TransactionId),

    #[error("Insufficient funds for client {client}: available {available}, requested {requested}")]
    InsufficientFunds {
        client: ClientId,
        available: Decimal,
        requested: Decimal,
    },

    /// The record left `pending` before the operation could apply
    #[error("Transaction {0} is no longer pending")]
    NotPending(TransactionId),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Ledger unavailable")]
    Unavailable,
}

impl LedgerError {
    /// Failure of the store itself, as opposed to a business rejection
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            LedgerError::Database(_) | LedgerError::Unavailable | LedgerError::CorruptRecord(_)
        )
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = LedgerError::InsufficientFunds {
            client: 1,
            available: Decimal::new(10000, 2),
            requested: Decimal::new(15000, 2),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds for client 1: available 100.00, requested 150.00"
        );
    }

    #[test]
    fn test_storage_failure_classification() {
        assert!(LedgerError::Database("boom".into()).is_storage_failure());
        assert!(LedgerError::Unavailable.is_storage_failure());
        assert!(!LedgerError::ClientNotFound.is_storage_failure());
        assert!(!LedgerError::NotPending(TransactionId::from("x")).is_storage_failure());
    }
}
