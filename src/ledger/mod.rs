//! Ledger Store
//!
//! Durable client balances and transaction records. The sequencing core only
//! talks to storage through [`LedgerStore`]; two implementations exist:
//!
//! - [`PgLedger`]: PostgreSQL via `sqlx`, one SQL transaction per transfer
//! - [`InMemoryLedger`]: single-lock in-process store (tests, `--memory` mode)
//!
//! # Status invariant
//!
//! A transaction status only moves `pending -> completed` or
//! `pending -> error`. Both [`LedgerStore::execute_transfer`] and
//! [`LedgerStore::mark_error`] are conditional on the record still being
//! `pending`, so re-dispatching a resolved id has no effect on balances.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;

pub use error::LedgerError;
pub use memory::InMemoryLedger;
pub use models::{Client, Transaction, TransactionStatus, is_valid_amount};
pub use postgres::PgLedger;

use async_trait::async_trait;

use crate::core_types::{ClientId, TransactionId};

/// Storage contract consumed by intake, workers and recovery
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Resolve an authentication token to its client
    async fn client_by_token(&self, token: &str) -> Result<Client, LedgerError>;

    async fn client_by_id(&self, id: ClientId) -> Result<Client, LedgerError>;

    /// Insert a new transaction record (expected to be `pending`)
    async fn create_transaction(&self, tx: &Transaction) -> Result<(), LedgerError>;

    async fn transaction(&self, id: &TransactionId) -> Result<Transaction, LedgerError>;

    /// Apply a transfer atomically
    ///
    /// Re-checks the sender's funds, debits the sender, credits the receiver
    /// and marks the record `completed` in one unit. On any error nothing is
    /// applied. Fails with [`LedgerError::NotPending`] if the record has
    /// already been resolved.
    async fn execute_transfer(&self, tx: &Transaction) -> Result<(), LedgerError>;

    /// Mark a pending transaction as `error` (no-op on resolved records)
    async fn mark_error(&self, id: &TransactionId) -> Result<(), LedgerError>;

    /// All `pending` transactions, oldest first
    async fn pending_transactions(&self) -> Result<Vec<Transaction>, LedgerError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), LedgerError>;
}
