//! PostgreSQL Ledger
//!
//! Tables:
//! - `clients(id, name, token, balance)`
//! - `transactions(id, sender_id, receiver_id, status, amount, created_at)`
//!
//! A transfer runs inside one SQL transaction: the transaction row and both
//! client rows are locked (`FOR UPDATE`, client rows in id order so opposite
//! transfers cannot deadlock), funds are re-checked, and debit, credit and
//! status update commit together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use tracing::{debug, info};

use super::{Client, LedgerError, LedgerStore, Transaction, TransactionStatus};
use crate::core_types::{ClientId, TransactionId};
use crate::db::{Database, PoolConfig, SafeRow};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        id      BIGSERIAL PRIMARY KEY,
        name    TEXT NOT NULL,
        token   TEXT NOT NULL UNIQUE,
        balance NUMERIC(20, 2) NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id          TEXT PRIMARY KEY,
        sender_id   BIGINT NOT NULL REFERENCES clients(id),
        receiver_id BIGINT NOT NULL REFERENCES clients(id),
        status      TEXT NOT NULL DEFAULT 'pending',
        amount      NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS transactions_pending_idx ON transactions (created_at) WHERE status = 'pending'",
];

/// Ledger backed by PostgreSQL
pub struct PgLedger {
    db: Database,
}

impl PgLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str, pool: &PoolConfig) -> Result<Self, LedgerError> {
        Ok(Self::new(Database::connect(database_url, pool).await?))
    }

    /// Create tables if missing
    pub async fn init_schema(&self) -> Result<(), LedgerError> {
        self.db.apply_schema(SCHEMA).await?;
        info!("Ledger schema initialized");
        Ok(())
    }

    /// Insert a client, returning it with its assigned id
    pub async fn insert_client(
        &self,
        name: &str,
        token: &str,
        balance: Decimal,
    ) -> Result<Client, LedgerError> {
        let row = sqlx::query(
            "INSERT INTO clients (name, token, balance) VALUES ($1, $2, $3)
             RETURNING id, name, token, balance",
        )
        .bind(name)
        .bind(token)
        .bind(balance)
        .fetch_one(self.db.pool())
        .await?;
        row_to_client(&row)
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, LedgerError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get_log(name)
        .ok_or_else(|| LedgerError::CorruptRecord(format!("unreadable column '{}'", name)))
}

fn row_to_client(row: &PgRow) -> Result<Client, LedgerError> {
    let id: i64 = column(row, "id")?;
    Ok(Client {
        id: id as ClientId,
        name: column(row, "name")?,
        token: column(row, "token")?,
        balance: column(row, "balance")?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction, LedgerError> {
    let id: String = column(row, "id")?;
    let sender_id: i64 = column(row, "sender_id")?;
    let receiver_id: i64 = column(row, "receiver_id")?;
    let status: String = column(row, "status")?;
    let created_at: DateTime<Utc> = column(row, "created_at")?;
    Ok(Transaction {
        id: TransactionId::new(id),
        sender_id: sender_id as ClientId,
        receiver_id: receiver_id as ClientId,
        status: status.parse().map_err(LedgerError::CorruptRecord)?,
        amount: column(row, "amount")?,
        created_at,
    })
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn client_by_token(&self, token: &str) -> Result<Client, LedgerError> {
        let row = sqlx::query("SELECT id, name, token, balance FROM clients WHERE token = $1")
            .bind(token)
            .fetch_optional(self.db.pool())
            .await?;
        match row {
            Some(row) => row_to_client(&row),
            None => Err(LedgerError::ClientNotFound),
        }
    }

    async fn client_by_id(&self, id: ClientId) -> Result<Client, LedgerError> {
        let row = sqlx::query("SELECT id, name, token, balance FROM clients WHERE id = $1")
            .bind(id as i64)
            .fetch_optional(self.db.pool())
            .await?;
        match row {
            Some(row) => row_to_client(&row),
            None => Err(LedgerError::ClientNotFound),
        }
    }

    async fn create_transaction(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "INSERT INTO transactions (id, sender_id, receiver_id, status, amount, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(tx.id.as_str())
        .bind(tx.sender_id as i64)
        .bind(tx.receiver_id as i64)
        .bind(tx.status.as_str())
        .bind(tx.amount)
        .bind(tx.created_at)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::DuplicateTransaction(tx.id.clone()));
        }
        Ok(())
    }

    async fn transaction(&self, id: &TransactionId) -> Result<Transaction, LedgerError> {
        let row = sqlx::query(
            "SELECT id, sender_id, receiver_id, status, amount, created_at
             FROM transactions WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        match row {
            Some(row) => row_to_transaction(&row),
            None => Err(LedgerError::TransactionNotFound(id.clone())),
        }
    }

    async fn execute_transfer(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let mut db_tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT id, sender_id, receiver_id, status, amount, created_at
             FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(tx.id.as_str())
        .fetch_optional(&mut *db_tx)
        .await?;
        let record = match row {
            Some(row) => row_to_transaction(&row)?,
            None => {
                let _ = db_tx.rollback().await;
                return Err(LedgerError::TransactionNotFound(tx.id.clone()));
            }
        };
        if record.status != TransactionStatus::Pending {
            let _ = db_tx.rollback().await;
            return Err(LedgerError::NotPending(record.id));
        }

        // Lock both parties in id order
        let rows = sqlx::query(
            "SELECT id, balance FROM clients WHERE id IN ($1, $2) ORDER BY id FOR UPDATE",
        )
        .bind(record.sender_id as i64)
        .bind(record.receiver_id as i64)
        .fetch_all(&mut *db_tx)
        .await?;

        let mut sender_balance = None;
        let mut receiver_found = false;
        for row in &rows {
            let id: i64 = column(row, "id")?;
            if id as ClientId == record.sender_id {
                sender_balance = Some(column::<Decimal>(row, "balance")?);
            }
            if id as ClientId == record.receiver_id {
                receiver_found = true;
            }
        }
        let (Some(available), true) = (sender_balance, receiver_found) else {
            let _ = db_tx.rollback().await;
            return Err(LedgerError::ClientNotFound);
        };

        if available < record.amount {
            let _ = db_tx.rollback().await;
            return Err(LedgerError::InsufficientFunds {
                client: record.sender_id,
                available,
                requested: record.amount,
            });
        }

        sqlx::query("UPDATE clients SET balance = balance - $1 WHERE id = $2")
            .bind(record.amount)
            .bind(record.sender_id as i64)
            .execute(&mut *db_tx)
            .await?;

        sqlx::query("UPDATE clients SET balance = balance + $1 WHERE id = $2")
            .bind(record.amount)
            .bind(record.receiver_id as i64)
            .execute(&mut *db_tx)
            .await?;

        sqlx::query("UPDATE transactions SET status = 'completed' WHERE id = $1")
            .bind(record.id.as_str())
            .execute(&mut *db_tx)
            .await?;

        db_tx.commit().await?;
        debug!(transaction_id = %record.id, "Transfer committed");
        Ok(())
    }

    async fn mark_error(&self, id: &TransactionId) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'error' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            // Either unknown or already terminal; only the former is an error.
            self.transaction(id).await?;
        }
        Ok(())
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, sender_id, receiver_id, status, amount, created_at
             FROM transactions WHERE status = 'pending'
             ORDER BY created_at, id",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.db.health_check().await?;
        Ok(())
    }
}
