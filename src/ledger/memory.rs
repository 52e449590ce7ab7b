//! In-memory Ledger
//!
//! All state sits behind one mutex, which makes every operation (and in
//! particular the debit/credit/complete of a transfer) atomic. Used by the
//! test suites and by the binary's `--memory` mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use super::{Client, LedgerError, LedgerStore, Transaction, TransactionStatus};
use crate::core_types::{ClientId, TransactionId};

#[derive(Default)]
struct LedgerState {
    clients: FxHashMap<ClientId, Client>,
    tokens: FxHashMap<String, ClientId>,
    transactions: FxHashMap<TransactionId, Transaction>,
}

/// Process-local ledger
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    /// When false every call fails with `Unavailable` (liveness tests)
    available: AtomicBool,
    /// When true `execute_transfer` fails with a storage error
    fail_transfers: AtomicBool,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            available: AtomicBool::new(true),
            fail_transfers: AtomicBool::new(false),
        }
    }

    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let ledger = Self::new();
        for client in clients {
            ledger.insert_client(client);
        }
        ledger
    }

    /// Insert or replace a client
    pub fn insert_client(&self, client: Client) {
        let mut state = self.state();
        state.tokens.insert(client.token.clone(), client.id);
        state.clients.insert(client.id, client);
    }

    pub fn balance(&self, id: ClientId) -> Option<Decimal> {
        self.state().clients.get(&id).map(|c| c.balance)
    }

    pub fn transaction_count(&self) -> usize {
        self.state().transactions.len()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable)
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn client_by_token(&self, token: &str) -> Result<Client, LedgerError> {
        self.check_available()?;
        let state = self.state();
        state
            .tokens
            .get(token)
            .and_then(|id| state.clients.get(id))
            .cloned()
            .ok_or(LedgerError::ClientNotFound)
    }

    async fn client_by_id(&self, id: ClientId) -> Result<Client, LedgerError> {
        self.check_available()?;
        self.state()
            .clients
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ClientNotFound)
    }

    async fn create_transaction(&self, tx: &Transaction) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut state = self.state();
        if state.transactions.contains_key(&tx.id) {
            return Err(LedgerError::DuplicateTransaction(tx.id.clone()));
        }
        state.transactions.insert(tx.id.clone(), tx.clone());
        Ok(())
    }

    async fn transaction(&self, id: &TransactionId) -> Result<Transaction, LedgerError> {
        self.check_available()?;
        self.state()
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(id.clone()))
    }

    async fn execute_transfer(&self, tx: &Transaction) -> Result<(), LedgerError> {
        self.check_available()?;
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(LedgerError::Database("injected transfer failure".to_string()));
        }

        let mut state = self.state();

        let (sender_id, receiver_id, amount) = match state.transactions.get(&tx.id) {
            Some(record) if record.status == TransactionStatus::Pending => {
                (record.sender_id, record.receiver_id, record.amount)
            }
            Some(_) => return Err(LedgerError::NotPending(tx.id.clone())),
            None => return Err(LedgerError::TransactionNotFound(tx.id.clone())),
        };

        let available = state
            .clients
            .get(&sender_id)
            .map(|c| c.balance)
            .ok_or(LedgerError::ClientNotFound)?;
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                client: sender_id,
                available,
                requested: amount,
            });
        }
        if !state.clients.contains_key(&receiver_id) {
            return Err(LedgerError::ClientNotFound);
        }

        // All checks passed; nothing below can fail.
        if let Some(sender) = state.clients.get_mut(&sender_id) {
            sender.balance -= amount;
        }
        if let Some(receiver) = state.clients.get_mut(&receiver_id) {
            receiver.balance += amount;
        }
        if let Some(record) = state.transactions.get_mut(&tx.id) {
            record.status = TransactionStatus::Completed;
        }
        Ok(())
    }

    async fn mark_error(&self, id: &TransactionId) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut state = self.state();
        match state.transactions.get_mut(id) {
            Some(record) => {
                if record.status == TransactionStatus::Pending {
                    record.status = TransactionStatus::Error;
                }
                Ok(())
            }
            None => Err(LedgerError::TransactionNotFound(id.clone())),
        }
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        self.check_available()?;
        let mut pending: Vec<Transaction> = self
            .state()
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(pending)
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::with_clients([
            Client::new(1, "alice", "token-a", Decimal::new(100, 0)),
            Client::new(2, "bob", "token-b", Decimal::new(50, 0)),
        ])
    }

    async fn create(ledger: &InMemoryLedger, id: &str, amount: i64) -> Transaction {
        let tx = Transaction::pending(TransactionId::from(id), 1, 2, Decimal::new(amount, 0));
        ledger.create_transaction(&tx).await.unwrap();
        tx
    }

    #[tokio::test]
    async fn test_lookup_by_token_and_id() {
        let ledger = ledger();
        assert_eq!(ledger.client_by_token("token-b").await.unwrap().id, 2);
        assert_eq!(ledger.client_by_id(1).await.unwrap().name, "alice");
        assert_eq!(
            ledger.client_by_token("nope").await,
            Err(LedgerError::ClientNotFound)
        );
        assert_eq!(ledger.client_by_id(9).await, Err(LedgerError::ClientNotFound));
    }

    #[tokio::test]
    async fn test_execute_transfer_moves_funds_and_completes() {
        let ledger = ledger();
        let tx = create(&ledger, "t1", 30).await;

        ledger.execute_transfer(&tx).await.unwrap();

        assert_eq!(ledger.balance(1), Some(Decimal::new(70, 0)));
        assert_eq!(ledger.balance(2), Some(Decimal::new(80, 0)));
        assert_eq!(
            ledger.transaction(&tx.id).await.unwrap().status,
            TransactionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_execute_transfer_insufficient_funds_has_no_effect() {
        let ledger = ledger();
        let tx = create(&ledger, "t1", 150).await;

        let err = ledger.execute_transfer(&tx).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { client: 1, .. }));
        assert_eq!(ledger.balance(1), Some(Decimal::new(100, 0)));
        assert_eq!(ledger.balance(2), Some(Decimal::new(50, 0)));
        assert_eq!(
            ledger.transaction(&tx.id).await.unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_resolved_transaction_is_not_reapplied() {
        let ledger = ledger();
        let tx = create(&ledger, "t1", 30).await;
        ledger.execute_transfer(&tx).await.unwrap();

        assert_eq!(
            ledger.execute_transfer(&tx).await,
            Err(LedgerError::NotPending(tx.id.clone()))
        );
        // mark_error never reverses a terminal status
        ledger.mark_error(&tx.id).await.unwrap();
        assert_eq!(
            ledger.transaction(&tx.id).await.unwrap().status,
            TransactionStatus::Completed
        );
        assert_eq!(ledger.balance(1), Some(Decimal::new(70, 0)));
    }

    #[tokio::test]
    async fn test_duplicate_transaction_rejected() {
        let ledger = ledger();
        let tx = create(&ledger, "t1", 10).await;
        assert_eq!(
            ledger.create_transaction(&tx).await,
            Err(LedgerError::DuplicateTransaction(tx.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_pending_transactions_oldest_first() {
        let ledger = ledger();
        let mut older = Transaction::pending(TransactionId::from("b"), 1, 2, Decimal::ONE);
        older.created_at -= chrono::Duration::seconds(10);
        ledger.create_transaction(&older).await.unwrap();
        let newer = create(&ledger, "a", 1).await;
        let done = create(&ledger, "c", 1).await;
        ledger.mark_error(&done.id).await.unwrap();

        let pending = ledger.pending_transactions().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_unavailable_and_injected_failures() {
        let ledger = ledger();
        let tx = create(&ledger, "t1", 10).await;

        ledger.set_fail_transfers(true);
        assert!(matches!(
            ledger.execute_transfer(&tx).await,
            Err(LedgerError::Database(_))
        ));
        assert_eq!(ledger.balance(1), Some(Decimal::new(100, 0)));

        ledger.set_available(false);
        assert_eq!(ledger.ping().await, Err(LedgerError::Unavailable));
        ledger.set_available(true);
        assert!(ledger.ping().await.is_ok());
    }
}
