//! Transfer Workers
//!
//! A fixed pool of tasks sharing the dispatch receiver. A worker that takes
//! a token owns the client queue until it drains it, and executes each queued
//! transfer under the queue's execution mutex.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core_types::TransactionId;
use crate::ledger::{LedgerError, LedgerStore};
use crate::sequencer::{ClientQueue, DispatchReceiver, DispatchToken};
use crate::stats::EngineStats;

/// Dispatch receiver shared by every worker in the pool
pub type SharedDispatch = Arc<Mutex<DispatchReceiver>>;

#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    /// Simulated long-running work before each transfer is applied
    pub execution_delay: Duration,
}

impl From<&EngineConfig> for WorkerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            execution_delay: config.execution_delay(),
        }
    }
}

pub struct Worker {
    id: usize,
    dispatch: SharedDispatch,
    ledger: Arc<dyn LedgerStore>,
    stats: Arc<EngineStats>,
    shutdown: CancellationToken,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        id: usize,
        dispatch: SharedDispatch,
        ledger: Arc<dyn LedgerStore>,
        stats: Arc<EngineStats>,
        shutdown: CancellationToken,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            dispatch,
            ledger,
            stats,
            shutdown,
            config,
        }
    }

    /// Run until cancelled or the dispatch channel closes
    pub async fn run(self) {
        debug!(worker = self.id, "Worker started");

        loop {
            let token = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                token = self.next_token() => match token {
                    Some(token) => token,
                    None => break,
                },
            };
            self.drain(&token).await;
        }

        debug!(worker = self.id, "Worker stopped");
    }

    async fn next_token(&self) -> Option<DispatchToken> {
        self.dispatch.lock().await.recv().await
    }

    /// Drain a claimed queue in FIFO order, then release it
    ///
    /// Ids pushed between the last pop and the release would otherwise sit
    /// without a token, so the queue is re-claimed when it is non-empty.
    pub async fn drain(&self, queue: &ClientQueue) {
        loop {
            while !self.shutdown.is_cancelled() {
                let Some(id) = queue.pop() else { break };
                self.process(queue, &id).await;
            }

            queue.release();
            if self.shutdown.is_cancelled() {
                if !queue.is_empty() {
                    info!(
                        worker = self.id,
                        client_id = queue.client_id(),
                        abandoned = queue.len(),
                        "Shutdown while draining, remaining transactions stay pending"
                    );
                }
                return;
            }
            if queue.is_empty() || !queue.try_claim() {
                return;
            }
            debug!(
                worker = self.id,
                client_id = queue.client_id(),
                "Transactions arrived during release, continuing drain"
            );
        }
    }

    async fn process(&self, queue: &ClientQueue, id: &TransactionId) {
        let tx = match self.ledger.transaction(id).await {
            Ok(tx) => tx,
            Err(LedgerError::TransactionNotFound(_)) => {
                warn!(worker = self.id, transaction_id = %id, "Dispatched transaction not found");
                EngineStats::incr(&self.stats.transfers_skipped);
                return;
            }
            Err(e) => {
                // Left pending for the next startup recovery
                error!(worker = self.id, transaction_id = %id, error = %e, "Failed to load transaction");
                EngineStats::incr(&self.stats.transfers_skipped);
                return;
            }
        };

        if tx.status.is_terminal() {
            debug!(
                worker = self.id,
                transaction_id = %id,
                status = %tx.status,
                "Transaction already resolved, skipping"
            );
            EngineStats::incr(&self.stats.transfers_skipped);
            return;
        }

        let _guard = queue.lock_execution().await;

        if !self.config.execution_delay.is_zero() {
            tokio::time::sleep(self.config.execution_delay).await;
        }

        match self.ledger.execute_transfer(&tx).await {
            Ok(()) => {
                info!(
                    worker = self.id,
                    transaction_id = %tx.id,
                    sender_id = tx.sender_id,
                    receiver_id = tx.receiver_id,
                    amount = %tx.amount,
                    "Transfer completed"
                );
                EngineStats::incr(&self.stats.transfers_completed);
            }
            Err(LedgerError::NotPending(_)) => {
                debug!(worker = self.id, transaction_id = %tx.id, "Transaction resolved concurrently");
                EngineStats::incr(&self.stats.transfers_skipped);
            }
            Err(e) => {
                if e.is_storage_failure() {
                    error!(
                        worker = self.id,
                        transaction_id = %tx.id,
                        sender_id = tx.sender_id,
                        error = %e,
                        "Transfer failed on storage error"
                    );
                } else {
                    warn!(
                        worker = self.id,
                        transaction_id = %tx.id,
                        sender_id = tx.sender_id,
                        error = %e,
                        "Transfer rejected"
                    );
                }
                EngineStats::incr(&self.stats.transfers_failed);
                if let Err(e) = self.ledger.mark_error(&tx.id).await {
                    error!(
                        worker = self.id,
                        transaction_id = %tx.id,
                        error = %e,
                        "Failed to mark transaction as error"
                    );
                }
            }
        }
    }
}

/// Fixed-size set of workers over one dispatch channel
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `size` workers and return their handles
    pub fn spawn(
        size: usize,
        dispatch_rx: DispatchReceiver,
        ledger: Arc<dyn LedgerStore>,
        stats: Arc<EngineStats>,
        shutdown: CancellationToken,
        config: WorkerConfig,
    ) -> Vec<JoinHandle<()>> {
        info!(
            workers = size,
            execution_delay_ms = config.execution_delay.as_millis() as u64,
            "Starting worker pool"
        );

        let dispatch: SharedDispatch = Arc::new(Mutex::new(dispatch_rx));
        (0..size)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    dispatch.clone(),
                    ledger.clone(),
                    stats.clone(),
                    shutdown.clone(),
                    config.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect()
    }
}
