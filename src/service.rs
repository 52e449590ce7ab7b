//! Transfer Service
//!
//! Wires the sequencer, idle reaper, worker pool and liveness probe around
//! one ledger and one shutdown token.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::TransferError;
use crate::intake::Intake;
use crate::ledger::LedgerStore;
use crate::recovery::recover_pending;
use crate::sequencer::{IdleReaper, Sequencer, SequencerConfig, SequencerHandle};
use crate::stats::{EngineStats, EngineStatsSnapshot};
use crate::worker::{WorkerConfig, WorkerPool};

pub struct TransferService {
    ledger: Arc<dyn LedgerStore>,
    sequencer: SequencerHandle,
    intake: Intake,
    stats: Arc<EngineStats>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TransferService {
    /// Spawn every background loop; must be called inside a tokio runtime
    pub fn start(
        config: &EngineConfig,
        ledger: Arc<dyn LedgerStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let stats = Arc::new(EngineStats::new());

        let (sequencer, handle, dispatch_rx) = Sequencer::new(
            &SequencerConfig::from(config),
            ledger.clone(),
            stats.clone(),
            shutdown.clone(),
        );

        let mut tasks = vec![tokio::spawn(sequencer.run())];

        let reaper = IdleReaper::new(handle.clone(), config.reap_interval(), shutdown.clone());
        tasks.push(tokio::spawn(reaper.run()));

        tasks.extend(WorkerPool::spawn(
            config.workers,
            dispatch_rx,
            ledger.clone(),
            stats.clone(),
            shutdown.clone(),
            WorkerConfig::from(config),
        ));

        tasks.push(tokio::spawn(liveness_probe(
            ledger.clone(),
            config.liveness_interval(),
            shutdown.clone(),
        )));

        info!(
            workers = config.workers,
            fifo_capacity = config.fifo_capacity,
            intake_capacity = config.intake_capacity,
            dispatch_capacity = config.dispatch_capacity,
            "Transfer service started"
        );

        let intake = Intake::new(ledger.clone(), handle.clone(), shutdown.clone());
        Self {
            ledger,
            sequencer: handle,
            intake,
            stats,
            shutdown,
            tasks,
        }
    }

    /// Resubmit pending transactions left by a previous run
    pub async fn recover(&self) -> Result<usize, TransferError> {
        recover_pending(
            self.ledger.clone(),
            self.sequencer.clone(),
            self.shutdown.clone(),
        )
        .await
    }

    /// Run recovery in the background so admission is not held up
    pub fn spawn_recovery(&self) -> JoinHandle<()> {
        let ledger = self.ledger.clone();
        let sequencer = self.sequencer.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = recover_pending(ledger, sequencer, shutdown).await {
                error!(error = %e, "Startup recovery failed");
            }
        })
    }

    pub fn intake(&self) -> &Intake {
        &self.intake
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every background loop to exit (after [`Self::shutdown`])
    pub async fn join(self) {
        let Self {
            tasks,
            stats,
            intake,
            sequencer,
            ..
        } = self;
        // Handles keep the intake channel open
        drop(intake);
        drop(sequencer);

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Service task panicked");
            }
        }
        info!("{}", stats.snapshot());
    }
}

/// Ping the ledger periodically; cancel everything on the first failure
async fn liveness_probe(
    ledger: Arc<dyn LedgerStore>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = ledger.ping().await {
                    error!(error = %e, "Ledger liveness check failed, shutting down");
                    shutdown.cancel();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Client, InMemoryLedger, TransactionStatus};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_liveness_failure_cancels_service() {
        let ledger = Arc::new(InMemoryLedger::with_clients([Client::new(
            1,
            "alice",
            "a",
            Decimal::ONE,
        )]));
        let config = EngineConfig {
            liveness_interval_ms: 10,
            ..EngineConfig::default()
        };
        let service = TransferService::start(&config, ledger.clone(), CancellationToken::new());

        ledger.set_available(false);
        tokio::time::timeout(Duration::from_secs(2), service.shutdown_token().cancelled())
            .await
            .expect("liveness probe did not cancel");
        tokio::time::timeout(Duration::from_secs(2), service.join())
            .await
            .expect("service did not stop");
    }

    #[tokio::test]
    async fn test_end_to_end_transfer() {
        let ledger = Arc::new(InMemoryLedger::with_clients([
            Client::new(1, "alice", "a", Decimal::new(100, 0)),
            Client::new(2, "bob", "b", Decimal::ZERO),
        ]));
        let service =
            TransferService::start(&EngineConfig::default(), ledger.clone(), CancellationToken::new());
        let alice = ledger.client_by_id(1).await.unwrap();

        let id = service
            .intake()
            .submit(&alice, 2, Decimal::new(40, 0))
            .await
            .unwrap();
        for _ in 0..200 {
            if service.stats().transfers_completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(
            ledger.transaction(&id).await.unwrap().status,
            TransactionStatus::Completed
        );
        assert_eq!(ledger.balance(2), Some(Decimal::new(40, 0)));

        service.shutdown();
        service.join().await;
    }
}
