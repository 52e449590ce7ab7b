//! Sequencer control loop
//!
//! Single task owning the [`QueueRegistry`]. It consumes sequencing requests
//! from the bounded intake channel and reap commands from the control
//! channel, and publishes dispatch tokens onto the bounded dispatch channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::{EnqueueOutcome, QueueRegistry};
use super::{DispatchToken, SequencingRequest};
use crate::config::EngineConfig;
use crate::ledger::LedgerStore;
use crate::stats::EngineStats;

/// Control channel depth; one pending reap is enough
const CONTROL_CAPACITY: usize = 4;

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Per-client backlog limit
    pub fifo_capacity: usize,
    pub intake_capacity: usize,
    pub dispatch_capacity: usize,
    /// Inactivity after which an idle client queue is reclaimed
    pub idle_grace: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SequencerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fifo_capacity: config.fifo_capacity,
            intake_capacity: config.intake_capacity,
            dispatch_capacity: config.dispatch_capacity,
            idle_grace: config.idle_grace(),
        }
    }
}

/// Submission to the intake channel failed; the request is handed back
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Sequencer intake is full")]
    Full(SequencingRequest),

    #[error("Sequencer is not running")]
    Closed(SequencingRequest),
}

impl SubmitError {
    pub fn into_request(self) -> SequencingRequest {
        match self {
            SubmitError::Full(r) | SubmitError::Closed(r) => r,
        }
    }
}

/// Messages from background loops to the control loop
#[derive(Debug)]
pub enum SequencerCommand {
    /// Reclaim idle client queues
    Reap,
}

/// Cloneable sending side of the sequencer
#[derive(Clone)]
pub struct SequencerHandle {
    intake_tx: mpsc::Sender<SequencingRequest>,
    control_tx: mpsc::Sender<SequencerCommand>,
}

impl SequencerHandle {
    /// Non-blocking submit (admission path)
    pub fn try_submit(&self, request: SequencingRequest) -> Result<(), SubmitError> {
        self.intake_tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(r) => SubmitError::Full(r),
            TrySendError::Closed(r) => SubmitError::Closed(r),
        })
    }

    /// Submit waiting for capacity (recovery path)
    pub async fn submit(&self, request: SequencingRequest) -> Result<(), SubmitError> {
        self.intake_tx
            .send(request)
            .await
            .map_err(|e| SubmitError::Closed(e.0))
    }

    /// Ask the loop to reap idle queues
    ///
    /// Returns false once the sequencer has stopped. A full control channel
    /// means a reap is already queued, which counts as success.
    pub fn request_reap(&self) -> bool {
        match self.control_tx.try_send(SequencerCommand::Reap) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Receiving side of the dispatch channel, consumed by the worker pool
pub type DispatchReceiver = mpsc::Receiver<DispatchToken>;

pub struct Sequencer {
    registry: QueueRegistry,
    intake_rx: mpsc::Receiver<SequencingRequest>,
    control_rx: mpsc::Receiver<SequencerCommand>,
    dispatch_tx: mpsc::Sender<DispatchToken>,
    ledger: Arc<dyn LedgerStore>,
    stats: Arc<EngineStats>,
    shutdown: CancellationToken,
    idle_grace: Duration,
}

impl Sequencer {
    pub fn new(
        config: &SequencerConfig,
        ledger: Arc<dyn LedgerStore>,
        stats: Arc<EngineStats>,
        shutdown: CancellationToken,
    ) -> (Self, SequencerHandle, DispatchReceiver) {
        let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_capacity);

        let sequencer = Self {
            registry: QueueRegistry::new(config.fifo_capacity),
            intake_rx,
            control_rx,
            dispatch_tx,
            ledger,
            stats,
            shutdown,
            idle_grace: config.idle_grace,
        };
        let handle = SequencerHandle {
            intake_tx,
            control_tx,
        };
        (sequencer, handle, dispatch_rx)
    }

    /// Run until cancelled or until every handle is dropped
    ///
    /// Queued ids that were not drained yet are abandoned; they are still
    /// `pending` in storage and are picked up by the next startup recovery.
    pub async fn run(mut self) {
        info!("Starting sequencer");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Closing sequencer");
                    break;
                }
                Some(command) = self.control_rx.recv() => {
                    self.handle_command(command).await;
                }
                request = self.intake_rx.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        info!("Sequencer intake closed");
                        break;
                    }
                },
            }
        }

        info!(
            queues = self.registry.len(),
            "Sequencer stopped, undrained queues abandoned"
        );
    }

    async fn handle_request(&mut self, request: SequencingRequest) {
        EngineStats::incr(&self.stats.requests_sequenced);

        match self.registry.enqueue(&request, Instant::now()) {
            EnqueueOutcome::Dispatch(queue) => {
                debug!(
                    client_id = request.client_id,
                    transaction_id = %request.transaction_id,
                    "Transaction queued, dispatching client queue"
                );
                self.dispatch(queue).await;
            }
            EnqueueOutcome::AlreadyScheduled => {
                debug!(
                    client_id = request.client_id,
                    transaction_id = %request.transaction_id,
                    "Transaction queued behind in-flight work"
                );
            }
            EnqueueOutcome::Parked => {
                debug!(
                    client_id = request.client_id,
                    transaction_id = %request.transaction_id,
                    "Client queue full, recovered transaction parked"
                );
                EngineStats::incr(&self.stats.requests_parked);
            }
            EnqueueOutcome::QueueFull => {
                warn!(
                    client_id = request.client_id,
                    transaction_id = %request.transaction_id,
                    "Client queue full, rejecting transaction"
                );
                EngineStats::incr(&self.stats.rejected_queue_full);
                self.reject(request);
            }
        }

        self.stats.set_active_queues(self.registry.len());
    }

    async fn handle_command(&mut self, command: SequencerCommand) {
        match command {
            SequencerCommand::Reap => {
                let outcome = self.registry.reap_idle(Instant::now(), self.idle_grace);

                for client_id in &outcome.removed {
                    info!(client_id = client_id, "Closing idle client queue");
                    EngineStats::incr(&self.stats.queues_reaped);
                }
                for queue in outcome.rescheduled {
                    warn!(
                        client_id = queue.client_id(),
                        pending = queue.len(),
                        "Idle client queue still holds work, redispatching"
                    );
                    self.dispatch(queue).await;
                }

                self.stats.set_active_queues(self.registry.len());
            }
        }
    }

    /// Publish a claimed queue to the workers
    ///
    /// Waits for channel capacity unless cancelled.
    async fn dispatch(&self, queue: DispatchToken) {
        let client_id = queue.client_id();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!(client_id = client_id, "Dispatch abandoned on shutdown");
            }
            result = self.dispatch_tx.send(queue) => match result {
                Ok(()) => EngineStats::incr(&self.stats.tokens_dispatched),
                Err(mpsc::error::SendError(queue)) => {
                    error!(client_id = client_id, "Dispatch channel closed");
                    queue.release();
                }
            },
        }
    }

    /// Resolve a rejected transaction to `error` off the control loop
    fn reject(&self, request: SequencingRequest) {
        let ledger = self.ledger.clone();
        tokio::spawn(async move {
            if let Err(e) = ledger.mark_error(&request.transaction_id).await {
                error!(
                    transaction_id = %request.transaction_id,
                    error = %e,
                    "Failed to mark rejected transaction as error"
                );
            }
        });
    }
}
