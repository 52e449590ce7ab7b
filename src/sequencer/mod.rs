//! Sequencer
//!
//! Per-client FIFO queueing between admission and the worker pool.
//!
//! ```text
//! Intake ──try_send──▶ [intake ch] ──▶ Sequencer loop ──▶ [dispatch ch] ──▶ Workers
//!                                        │  ▲                                  │
//!                                registry│  │Reap                              │
//!                                        ▼  │                                  ▼
//!                               client → ClientQueue ◀──── IdleReaper     LedgerStore
//! ```
//!
//! # Guarantees
//!
//! 1. **FIFO per client**: ids are drained in the order the loop received them
//! 2. **Single drainer**: one outstanding dispatch token per client (the
//!    queue's in-work bit), plus the per-client execution mutex
//! 3. **Single writer**: only the control loop touches the registry; the
//!    reaper asks for reaping by message
//! 4. **Fail fast**: a full intake channel or a full client FIFO rejects the
//!    transfer instead of blocking the caller
//! 5. **Recovery waits**: recovered ids are parked behind a full FIFO instead
//!    of being rejected (see [`Admission::Wait`])

pub mod manager;
pub mod queue;
pub mod reaper;
pub mod registry;

pub use manager::{
    DispatchReceiver, Sequencer, SequencerCommand, SequencerConfig, SequencerHandle, SubmitError,
};
pub use queue::{ClientQueue, Pushed};
pub use reaper::IdleReaper;
pub use registry::{EnqueueOutcome, QueueRegistry, ReapOutcome};

use std::sync::Arc;

use crate::core_types::{ClientId, TransactionId};

/// What the sequencer does when the client FIFO is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Admission {
    /// Reject the transaction (fresh transfers)
    #[default]
    FailFast,
    /// Park it behind the FIFO (recovered transfers)
    Wait,
}

/// Unit handed from intake (or recovery) to the sequencer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencingRequest {
    pub client_id: ClientId,
    pub transaction_id: TransactionId,
    pub admission: Admission,
}

impl SequencingRequest {
    pub fn new(client_id: ClientId, transaction_id: TransactionId) -> Self {
        Self {
            client_id,
            transaction_id,
            admission: Admission::FailFast,
        }
    }

    /// Request for a transaction found `pending` at startup
    pub fn recovered(client_id: ClientId, transaction_id: TransactionId) -> Self {
        Self {
            admission: Admission::Wait,
            ..Self::new(client_id, transaction_id)
        }
    }
}

/// "This client has pending work": a reference to its queue
pub type DispatchToken = Arc<ClientQueue>;
