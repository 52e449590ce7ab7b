//! Transfer Sequencer - asynchronous money-transfer service
//!
//! Accepts client-to-client transfers, records them as `pending`, and
//! applies them in the background with per-client FIFO ordering and
//! fail-fast backpressure.
//!
//! # Modules
//!
//! - [`core_types`] - ClientId, TransactionId
//! - [`id_gen`] - Transaction id generation
//! - [`ledger`] - Storage contract with PostgreSQL and in-memory backends
//! - [`db`] - PostgreSQL connection pool
//! - [`sequencer`] - Per-client FIFO queues, control loop, idle reaper
//! - [`worker`] - Worker pool executing transfers
//! - [`intake`] - Admission validation and fail-fast sequencing
//! - [`recovery`] - Startup resubmission of pending transactions
//! - [`service`] - Wiring and lifecycle of the background loops
//! - [`gateway`] - HTTP boundary
//! - [`stats`] - Engine counters

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod id_gen;
pub mod intake;
pub mod ledger;
pub mod logging;
pub mod recovery;
pub mod sequencer;
pub mod service;
pub mod stats;
pub mod worker;

// Convenient re-exports at crate root
pub use config::{AppConfig, EngineConfig};
pub use core_types::{ClientId, TransactionId};
pub use error::TransferError;
pub use intake::Intake;
pub use ledger::{
    Client, InMemoryLedger, LedgerError, LedgerStore, PgLedger, Transaction, TransactionStatus,
};
pub use sequencer::{Admission, Sequencer, SequencerConfig, SequencerHandle, SequencingRequest};
pub use service::TransferService;
pub use stats::{EngineStats, EngineStatsSnapshot};
pub use worker::{Worker, WorkerConfig, WorkerPool};
