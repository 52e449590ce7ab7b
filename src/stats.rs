//! Engine counters
//!
//! Lock-free counters shared by the sequencer loop and the worker pool.
//! Written with `Relaxed` ordering; they are observability, not
//! synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineStats {
    /// Requests taken off the intake channel
    pub requests_sequenced: AtomicU64,
    /// Dispatch tokens published to workers
    pub tokens_dispatched: AtomicU64,
    /// Requests rejected because the client's FIFO was full
    pub rejected_queue_full: AtomicU64,
    /// Recovered requests parked behind a full FIFO
    pub requests_parked: AtomicU64,
    /// Idle client queues removed by the reaper
    pub queues_reaped: AtomicU64,
    /// Current registry size (gauge)
    pub active_queues: AtomicU64,
    /// Transfers applied by workers
    pub transfers_completed: AtomicU64,
    /// Transfers marked `error` by workers
    pub transfers_failed: AtomicU64,
    /// Dispatched ids skipped (missing or already resolved)
    pub transfers_skipped: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_active_queues(&self, n: usize) {
        self.active_queues.store(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            requests_sequenced: self.requests_sequenced.load(Ordering::Relaxed),
            tokens_dispatched: self.tokens_dispatched.load(Ordering::Relaxed),
            rejected_queue_full: self.rejected_queue_full.load(Ordering::Relaxed),
            requests_parked: self.requests_parked.load(Ordering::Relaxed),
            queues_reaped: self.queues_reaped.load(Ordering::Relaxed),
            active_queues: self.active_queues.load(Ordering::Relaxed),
            transfers_completed: self.transfers_completed.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            transfers_skipped: self.transfers_skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStatsSnapshot {
    pub requests_sequenced: u64,
    pub tokens_dispatched: u64,
    pub rejected_queue_full: u64,
    pub requests_parked: u64,
    pub queues_reaped: u64,
    pub active_queues: u64,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub transfers_skipped: u64,
}

impl std::fmt::Display for EngineStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Engine Stats: sequenced={}, dispatched={}, rejected_full={}, parked={}, queues={} (reaped={}), completed={}, failed={}, skipped={}",
            self.requests_sequenced,
            self.tokens_dispatched,
            self.rejected_queue_full,
            self.requests_parked,
            self.active_queues,
            self.queues_reaped,
            self.transfers_completed,
            self.transfers_failed,
            self.transfers_skipped
        )
    }
}
