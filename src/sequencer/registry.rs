//! Queue registry
//!
//! Maps client id to its [`ClientQueue`] and last-activity instant. Owned by
//! the sequencer control loop: every method takes `&mut self` and the loop is
//! the only caller, so there is no registry-wide lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::queue::{ClientQueue, Pushed};
use super::{Admission, SequencingRequest};
use crate::core_types::ClientId;

struct RegistryEntry {
    queue: Arc<ClientQueue>,
    last_activity: Instant,
}

/// Result of [`QueueRegistry::enqueue`]
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// Queue was idle and is now claimed: publish this token
    Dispatch(Arc<ClientQueue>),
    /// A token for this client is already outstanding
    AlreadyScheduled,
    /// FIFO full; the id waits in the queue's backlog for a worker to drain
    Parked,
    /// Per-client backlog limit reached; the id was not queued
    QueueFull,
}

/// Result of [`QueueRegistry::reap_idle`]
#[derive(Debug, Default)]
pub struct ReapOutcome {
    pub removed: Vec<ClientId>,
    /// Idle queues found holding ids; claimed and must be dispatched
    pub rescheduled: Vec<Arc<ClientQueue>>,
}

pub struct QueueRegistry {
    entries: FxHashMap<ClientId, RegistryEntry>,
    fifo_capacity: usize,
}

impl QueueRegistry {
    pub fn new(fifo_capacity: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            fifo_capacity,
        }
    }

    /// Queue `request` on its client's FIFO
    pub fn enqueue(&mut self, request: &SequencingRequest, now: Instant) -> EnqueueOutcome {
        let capacity = self.fifo_capacity;
        let entry = self
            .entries
            .entry(request.client_id)
            .or_insert_with(|| RegistryEntry {
                queue: Arc::new(ClientQueue::new(request.client_id, capacity)),
                last_activity: now,
            });
        entry.last_activity = now;

        let id = request.transaction_id.clone();
        let pushed = match request.admission {
            Admission::FailFast => entry.queue.try_push(id).map(|()| Pushed::Queued),
            Admission::Wait => entry.queue.push_or_park(id),
        };
        let Ok(pushed) = pushed else {
            return EnqueueOutcome::QueueFull;
        };

        if entry.queue.try_claim() {
            EnqueueOutcome::Dispatch(entry.queue.clone())
        } else if pushed == Pushed::Parked {
            EnqueueOutcome::Parked
        } else {
            EnqueueOutcome::AlreadyScheduled
        }
    }

    /// Remove queues idle for at least `grace` that nobody is draining
    ///
    /// The queue is claimed before removal so no worker can pick it up
    /// concurrently; a claimed queue that still holds ids is handed back for
    /// dispatch instead of being dropped.
    pub fn reap_idle(&mut self, now: Instant, grace: Duration) -> ReapOutcome {
        let mut outcome = ReapOutcome::default();

        for (client_id, entry) in &self.entries {
            if now.saturating_duration_since(entry.last_activity) < grace {
                continue;
            }
            if !entry.queue.try_claim() {
                continue;
            }
            if entry.queue.is_empty() {
                entry.queue.close();
                outcome.removed.push(*client_id);
            } else {
                outcome.rescheduled.push(entry.queue.clone());
            }
        }

        for client_id in &outcome.removed {
            self.entries.remove(client_id);
        }
        outcome
    }

    pub fn get(&self, client_id: ClientId) -> Option<&Arc<ClientQueue>> {
        self.entries.get(&client_id).map(|e| &e.queue)
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.entries.contains_key(&client_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
