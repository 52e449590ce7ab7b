//! Per-client transaction queue
//!
//! The part of a client's queue state that is shared between the sequencer
//! (producer) and whichever worker currently drains it (consumer). The
//! registry entry that owns it additionally tracks last activity, which only
//! the sequencer loop reads.
//!
//! # Ownership protocol
//!
//! `in_work` is the dispatch token's ownership bit. Whoever flips it
//! `false -> true` ([`ClientQueue::try_claim`]) owns the right to drain the
//! FIFO until it calls [`ClientQueue::release`]. The sequencer claims before
//! publishing a token; the reaper claims before removing an entry. Only the
//! owner pops, so at most one worker drains a client at a time.
//!
//! # Backlog
//!
//! Recovered transactions must not be rejected when the FIFO is full. They
//! are parked in an unbounded backlog behind the FIFO and moved into it as
//! the owner pops. While the backlog is non-empty every new id goes behind
//! it (or is rejected on the fail-fast path), so FIFO order is kept.

use std::collections::VecDeque;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;
use tokio::sync::{Mutex, MutexGuard};

use crate::core_types::{ClientId, TransactionId};

/// Where [`ClientQueue::push_or_park`] put an id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    Parked,
}

/// Bounded FIFO of transaction ids for one client
pub struct ClientQueue {
    client_id: ClientId,
    pending: ArrayQueue<TransactionId>,
    /// Overflow from waiting submissions; only the sequencer loop appends
    backlog: std::sync::Mutex<VecDeque<TransactionId>>,
    backlog_len: AtomicUsize,
    /// Serializes transfer execution for this client
    execution: Mutex<()>,
    in_work: AtomicBool,
    closed: AtomicBool,
}

impl ClientQueue {
    /// # Panics
    /// If `capacity` is zero (rejected earlier by config validation)
    pub fn new(client_id: ClientId, capacity: usize) -> Self {
        Self {
            client_id,
            pending: ArrayQueue::new(capacity),
            backlog: std::sync::Mutex::new(VecDeque::new()),
            backlog_len: AtomicUsize::new(0),
            execution: Mutex::new(()),
            in_work: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Non-blocking push; hands the id back when the FIFO is full, a
    /// backlog is waiting ahead of it, or the queue is closed
    pub fn try_push(&self, id: TransactionId) -> Result<(), TransactionId> {
        if self.is_closed() || self.parked() > 0 {
            return Err(id);
        }
        self.pending.push(id)
    }

    /// Push, parking the id in the backlog when the FIFO is full
    ///
    /// Fails only on a closed queue.
    pub fn push_or_park(&self, id: TransactionId) -> Result<Pushed, TransactionId> {
        if self.is_closed() {
            return Err(id);
        }
        let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        let pushed = if backlog.is_empty() {
            match self.pending.push(id) {
                Ok(()) => Pushed::Queued,
                Err(id) => {
                    backlog.push_back(id);
                    Pushed::Parked
                }
            }
        } else {
            backlog.push_back(id);
            Pushed::Parked
        };
        self.backlog_len.store(backlog.len(), Ordering::Release);
        Ok(pushed)
    }

    /// Non-blocking pop in FIFO order, refilling from the backlog
    pub fn pop(&self) -> Option<TransactionId> {
        let id = self.pending.pop();
        if self.parked() > 0 {
            self.refill();
        }
        id.or_else(|| self.pending.pop())
    }

    fn refill(&self) {
        let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(id) = backlog.pop_front() {
            if let Err(id) = self.pending.push(id) {
                backlog.push_front(id);
                break;
            }
        }
        self.backlog_len.store(backlog.len(), Ordering::Release);
    }

    /// Ids waiting in the backlog
    #[inline]
    pub fn parked(&self) -> usize {
        self.backlog_len.load(Ordering::Acquire)
    }

    /// Queued ids, backlog included
    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len() + self.parked()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.parked() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.pending.capacity()
    }

    /// Take ownership of the queue (`in_work: false -> true`)
    ///
    /// Returns false if someone else already owns it.
    pub fn try_claim(&self) -> bool {
        self.in_work
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Give up ownership (`in_work = false`)
    pub fn release(&self) {
        self.in_work.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_in_work(&self) -> bool {
        self.in_work.load(Ordering::Acquire)
    }

    /// No further writes are expected (set by the reaper on removal)
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hold for the duration of one transfer's storage operations, never
    /// across a wait for the next dispatch token.
    pub async fn lock_execution(&self) -> MutexGuard<'_, ()> {
        self.execution.lock().await
    }
}

impl std::fmt::Debug for ClientQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientQueue")
            .field("client_id", &self.client_id)
            .field("len", &self.len())
            .field("parked", &self.parked())
            .field("capacity", &self.capacity())
            .field("in_work", &self.is_in_work())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_capacity() {
        let queue = ClientQueue::new(7, 3);
        for id in ["a", "b", "c"] {
            queue.try_push(TransactionId::from(id)).unwrap();
        }
        assert_eq!(
            queue.try_push(TransactionId::from("d")),
            Err(TransactionId::from("d"))
        );
        assert_eq!(queue.len(), 3);

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(
            drained,
            vec![
                TransactionId::from("a"),
                TransactionId::from("b"),
                TransactionId::from("c")
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let queue = ClientQueue::new(1, 3);
        assert!(queue.try_claim());
        assert!(!queue.try_claim());
        assert!(queue.is_in_work());
        queue.release();
        assert!(!queue.is_in_work());
        assert!(queue.try_claim());
    }

    #[test]
    fn test_closed_queue_rejects_push() {
        let queue = ClientQueue::new(1, 3);
        queue.close();
        assert!(queue.try_push(TransactionId::from("a")).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_backlog_keeps_fifo_order() {
        let queue = ClientQueue::new(1, 2);
        for id in ["a", "b", "c", "d"] {
            queue.push_or_park(TransactionId::from(id)).unwrap();
        }
        assert_eq!(queue.parked(), 2);
        assert_eq!(queue.len(), 4);

        // Fail-fast pushes may not overtake the backlog
        assert!(queue.try_push(TransactionId::from("x")).is_err());

        assert_eq!(queue.pop(), Some(TransactionId::from("a")));
        assert_eq!(queue.parked(), 1);
        assert_eq!(
            queue.push_or_park(TransactionId::from("e")),
            Ok(Pushed::Parked)
        );

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(
            drained,
            ["b", "c", "d", "e"].map(TransactionId::from).to_vec()
        );
        assert!(queue.is_empty());
        assert_eq!(queue.push_or_park(TransactionId::from("f")), Ok(Pushed::Queued));
        assert!(queue.try_push(TransactionId::from("g")).is_ok());
    }

    #[test]
    fn test_closed_queue_rejects_park() {
        let queue = ClientQueue::new(1, 1);
        queue.close();
        assert!(queue.push_or_park(TransactionId::from("a")).is_err());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_execution_lock_is_exclusive() {
        let queue = ClientQueue::new(1, 3);
        let guard = queue.lock_execution().await;
        assert!(queue.execution.try_lock().is_err());
        drop(guard);
        assert!(queue.execution.try_lock().is_ok());
    }
}
