//! One user's pending work, plus the non-reentrant flag that keeps the dispatcher from ever
//! running two of that user's transcriptions at once.
//!
//! `tryAcquire` has to be a non-blocking CAS, not a lock: the dispatcher scans every user's
//! queue in a single loop and must be able to skip a busy user instantly rather than wait on it.
//! An `AtomicBool` gives us exactly that; the `VecDeque` behind `parking_lot::Mutex` never needs
//! to be held across an await point, so a blocking mutex is the right tool.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// One pending transcription request.
pub(crate) struct WorkItem {
    pub(crate) sequence_id: u32,
    pub(crate) payload: Vec<u8>,
    pub(crate) enqueued_at: Instant,
}

/// FIFO of pending [`WorkItem`]s for a single user, plus the in-flight flag that serializes
/// that user's tasks.
#[derive(Clone)]
pub(crate) struct PerUserQueue(Arc<Inner>);

struct Inner {
    items: Mutex<VecDeque<WorkItem>>,
    in_flight: AtomicBool,
}

impl PerUserQueue {
    /// A new, empty queue with no task in flight.
    pub(crate) fn new() -> Self {
        Self(Arc::new(Inner {
            items: Mutex::new(VecDeque::new()),
            in_flight: AtomicBool::new(false),
        }))
    }

    /// Appends `item` to the back of the queue.
    pub(crate) fn enqueue(&self, item: WorkItem) {
        self.0.items.lock().push_back(item);
    }

    /// Returns `true` and marks this queue in-flight iff it was not already in-flight.
    ///
    /// Non-blocking: callers that lose the race move on to another user instead of waiting.
    pub(crate) fn try_acquire(&self) -> bool {
        self.0
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clears the in-flight flag, allowing the next item for this user to start.
    pub(crate) fn release(&self) {
        self.0.in_flight.store(false, Ordering::Release);
    }

    /// Pops the next item in FIFO order, if any.
    pub(crate) fn dequeue(&self) -> Option<WorkItem> {
        self.0.items.lock().pop_front()
    }

    /// `true` iff there is at least one pending item.
    pub(crate) fn has_pending(&self) -> bool {
        !self.0.items.lock().is_empty()
    }

    /// Discards every pending item, e.g. because the owning session closed.
    ///
    /// No refund, no retry: items dropped here simply vanish.
    pub(crate) fn clear(&self) {
        self.0.items.lock().clear();
    }
}

/// Wakes the dispatcher's scan loop. Shared across all of a process's per-user queues: any
/// enqueue, or any task completion freeing up a concurrency slot, should prompt a rescan.
#[derive(Clone, Default)]
pub(crate) struct DispatchNotify(Arc<Notify>);

impl DispatchNotify {
    pub(crate) fn notify(&self) {
        self.0.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.0.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(sequence_id: u32) -> WorkItem {
        WorkItem {
            sequence_id,
            payload: vec![0u8; 4],
            enqueued_at: Instant::now(),
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let queue = PerUserQueue::new();
        queue.enqueue(item(1));
        queue.enqueue(item(2));
        queue.enqueue(item(3));
        assert_eq!(queue.dequeue().unwrap().sequence_id, 1);
        assert_eq!(queue.dequeue().unwrap().sequence_id, 2);
        assert_eq!(queue.dequeue().unwrap().sequence_id, 3);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn try_acquire_is_non_reentrant() {
        let queue = PerUserQueue::new();
        assert!(queue.try_acquire());
        assert!(!queue.try_acquire());
        queue.release();
        assert!(queue.try_acquire());
    }

    #[test]
    fn clear_discards_pending_items() {
        let queue = PerUserQueue::new();
        queue.enqueue(item(1));
        queue.enqueue(item(2));
        queue.clear();
        assert!(queue.dequeue().is_none());
        assert!(!queue.has_pending());
    }
}
