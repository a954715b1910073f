//! Sync Queue — bounded hand-off between the tick and the sync worker.
//!
//! The simulation thread only ever calls [`SyncQueue::push`], which never
//! blocks: when the queue is at capacity the new batch is dropped and
//! counted. The worker task pops batches in FIFO order and reports each
//! delivery outcome back so the statistics cover the whole pipeline.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::error::SyncError;
use crate::types::SyncBatch;

/// Statistics about the sync queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Current queue depth.
    pub depth: usize,
    /// Total batches accepted.
    pub total_enqueued: u64,
    /// Total batches dropped because the queue was full.
    pub total_dropped: u64,
    /// Total batches delivered.
    pub total_sent: u64,
    /// Total batches discarded after exhausting retries.
    pub total_failed: u64,
}

struct SyncQueueInner {
    pending: VecDeque<SyncBatch>,
    capacity: usize,
    total_enqueued: u64,
    total_dropped: u64,
    total_sent: u64,
    total_failed: u64,
}

/// Thread-safe bounded FIFO of outgoing batches. Clones share state.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<Mutex<SyncQueueInner>>,
    ready: Arc<Notify>,
}

impl SyncQueue {
    /// Create a queue holding at most `capacity` pending batches.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SyncQueueInner {
                pending: VecDeque::new(),
                capacity: capacity.max(1),
                total_enqueued: 0,
                total_dropped: 0,
                total_sent: 0,
                total_failed: 0,
            })),
            ready: Arc::new(Notify::new()),
        }
    }

    /// Enqueue a batch without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueFull`] (and drops the batch) at capacity.
    pub fn push(&self, batch: SyncBatch) -> Result<(), SyncError> {
        {
            let mut inner = self.inner.lock();
            if inner.pending.len() >= inner.capacity {
                inner.total_dropped += 1;
                let depth = inner.pending.len();
                drop(inner);
                warn!(agent = %batch.agent, tick = batch.tick, depth, "Sync queue full, dropping batch");
                return Err(SyncError::QueueFull(depth));
            }
            inner.pending.push_back(batch);
            inner.total_enqueued += 1;
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Take the oldest pending batch.
    pub fn pop(&self) -> Option<SyncBatch> {
        self.inner.lock().pending.pop_front()
    }

    /// Wait until a batch may be available.
    pub async fn ready(&self) {
        self.ready.notified().await;
    }

    /// Record a delivered batch.
    pub fn mark_sent(&self) {
        self.inner.lock().total_sent += 1;
    }

    /// Record a batch discarded after its retries.
    pub fn mark_failed(&self) {
        self.inner.lock().total_failed += 1;
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Get queue statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            depth: inner.pending.len(),
            total_enqueued: inner.total_enqueued,
            total_dropped: inner.total_dropped,
            total_sent: inner.total_sent,
            total_failed: inner.total_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnema_core::types::AgentId;

    fn batch(tick: u64) -> SyncBatch {
        SyncBatch::new(AgentId(1), tick)
    }

    #[test]
    fn fifo_order() {
        let queue = SyncQueue::new(8);
        queue.push(batch(1)).expect("push");
        queue.push(batch(2)).expect("push");

        assert_eq!(queue.pop().expect("first").tick, 1);
        assert_eq!(queue.pop().expect("second").tick, 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn full_queue_drops_new_batch() {
        let queue = SyncQueue::new(2);
        queue.push(batch(1)).expect("push");
        queue.push(batch(2)).expect("push");

        assert!(matches!(queue.push(batch(3)), Err(SyncError::QueueFull(2))));
        let stats = queue.stats();
        assert_eq!(stats.total_dropped, 1);
        assert_eq!(stats.total_enqueued, 2);
        assert_eq!(queue.pop().expect("oldest kept").tick, 1);
    }

    #[test]
    fn stats_tracking() {
        let queue = SyncQueue::new(8);
        queue.push(batch(1)).expect("push");
        queue.push(batch(2)).expect("push");
        queue.pop();
        queue.mark_sent();
        queue.pop();
        queue.mark_failed();

        let stats = queue.stats();
        assert_eq!(stats.depth, 0);
        assert_eq!(stats.total_sent, 1);
        assert_eq!(stats.total_failed, 1);
    }

    #[test]
    fn clone_shares_state() {
        let queue1 = SyncQueue::new(4);
        let queue2 = queue1.clone();
        queue1.push(batch(1)).expect("push");
        assert_eq!(queue2.len(), 1);
        assert!(!queue2.is_empty());
    }
}
