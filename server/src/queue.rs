//! Time-windowed queue of discovery targets
//!
//! Every entry may carry a lower bound (do not hand out before) and an upper
//! bound (drop if still queued after). The queue handles:
//! - Rotation of not yet ready entries so they never block ready ones
//! - Silent expiry of entries whose window has passed
//! - Batched popping for the worker pool feeder
//!
//! Insertion order defines the scan order. Entries that become ready together
//! keep their relative order; there is no global FIFO guarantee across
//! entries with different windows.

use crate::metrics::DiscoveryMetrics;
use shared::ProbeTarget;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Nothing is queued at all, stop polling
    #[error("queue is empty")]
    Empty,
    /// Entries are queued but none of them is ready yet, poll again soon
    #[error("no queued entry is ready yet")]
    NotReady,
    #[error("queue is full ({0} entries)")]
    Full(usize),
}

/// A queued item together with its time window
#[derive(Debug, Clone)]
pub struct QueueEntry<T> {
    pub item: T,
    pub not_before: Option<Instant>,
    pub not_after: Option<Instant>,
}

impl<T> QueueEntry<T> {
    fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |not_before| now >= not_before)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.not_after.map_or(false, |not_after| now > not_after)
    }
}

/// The queue itself; callers supply the current time to every scan
#[derive(Debug)]
pub struct TargetQueue<T> {
    entries: VecDeque<QueueEntry<T>>,
    capacity: Option<usize>,
    /// Entries dropped by `pop` since the last `take_expired`
    expired: usize,
}

impl<T> Default for TargetQueue<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> TargetQueue<T> {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            expired: 0,
        }
    }

    /// Queues an item without any time constraint.
    pub fn add(&mut self, item: T) -> Result<(), QueueError> {
        self.add_between(item, None, None)
    }

    /// Queues an item that becomes visible at `not_before` and is dropped after `not_after`.
    pub fn add_between(
        &mut self,
        item: T,
        not_before: Option<Instant>,
        not_after: Option<Instant>,
    ) -> Result<(), QueueError> {
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                return Err(QueueError::Full(capacity));
            }
        }
        self.entries.push_back(QueueEntry {
            item,
            not_before,
            not_after,
        });
        Ok(())
    }

    /// Pops the first ready entry.
    ///
    /// Expired entries met on the way are dropped, not yet ready ones are moved
    /// to the back. At most one full pass is made, so a queue holding only
    /// waiting entries reports `NotReady` instead of spinning.
    pub fn pop(&mut self, now: Instant) -> Result<T, QueueError> {
        let len = self.entries.len();

        for _ in 0..len {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            if entry.is_expired(now) {
                self.expired += 1;
                continue;
            }
            if !entry.is_ready(now) {
                self.entries.push_back(entry);
                continue;
            }
            return Ok(entry.item);
        }

        if self.entries.is_empty() {
            Err(QueueError::Empty)
        } else {
            Err(QueueError::NotReady)
        }
    }

    /// Pops the front entry regardless of its window.
    pub fn pop_any(&mut self) -> Result<T, QueueError> {
        self.entries
            .pop_front()
            .map(|entry| entry.item)
            .ok_or(QueueError::Empty)
    }

    /// Pops up to `count` ready entries in a single pass.
    ///
    /// Returns the popped items and the number of expired entries dropped.
    /// Not yet ready entries are moved to the back in their relative order.
    pub fn pop_many(&mut self, count: usize, now: Instant) -> (Vec<T>, usize) {
        let mut items = Vec::new();
        let mut waiting = Vec::new();
        let mut expired = 0;
        let len = self.entries.len();

        for _ in 0..len {
            if items.len() >= count {
                break;
            }
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            if entry.is_expired(now) {
                expired += 1;
            } else if !entry.is_ready(now) {
                waiting.push(entry);
            } else {
                items.push(entry.item);
            }
        }

        self.entries.extend(waiting);
        (items, expired)
    }

    /// Returns and resets the number of entries `pop` dropped as expired.
    pub fn take_expired(&mut self) -> usize {
        std::mem::take(&mut self.expired)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to the probe target queue
///
/// Cloning is cheap; all clones operate on the same queue. Expired entries and
/// successful additions are reported to the metrics.
#[derive(Clone)]
pub struct ProbeQueue {
    inner: Arc<Mutex<TargetQueue<ProbeTarget>>>,
    metrics: Arc<dyn DiscoveryMetrics>,
}

impl ProbeQueue {
    pub fn new(capacity: Option<usize>, metrics: Arc<dyn DiscoveryMetrics>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TargetQueue::new(capacity))),
            metrics,
        }
    }

    pub async fn add(&self, target: ProbeTarget) -> Result<(), QueueError> {
        self.add_between(target, None, None).await
    }

    pub async fn add_between(
        &self,
        target: ProbeTarget,
        not_before: Option<Instant>,
        not_after: Option<Instant>,
    ) -> Result<(), QueueError> {
        let goal = target.goal;
        self.inner
            .lock()
            .await
            .add_between(target, not_before, not_after)?;
        self.metrics.target_enqueued(goal);
        Ok(())
    }

    pub async fn pop(&self) -> Result<ProbeTarget, QueueError> {
        let (result, expired) = {
            let mut queue = self.inner.lock().await;
            let result = queue.pop(Instant::now());
            (result, queue.take_expired())
        };
        if expired > 0 {
            self.metrics.targets_expired(expired);
        }
        result
    }

    pub async fn pop_any(&self) -> Result<ProbeTarget, QueueError> {
        self.inner.lock().await.pop_any()
    }

    pub async fn pop_many(&self, count: usize) -> (Vec<ProbeTarget>, usize) {
        let (targets, expired) = self.inner.lock().await.pop_many(count, Instant::now());
        if expired > 0 {
            self.metrics.targets_expired(expired);
        }
        (targets, expired)
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
