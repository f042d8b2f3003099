use std::{
    collections::VecDeque,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::Notify;

/// Bounded FIFO of state snapshots with latest-wins overflow.
///
/// Producers never block: when the queue is full the oldest snapshot is dropped to make
/// room for the newest. A single consumer waits on [`SnapshotQueue::notified`].
pub struct SnapshotQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> SnapshotQueue<T> {
    /// Create a queue holding at most `capacity` snapshots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panicking producer cannot leave the deque half-updated
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a snapshot, evicting the oldest one when full.
    ///
    /// Returns `true` when an older snapshot was evicted.
    pub fn push(&self, item: T) -> bool {
        let evicted = {
            let mut items = self.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front();
                true
            } else {
                false
            };
            items.push_back(item);
            evicted
        };
        if evicted {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(
                "Snapshot queue full (capacity {}), dropped oldest entry ({} dropped so far)",
                self.capacity,
                total
            );
        }
        self.notify.notify_one();
        evicted
    }

    /// Append a snapshot only if nothing is queued yet.
    ///
    /// Returns `false` and discards `item` when the queue already holds a snapshot.
    pub fn push_if_empty(&self, item: T) -> bool {
        {
            let mut items = self.lock();
            if !items.is_empty() {
                return false;
            }
            items.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Take the oldest queued snapshot
    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Discard every queued snapshot
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of snapshots evicted by overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until a producer pushes.
    ///
    /// A push made while nobody waits is remembered, so a consumer that checked the
    /// queue and found it empty does not miss it.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
