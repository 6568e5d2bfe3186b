// crates/server/src/sync_queue.rs
//! In-memory FIFO between the sync endpoint and the drain workers.
//!
//! Producers push under a short `std::sync::Mutex` critical section and never
//! touch storage. Consumers claim batches with [`SyncQueue::take_next`], a
//! single pop, so no batch is ever handed to two workers.
//!
//! Batches whose writes keep failing are moved to a separate parked list so
//! they stop cycling through the queue; the drain worker puts them back on
//! a slower cadence.
//!
//! Neither list is persisted: batches still queued when the process dies are
//! lost, and clients recover by resubmitting (writes are keyed by session id).

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use focuslog_core::{BatchOwner, SessionRecord};
use thiserror::Error;
use tokio::sync::Notify;

/// One accepted sync request waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub sync_id: String,
    pub user_id: String,
    pub device_id: String,
    pub records: Vec<SessionRecord>,
    /// Epoch seconds when the request was accepted.
    pub enqueued_at: i64,
    /// How many times this batch has been put back after failed writes.
    pub attempts: u32,
}

impl PendingBatch {
    pub fn new(
        sync_id: impl Into<String>,
        owner: BatchOwner,
        records: Vec<SessionRecord>,
        enqueued_at: i64,
    ) -> Self {
        Self {
            sync_id: sync_id.into(),
            user_id: owner.user_id,
            device_id: owner.device_id,
            records,
            enqueued_at,
            attempts: 0,
        }
    }

    /// A follow-up batch holding only `records`, one attempt further along.
    pub fn retry_with(&self, records: Vec<SessionRecord>) -> Self {
        Self {
            sync_id: self.sync_id.clone(),
            user_id: self.user_id.clone(),
            device_id: self.device_id.clone(),
            records,
            enqueued_at: self.enqueued_at,
            attempts: self.attempts + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Sync queue is full ({capacity} batches pending)")]
    Full { capacity: usize },
}

#[derive(Debug)]
pub struct SyncQueue {
    batches: Mutex<VecDeque<PendingBatch>>,
    parked: Mutex<Vec<PendingBatch>>,
    notify: Notify,
    /// Maximum queued batches; 0 means unbounded.
    capacity: usize,
}

impl SyncQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            parked: Mutex::new(Vec::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingBatch>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_parked(&self) -> MutexGuard<'_, Vec<PendingBatch>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a batch and wake a drain worker. Returns the number of records
    /// accepted; nothing is queued when the queue is at capacity.
    pub fn enqueue(&self, batch: PendingBatch) -> Result<usize, QueueError> {
        let accepted = batch.records.len();
        {
            let mut batches = self.lock();
            if self.capacity > 0 && batches.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            batches.push_back(batch);
        }
        self.notify.notify_one();
        Ok(accepted)
    }

    /// Put a batch back at the tail after a failed write. Ignores capacity so
    /// accepted records are never turned away.
    pub fn requeue(&self, batch: PendingBatch) {
        self.lock().push_back(batch);
    }

    /// Claim the oldest batch. The caller owns it exclusively from here on.
    pub fn take_next(&self) -> Option<PendingBatch> {
        self.lock().pop_front()
    }

    /// Queued batch count.
    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    /// Queued record count across all batches.
    pub fn pending_records(&self) -> usize {
        self.lock().iter().map(|b| b.records.len()).sum()
    }

    /// Set a batch aside after repeated write failures. Parked batches do not
    /// count towards capacity or depth.
    pub fn park(&self, batch: PendingBatch) {
        self.lock_parked().push(batch);
    }

    /// Remove and return every parked batch, oldest first.
    pub fn take_parked(&self) -> Vec<PendingBatch> {
        std::mem::take(&mut *self.lock_parked())
    }

    pub fn parked_batches(&self) -> usize {
        self.lock_parked().len()
    }

    pub fn parked_records(&self) -> usize {
        self.lock_parked().iter().map(|b| b.records.len()).sum()
    }

    /// Resolves after the next enqueue. Wakeups that arrive while nobody is
    /// waiting are kept, so a burst of enqueues collapses into one wake.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Wake every waiting worker, e.g. so they observe shutdown promptly.
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}
