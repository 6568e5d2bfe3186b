// crates/server/src/drain.rs
//! Background writer that moves queued sync batches into storage.
//!
//! Each batch is split into chunks; every chunk is one insert-if-absent
//! transaction bounded by a timeout and retried with exponential backoff.
//! A chunk that keeps failing does not stop the rest of its batch. Its
//! records are put back on the queue as a follow-up batch, until the batch
//! has been requeued too often and is parked. Parked batches stay in memory
//! and are retried on a slower cadence and once more during the shutdown
//! flush.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use focuslog_core::SessionRecord;
use focuslog_db::{Database, DbError, DbResult, InsertOutcome, SyncLogEntry, MAX_SESSIONS_PER_STATEMENT};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::sync_queue::{PendingBatch, SyncQueue};

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// The storage operations the drain worker needs.
#[async_trait]
pub trait SyncStore: Send + Sync + 'static {
    /// Insert records whose ids are not yet stored, as one transaction.
    async fn insert_sessions(&self, records: &[SessionRecord]) -> DbResult<InsertOutcome>;

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> DbResult<()>;
}

#[async_trait]
impl SyncStore for Database {
    async fn insert_sessions(&self, records: &[SessionRecord]) -> DbResult<InsertOutcome> {
        self.insert_sessions_if_absent(records).await
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> DbResult<()> {
        Database::append_sync_log(self, entry).await
    }
}

#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Wake at least this often even without enqueue notifications.
    pub interval: Duration,
    pub workers: usize,
    /// Records per chunk transaction.
    pub chunk_size: usize,
    pub chunk_timeout: Duration,
    /// Attempts per chunk (and per sync-log write), including the first.
    pub max_chunk_attempts: u32,
    /// Follow-up batches allowed before the remainder is parked.
    pub max_batch_requeues: u32,
    /// How often parked batches are put back on the queue.
    pub parked_retry_interval: Duration,
    /// How long shutdown may spend flushing the queue.
    pub shutdown_flush: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            workers: 1,
            chunk_size: MAX_SESSIONS_PER_STATEMENT,
            chunk_timeout: Duration::from_secs(10),
            max_chunk_attempts: 3,
            max_batch_requeues: 5,
            parked_retry_interval: Duration::from_secs(60),
            shutdown_flush: Duration::from_secs(10),
        }
    }
}

/// Delay before retry number `attempt` (1-based): 100 ms doubling, capped at 5 s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_CAP)
}

#[derive(Debug, Error)]
pub enum WriteFailure {
    #[error("{0}")]
    Store(#[from] DbError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Lifetime counters, readable without locks while workers update them.
#[derive(Debug, Default)]
pub struct DrainStats {
    batches_drained: AtomicU64,
    sessions_inserted: AtomicU64,
    sessions_duplicate: AtomicU64,
    chunk_failures: AtomicU64,
    batches_requeued: AtomicU64,
    batches_parked: AtomicU64,
    sessions_parked: AtomicU64,
    last_drain_at: AtomicI64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainStatsSnapshot {
    pub batches_drained: u64,
    pub sessions_inserted: u64,
    pub sessions_duplicate: u64,
    pub chunk_failures: u64,
    pub batches_requeued: u64,
    pub batches_parked: u64,
    pub sessions_parked: u64,
    /// Epoch seconds of the last completed drain pass, if any.
    pub last_drain_at: Option<i64>,
}

impl DrainStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DrainStatsSnapshot {
        let last = self.last_drain_at.load(Ordering::Relaxed);
        DrainStatsSnapshot {
            batches_drained: self.batches_drained.load(Ordering::Relaxed),
            sessions_inserted: self.sessions_inserted.load(Ordering::Relaxed),
            sessions_duplicate: self.sessions_duplicate.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
            batches_requeued: self.batches_requeued.load(Ordering::Relaxed),
            batches_parked: self.batches_parked.load(Ordering::Relaxed),
            sessions_parked: self.sessions_parked.load(Ordering::Relaxed),
            last_drain_at: (last > 0).then_some(last),
        }
    }
}

/// What happened to the records of a failed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leftover {
    None,
    Requeued(usize),
    Parked(usize),
}

/// Summary of one pass over one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub sync_id: String,
    pub outcome: InsertOutcome,
    pub logged: bool,
    pub leftover: Leftover,
}

/// Records committed during a pass, with their start-time range.
#[derive(Debug, Default)]
struct Committed {
    outcome: InsertOutcome,
    min_start: Option<i64>,
    max_start: Option<i64>,
}

impl Committed {
    fn add(&mut self, chunk: &[SessionRecord], outcome: InsertOutcome) {
        self.outcome += outcome;
        for r in chunk {
            self.min_start = Some(self.min_start.map_or(r.start_time, |m| m.min(r.start_time)));
            self.max_start = Some(self.max_start.map_or(r.start_time, |m| m.max(r.start_time)));
        }
    }
}

/// Outcome of the shutdown flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub drained_batches: usize,
    pub abandoned_batches: usize,
    pub abandoned_records: usize,
}

pub struct DrainWorker<S: SyncStore> {
    store: Arc<S>,
    queue: Arc<SyncQueue>,
    stats: Arc<DrainStats>,
    config: DrainConfig,
}

impl<S: SyncStore> DrainWorker<S> {
    pub fn new(
        store: Arc<S>,
        queue: Arc<SyncQueue>,
        stats: Arc<DrainStats>,
        mut config: DrainConfig,
    ) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        config.max_chunk_attempts = config.max_chunk_attempts.max(1);
        config.workers = config.workers.max(1);
        Self {
            store,
            queue,
            stats,
            config,
        }
    }

    pub fn config(&self) -> &DrainConfig {
        &self.config
    }

    /// Start `config.workers` drain loops sharing this worker.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.config.workers)
            .map(|id| {
                let worker = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(id, cancel).await })
            })
            .collect()
    }

    /// Drain loop: wake on the interval or an enqueue, drain, repeat.
    ///
    /// Cancellation is observed between batches and while a batch is being
    /// written; an interrupted batch goes back on the queue for the flush.
    pub async fn run(&self, worker_id: usize, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut parked_ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.parked_retry_interval,
            self.config.parked_retry_interval,
        );
        parked_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(worker_id, "Drain worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.queue.notified() => {}
                _ = parked_ticker.tick() => {
                    self.retry_parked();
                }
            }
            let drained = self.drain_until(&cancel).await;
            if drained > 0 {
                debug!(worker_id, drained, "Drain pass complete");
            }
        }

        info!(worker_id, "Drain worker stopped");
    }

    /// Drain the batches queued when the pass starts. Batches requeued during
    /// the pass wait for the next wake so a failing store is not hammered.
    pub async fn drain_pending(&self) -> usize {
        self.drain_until(&CancellationToken::new()).await
    }

    async fn drain_until(&self, cancel: &CancellationToken) -> usize {
        let budget = self.queue.depth();
        let mut drained = 0;
        while drained < budget && !cancel.is_cancelled() {
            let Some(batch) = self.queue.take_next() else {
                break;
            };
            let finished = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = self.write_batch(&batch) => true,
            };
            if !finished {
                // Inserts are keyed by session id, so replaying the whole
                // batch later only turns committed chunks into duplicates.
                warn!(sync_id = %batch.sync_id, records = batch.records.len(), "Drain interrupted, batch returned to queue");
                self.queue.requeue(batch);
                break;
            }
            drained += 1;
        }
        metrics::record_queue_depth(self.queue.depth());
        drained
    }

    /// Move every parked batch back onto the queue. A batch that fails again
    /// is parked again.
    pub fn retry_parked(&self) -> usize {
        let parked = self.queue.take_parked();
        let count = parked.len();
        for batch in parked {
            self.queue.requeue(batch);
        }
        if count > 0 {
            info!(batches = count, "Retrying parked batches");
        }
        count
    }

    /// Write one batch, log it, and requeue or park whatever failed.
    pub async fn drain_batch(&self, batch: PendingBatch) -> BatchReport {
        self.write_batch(&batch).await
    }

    async fn write_batch(&self, batch: &PendingBatch) -> BatchReport {
        let started = Instant::now();
        let mut committed = Committed::default();
        let mut failed: Vec<SessionRecord> = Vec::new();

        for chunk in batch.records.chunks(self.config.chunk_size) {
            let store = &self.store;
            match self.with_retry("insert_chunk", move || store.insert_sessions(chunk)).await {
                Ok(outcome) => committed.add(chunk, outcome),
                Err(e) => {
                    error!(
                        sync_id = %batch.sync_id,
                        records = chunk.len(),
                        attempts = self.config.max_chunk_attempts,
                        error = %e,
                        "Chunk write failed"
                    );
                    self.stats.chunk_failures.fetch_add(1, Ordering::Relaxed);
                    metrics::record_chunk_failure();
                    failed.extend_from_slice(chunk);
                }
            }
        }

        let now = Utc::now().timestamp();
        let logged = committed.outcome.total() > 0 && self.log_pass(batch, &committed, now).await;

        self.stats.batches_drained.fetch_add(1, Ordering::Relaxed);
        self.stats
            .sessions_inserted
            .fetch_add(committed.outcome.inserted, Ordering::Relaxed);
        self.stats
            .sessions_duplicate
            .fetch_add(committed.outcome.duplicates, Ordering::Relaxed);
        self.stats.last_drain_at.store(now, Ordering::Relaxed);
        metrics::record_drain_batch(started.elapsed(), committed.outcome);

        let leftover = self.handle_failed(batch, failed);

        info!(
            sync_id = %batch.sync_id,
            user_id = %batch.user_id,
            device_id = %batch.device_id,
            attempt = batch.attempts,
            inserted = committed.outcome.inserted,
            duplicates = committed.outcome.duplicates,
            leftover = ?leftover,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch drained"
        );

        BatchReport {
            sync_id: batch.sync_id.clone(),
            outcome: committed.outcome,
            logged,
            leftover,
        }
    }

    async fn log_pass(&self, batch: &PendingBatch, committed: &Committed, now: i64) -> bool {
        let entry = SyncLogEntry {
            sync_id: batch.sync_id.clone(),
            user_id: batch.user_id.clone(),
            device_id: batch.device_id.clone(),
            session_count: committed.outcome.total() as i64,
            inserted_count: committed.outcome.inserted as i64,
            duplicate_count: committed.outcome.duplicates as i64,
            min_start_time: committed.min_start,
            max_start_time: committed.max_start,
            synced_at: now,
        };
        let store = &self.store;
        let entry = &entry;
        match self.with_retry("append_sync_log", move || store.append_sync_log(entry)).await {
            Ok(()) => true,
            Err(e) => {
                error!(sync_id = %batch.sync_id, error = %e, "Sync log write failed");
                false
            }
        }
    }

    fn handle_failed(&self, batch: &PendingBatch, failed: Vec<SessionRecord>) -> Leftover {
        if failed.is_empty() {
            return Leftover::None;
        }
        let count = failed.len();
        if batch.attempts >= self.config.max_batch_requeues {
            error!(
                sync_id = %batch.sync_id,
                user_id = %batch.user_id,
                device_id = %batch.device_id,
                records = count,
                requeues = batch.attempts,
                "Parking batch after repeated write failures"
            );
            self.queue.park(batch.retry_with(failed));
            self.stats.batches_parked.fetch_add(1, Ordering::Relaxed);
            self.stats
                .sessions_parked
                .fetch_add(count as u64, Ordering::Relaxed);
            metrics::record_batch_parked();
            return Leftover::Parked(count);
        }

        warn!(sync_id = %batch.sync_id, records = count, "Requeueing failed records");
        self.queue.requeue(batch.retry_with(failed));
        self.stats.batches_requeued.fetch_add(1, Ordering::Relaxed);
        metrics::record_batch_requeued();
        Leftover::Requeued(count)
    }

    /// Run `op` under the chunk timeout, retrying with backoff.
    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, WriteFailure>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = DbResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let failure = match tokio::time::timeout(self.config.chunk_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => WriteFailure::Store(e),
                Err(_) => WriteFailure::Timeout(self.config.chunk_timeout),
            };
            if attempt >= self.config.max_chunk_attempts {
                return Err(failure);
            }
            let delay = backoff_delay(attempt);
            warn!(what, attempt, delay_ms = delay.as_millis() as u64, error = %failure, "Write failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Drain whatever is left within `deadline`, then report what was lost.
    ///
    /// Called once the HTTP server has stopped accepting requests.
    pub async fn flush(&self, deadline: Duration) -> FlushReport {
        let until = Instant::now() + deadline;
        let mut report = FlushReport::default();
        self.retry_parked();

        while let Some(remaining) = until.checked_duration_since(Instant::now()) {
            let Some(batch) = self.queue.take_next() else {
                break;
            };
            let records = batch.records.len();
            match tokio::time::timeout(remaining, self.drain_batch(batch)).await {
                Ok(_) => report.drained_batches += 1,
                Err(_) => {
                    report.abandoned_batches += 1;
                    report.abandoned_records += records;
                    break;
                }
            }
        }

        report.abandoned_batches += self.queue.depth() + self.queue.parked_batches();
        report.abandoned_records += self.queue.pending_records() + self.queue.parked_records();

        if report.abandoned_batches > 0 {
            warn!(
                abandoned_batches = report.abandoned_batches,
                abandoned_records = report.abandoned_records,
                "Shutdown flush left unsynced batches; they are dropped"
            );
        } else {
            info!(drained = report.drained_batches, "Sync queue flushed");
        }
        report
    }
}
