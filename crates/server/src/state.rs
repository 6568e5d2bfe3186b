// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use focuslog_db::Database;

use crate::drain::DrainStats;
use crate::sync_queue::SyncQueue;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Database handle for sessions, sync logs and the daily cache.
    pub db: Database,
    /// Accepted sync batches waiting for a drain worker.
    pub queue: Arc<SyncQueue>,
    /// Drain counters, written by the workers and read by `/api/sync/status`.
    pub drain_stats: Arc<DrainStats>,
}

impl AppState {
    /// Create a new application state with an unbounded queue.
    pub fn new(db: Database) -> Arc<Self> {
        Self::with_queue(
            db,
            Arc::new(SyncQueue::unbounded()),
            Arc::new(DrainStats::new()),
        )
    }

    /// Create with an externally-owned queue and stats, shared with the
    /// drain workers.
    pub fn with_queue(db: Database, queue: Arc<SyncQueue>, drain_stats: Arc<DrainStats>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            queue,
            drain_stats,
        })
    }

    /// Seconds since the server started.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
