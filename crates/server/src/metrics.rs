//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions (counters, histograms, gauges)
//! - Helper functions for recording metrics
//! - Request timing middleware

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use focuslog_db::InsertOutcome;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    // Ingestion
    describe_counter!("sync_batches_accepted_total", "Sync batches accepted into the queue");
    describe_counter!("sync_sessions_accepted_total", "Sessions accepted into the queue");
    describe_gauge!("sync_queue_depth", "Batches waiting to be drained");

    // Drain
    describe_counter!("drain_sessions_inserted_total", "Sessions newly written to storage");
    describe_counter!(
        "drain_sessions_duplicate_total",
        "Sessions skipped because their id was already stored"
    );
    describe_counter!(
        "drain_chunk_failures_total",
        "Chunks that failed every write attempt"
    );
    describe_counter!("drain_batches_requeued_total", "Batches put back after failed chunks");
    describe_counter!(
        "drain_batches_parked_total",
        "Batches given up on after exhausting requeues"
    );
    describe_histogram!(
        "drain_batch_duration_seconds",
        "Time spent writing one batch in seconds"
    );

    // Daily read path
    describe_counter!("daily_cache_hits_total", "Daily summaries served from cache");
    describe_counter!("daily_cache_misses_total", "Daily summaries computed on demand");
    describe_counter!(
        "cache_write_failures_total",
        "Best-effort cache write-backs that failed"
    );
    describe_counter!(
        "cache_read_failures_total",
        "Daily cache lookups that failed and were treated as misses"
    );

    // HTTP
    describe_histogram!(
        "request_duration_seconds",
        "Duration of API requests in seconds"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record a sync batch accepted by the gateway.
pub fn record_batch_accepted(sessions: usize) {
    counter!("sync_batches_accepted_total").increment(1);
    counter!("sync_sessions_accepted_total").increment(sessions as u64);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("sync_queue_depth").set(depth as f64);
}

/// Record one drain pass over a batch.
pub fn record_drain_batch(duration: Duration, outcome: InsertOutcome) {
    histogram!("drain_batch_duration_seconds").record(duration.as_secs_f64());
    counter!("drain_sessions_inserted_total").increment(outcome.inserted);
    counter!("drain_sessions_duplicate_total").increment(outcome.duplicates);
}

pub fn record_chunk_failure() {
    counter!("drain_chunk_failures_total").increment(1);
}

pub fn record_batch_requeued() {
    counter!("drain_batches_requeued_total").increment(1);
}

pub fn record_batch_parked() {
    counter!("drain_batches_parked_total").increment(1);
}

pub fn record_daily_cache(hit: bool) {
    if hit {
        counter!("daily_cache_hits_total").increment(1);
    } else {
        counter!("daily_cache_misses_total").increment(1);
    }
}

pub fn record_cache_write_failure() {
    counter!("cache_write_failures_total").increment(1);
}

pub fn record_cache_read_failure() {
    counter!("cache_read_failures_total").increment(1);
}

/// Record a completed API request.
///
/// # Arguments
/// * `endpoint` - The matched route (e.g., "/api/sync")
/// * `status` - HTTP status code as string (e.g., "202", "400")
/// * `duration` - Request duration
pub fn record_request(endpoint: &str, status: &str, duration: Duration) {
    histogram!(
        "request_duration_seconds",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Middleware timing every routed request by its matched path.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();
    let response = next.run(request).await;
    record_request(&endpoint, response.status().as_str(), start.elapsed());
    response
}
