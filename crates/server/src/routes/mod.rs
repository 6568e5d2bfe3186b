//! API route handlers for the focuslog server.

pub mod daily;
pub mod health;
pub mod metrics;
pub mod settings;
pub mod sync;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/sync - Accept a batch of sessions (202)
/// - GET  /api/sync/status - Per-device last sync plus queue and drain counters
/// - GET  /api/daily/{date} - Stats for a past day, cached after first read
/// - PUT  /api/daily/{date}/ai - Store an externally produced analysis
/// - PUT  /api/settings/timezone - Set the caller's timezone
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", sync::router())
        .nest("/api", daily::router())
        .nest("/api", settings::router())
        .merge(metrics::router())
        .with_state(state)
}
