// crates/server/src/lib.rs
//! Focuslog server library.
//!
//! Axum HTTP surface for session sync and daily analytics, plus the
//! in-memory sync queue and the drain workers that move accepted batches
//! into storage.

pub mod auth;
pub mod background;
pub mod config;
pub mod drain;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sync_queue;

pub use config::{Cli, Command, ServerConfig, DEFAULT_PORT};
pub use drain::{DrainConfig, DrainStats, DrainWorker, FlushReport, SyncStore};
pub use error::*;
pub use metrics::init_metrics;
pub use routes::api_routes;
pub use state::AppState;
pub use sync_queue::{PendingBatch, SyncQueue};

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use focuslog_db::Database;
use focuslog_observability::{request_id_layers, RequestSpan};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound on request bodies. Large enough that an oversized batch is
/// rejected by the session-count check rather than by the transport.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Create the Axum application with a fresh, unbounded queue.
///
/// Nothing drains that queue; used by tests and tools that only need the
/// HTTP surface.
pub fn create_app(db: Database) -> Router {
    create_app_with_state(AppState::new(db))
}

/// Create the Axum application around an existing state.
///
/// This sets up:
/// - API routes (health, sync, daily, settings) and `/metrics`
/// - Request timing per matched route
/// - A body limit of [`MAX_BODY_BYTES`]
/// - CORS (allows any origin)
/// - Request tracing with a ULID request id, echoed in `x-request-id`
pub fn create_app_with_state(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let (set_request_id, propagate_request_id) = request_id_layers();

    api_routes(state)
        .layer(axum::middleware::from_fn(metrics::track_requests))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .layer(propagate_request_id)
        .layer(set_request_id)
}
