// crates/server/src/routes/sync.rs
//! Session ingestion and sync status.
//!
//! `POST /api/sync` only validates and enqueues: storage is written later by
//! the drain workers, so a 202 means "accepted", not "stored".

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use focuslog_core::SyncRequest;
use focuslog_db::{DeviceSyncStatus, SyncLogEntry};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

use crate::auth::AuthenticatedDevice;
use crate::drain::DrainStatsSnapshot;
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;
use crate::sync_queue::PendingBatch;

/// Sync-log rows returned by the status endpoint.
pub const RECENT_SYNC_LIMIT: i64 = 20;

/// Response for an accepted sync batch.
#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct SyncAccepted {
    pub accepted: usize,
    pub sync_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_depth: usize,
    pub pending_sessions: usize,
    /// Batches set aside after repeated write failures, awaiting retry.
    pub parked_batches: usize,
    pub parked_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub devices: Vec<DeviceSyncStatus>,
    #[serde(flatten)]
    pub queue: QueueStatus,
    pub drain: DrainStatsSnapshot,
    /// Newest first.
    pub recent_syncs: Vec<SyncLogEntry>,
}

/// POST /api/sync - Validate a batch and hand it to the drain workers.
///
/// Returns:
/// - 202 Accepted with `{accepted, sync_id}`
/// - 400 for an empty batch, malformed JSON or an invalid record
/// - 413 for more than 1000 sessions (nothing is queued)
/// - 503 when the queue is at capacity
async fn post_sync(
    State(state): State<Arc<AppState>>,
    device: AuthenticatedDevice,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SyncAccepted>)> {
    let Json(request) = payload?;
    let owner = device.owner();
    let now = Utc::now().timestamp();

    let records = request.into_records(&owner, now)?;
    let sync_id = Uuid::new_v4().to_string();
    let accepted = state
        .queue
        .enqueue(PendingBatch::new(sync_id.clone(), owner, records, now))?;

    metrics::record_batch_accepted(accepted);
    metrics::record_queue_depth(state.queue.depth());
    tracing::info!(
        sync_id = %sync_id,
        user_id = %device.user_id,
        device_id = %device.device_id,
        accepted,
        "Sync batch queued"
    );

    Ok((StatusCode::ACCEPTED, Json(SyncAccepted { accepted, sync_id })))
}

/// GET /api/sync/status - Latest sync per device for the caller's account,
/// queue and parked counts, and the most recent sync-log rows.
async fn sync_status(
    State(state): State<Arc<AppState>>,
    device: AuthenticatedDevice,
) -> ApiResult<Json<SyncStatusResponse>> {
    let devices = state.db.latest_sync_per_device(&device.user_id).await?;
    let recent_syncs = state
        .db
        .recent_sync_logs(&device.user_id, RECENT_SYNC_LIMIT)
        .await?;
    Ok(Json(SyncStatusResponse {
        devices,
        queue: QueueStatus {
            queue_depth: state.queue.depth(),
            pending_sessions: state.queue.pending_records(),
            parked_batches: state.queue.parked_batches(),
            parked_sessions: state.queue.parked_records(),
        },
        drain: state.drain_stats.snapshot(),
        recent_syncs,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync", post(post_sync))
        .route("/sync/status", get(sync_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use focuslog_db::Database;
    use tower::ServiceExt;

    async fn setup() -> (Router, Arc<AppState>) {
        let db = Database::new_in_memory().await.unwrap();
        db.register_device("user-1", "mac-1", None, "key-1", 0)
            .await
            .unwrap();
        let state = AppState::new(db);
        (crate::create_app_with_state(state.clone()), state)
    }

    fn post(body: String, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/sync")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn sessions_json(n: usize) -> String {
        let sessions: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "id": format!("s{i}"),
                    "app_name": "Editor",
                    "window_title": "main.rs",
                    "start_time": 1_770_249_600 + i as i64 * 120,
                    "duration": 60,
                })
            })
            .collect();
        serde_json::json!({ "sessions": sessions }).to_string()
    }

    #[tokio::test]
    async fn test_accepts_and_enqueues() {
        let (app, state) = setup().await;
        let response = app.oneshot(post(sessions_json(3), Some("key-1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let accepted: SyncAccepted = serde_json::from_slice(&body).unwrap();
        assert_eq!(accepted.accepted, 3);
        assert!(Uuid::parse_str(&accepted.sync_id).is_ok());

        let batch = state.queue.take_next().unwrap();
        assert_eq!(batch.sync_id, accepted.sync_id);
        assert!(batch.records.iter().all(|r| r.user_id == "user-1" && r.device_id == "mac-1"));
    }

    #[tokio::test]
    async fn test_missing_key_is_401() {
        let (app, state) = setup().await;
        let response = app.oneshot(post(sessions_json(1), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let (app, _) = setup().await;
        let response = app
            .oneshot(post("{\"sessions\": [".into(), Some("key-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_batch_is_400() {
        let (app, state) = setup().await;
        let response = app
            .oneshot(post(r#"{"sessions": []}"#.into(), Some("key-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_is_503() {
        let db = Database::new_in_memory().await.unwrap();
        db.register_device("user-1", "mac-1", None, "key-1", 0)
            .await
            .unwrap();
        let state = AppState::with_queue(
            db,
            Arc::new(crate::sync_queue::SyncQueue::new(1)),
            Arc::new(crate::drain::DrainStats::new()),
        );
        let app = crate::create_app_with_state(state.clone());

        let first = app.clone().oneshot(post(sessions_json(1), Some("key-1"))).await.unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        let second = app.oneshot(post(sessions_json(1), Some("key-1"))).await.unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_status_reports_queue() {
        let (app, state) = setup().await;
        app.clone()
            .oneshot(post(sessions_json(4), Some("key-1")))
            .await
            .unwrap();
        assert_eq!(state.queue.pending_records(), 4);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sync/status")
                    .header("authorization", "Bearer key-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["queueDepth"], 1);
        assert_eq!(json["pendingSessions"], 4);
        assert_eq!(json["parkedBatches"], 0);
        assert_eq!(json["parkedSessions"], 0);
        assert!(json["devices"].as_array().unwrap().is_empty());
        assert!(json["recentSyncs"].as_array().unwrap().is_empty());
        assert_eq!(json["drain"]["batchesDrained"], 0);
    }

    #[tokio::test]
    async fn test_status_lists_recent_syncs_newest_first() {
        let (app, state) = setup().await;
        for i in 0..(RECENT_SYNC_LIMIT + 2) {
            state
                .db
                .append_sync_log(&SyncLogEntry {
                    sync_id: format!("sync-{i}"),
                    user_id: "user-1".into(),
                    device_id: "mac-1".into(),
                    session_count: 1,
                    inserted_count: 1,
                    duplicate_count: 0,
                    min_start_time: Some(0),
                    max_start_time: Some(0),
                    synced_at: i,
                })
                .await
                .unwrap();
        }
        state
            .db
            .append_sync_log(&SyncLogEntry {
                sync_id: "other".into(),
                user_id: "user-2".into(),
                device_id: "pc-1".into(),
                session_count: 1,
                inserted_count: 1,
                duplicate_count: 0,
                min_start_time: None,
                max_start_time: None,
                synced_at: 99,
            })
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sync/status")
                    .header("authorization", "Bearer key-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let recent = json["recentSyncs"].as_array().unwrap();
        assert_eq!(recent.len(), RECENT_SYNC_LIMIT as usize);
        assert_eq!(recent[0]["syncId"], format!("sync-{}", RECENT_SYNC_LIMIT + 1));
        assert!(recent.iter().all(|r| r["userId"] == "user-1"));
    }
}
