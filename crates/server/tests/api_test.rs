//! End-to-end tests: HTTP ingestion, draining into SQLite, and daily reads.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use focuslog_core::SessionRecord;
use focuslog_db::{Database, DbError, DbResult, InsertOutcome, SyncLogEntry};
use focuslog_server::drain::Leftover;
use focuslog_server::{
    create_app_with_state, AppState, DrainConfig, DrainStats, DrainWorker, SyncQueue, SyncStore,
};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

/// 2020-01-01T00:00:00Z
const DAY_START: i64 = 1_577_836_800;

struct Harness<S: SyncStore> {
    app: Router,
    db: Database,
    queue: Arc<SyncQueue>,
    worker: DrainWorker<S>,
}

fn fast_config() -> DrainConfig {
    DrainConfig {
        chunk_size: 10,
        chunk_timeout: Duration::from_secs(5),
        max_chunk_attempts: 2,
        max_batch_requeues: 2,
        ..DrainConfig::default()
    }
}

async fn harness_with<S: SyncStore>(make_store: impl FnOnce(Database) -> S) -> Harness<S> {
    let db = Database::new_in_memory().await.unwrap();
    db.register_device("user-1", "mac-1", Some("Laptop"), "key-1", 0)
        .await
        .unwrap();
    db.register_device("user-1", "mac-2", None, "key-2", 0)
        .await
        .unwrap();

    let queue = Arc::new(SyncQueue::unbounded());
    let stats = Arc::new(DrainStats::new());
    let state = AppState::with_queue(db.clone(), queue.clone(), stats.clone());
    let worker = DrainWorker::new(
        Arc::new(make_store(db.clone())),
        queue.clone(),
        stats,
        fast_config(),
    );
    Harness {
        app: create_app_with_state(state),
        db,
        queue,
        worker,
    }
}

async fn harness() -> Harness<Database> {
    harness_with(|db| db).await
}

fn session(id: &str, app: &str, start: i64, duration: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "app_name": app,
        "window_title": format!("{app} window"),
        "start_time": start,
        "duration": duration,
    })
}

fn sync_request(key: &str, sessions: Vec<serde_json::Value>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/sync")
        .header("authorization", format!("Bearer {key}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "sessions": sessions }).to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", "Bearer key-1")
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn oversized_batch_is_rejected_without_queueing() {
    let h = harness().await;
    let sessions = (0..1001)
        .map(|i| session(&format!("s{i}"), "Editor", DAY_START + i * 60, 30))
        .collect();

    let (status, body) = send(&h.app, sync_request("key-1", sessions)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
    assert_eq!(h.queue.depth(), 0);
}

#[tokio::test]
async fn exactly_max_batch_is_accepted() {
    let h = harness().await;
    let sessions = (0..1000)
        .map(|i| session(&format!("s{i}"), "Editor", DAY_START + i * 60, 30))
        .collect();

    let (status, body) = send(&h.app, sync_request("key-1", sessions)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 1000);
}

#[tokio::test]
async fn unknown_key_is_rejected() {
    let h = harness().await;
    let (status, body) = send(
        &h.app,
        sync_request("not-a-key", vec![session("a", "Editor", DAY_START, 60)]),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn invalid_record_reports_its_index() {
    let h = harness().await;
    let bad = serde_json::json!({ "id": "b", "app_name": "Editor", "start_time": DAY_START });
    let (status, body) = send(
        &h.app,
        sync_request("key-1", vec![session("a", "Editor", DAY_START, 60), bad]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("sessions[1]"));
    assert_eq!(h.queue.depth(), 0);
}

#[tokio::test]
async fn today_cannot_be_read() {
    let h = harness().await;
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let (status, _) = send(&h.app, get_request(&format!("/api/daily/{today}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn synced_sessions_reach_the_daily_view() {
    let h = harness().await;
    let sessions = vec![
        session("a", "Editor", DAY_START + 9 * 3600, 1800),
        session("b", "Editor", DAY_START + 9 * 3600 + 1900, 1800),
        session("c", "Browser", DAY_START + 11 * 3600, 600),
    ];
    let (status, accepted) = send(&h.app, sync_request("key-1", sessions)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Accepted is not stored until a drain pass runs.
    assert_eq!(h.db.count_sessions("user-1", None).await.unwrap(), 0);
    assert_eq!(h.worker.drain_pending().await, 1);
    assert_eq!(h.db.count_sessions("user-1", None).await.unwrap(), 3);

    let logs = h.db.recent_sync_logs("user-1", 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].sync_id, accepted["sync_id"].as_str().unwrap());
    assert_eq!(logs[0].inserted_count, 3);

    let (status, daily) = send(&h.app, get_request("/api/daily/2020-01-01")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(daily["cached"], false);
    assert_eq!(daily["stats"]["sessionCount"], 3);
    assert_eq!(daily["stats"]["totalDuration"], 4200);
    assert_eq!(daily["stats"]["uniqueApps"], 2);
    assert_eq!(daily["stats"]["topApps"][0]["appName"], "Editor");
    assert!(daily["ai"].is_null());
}

#[tokio::test]
async fn resubmitting_a_batch_stores_nothing_new() {
    let h = harness().await;
    let sessions = vec![
        session("a", "Editor", DAY_START, 60),
        session("b", "Editor", DAY_START + 120, 60),
    ];
    send(&h.app, sync_request("key-1", sessions.clone())).await;
    h.worker.drain_pending().await;

    let mut again = sessions;
    again.push(session("c", "Terminal", DAY_START + 300, 60));
    let (status, _) = send(&h.app, sync_request("key-1", again)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    h.worker.drain_pending().await;

    assert_eq!(h.db.count_sessions("user-1", None).await.unwrap(), 3);
    let logs = h.db.recent_sync_logs("user-1", 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    let latest = &logs[0];
    assert_eq!(latest.inserted_count, 1);
    assert_eq!(latest.duplicate_count, 2);
}

#[tokio::test]
async fn sync_status_lists_each_device() {
    let h = harness().await;
    send(&h.app, sync_request("key-1", vec![session("a", "Editor", DAY_START, 60)])).await;
    send(
        &h.app,
        sync_request(
            "key-2",
            vec![
                session("b", "Editor", DAY_START, 60),
                session("c", "Editor", DAY_START + 100, 60),
            ],
        ),
    )
    .await;
    assert_eq!(h.worker.drain_pending().await, 2);

    let (status, body) = send(&h.app, get_request("/api/sync/status")).await;
    assert_eq!(status, StatusCode::OK);
    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    let total: u64 = devices
        .iter()
        .map(|d| d["totalSessions"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 3);
    assert_eq!(body["queueDepth"], 0);
    assert_eq!(body["drain"]["sessionsInserted"], 3);
}

#[tokio::test]
async fn second_daily_read_is_served_from_cache() {
    let h = harness().await;
    send(&h.app, sync_request("key-1", vec![session("a", "Editor", DAY_START, 600)])).await;
    h.worker.drain_pending().await;

    let (_, first) = send(&h.app, get_request("/api/daily/2020-01-01")).await;
    assert_eq!(first["cached"], false);

    for _ in 0..100 {
        if h.db.get_daily_summary("user-1", "2020-01-01", "UTC").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (_, second) = send(&h.app, get_request("/api/daily/2020-01-01")).await;
    assert_eq!(second["cached"], true);
    assert_eq!(second["stats"], first["stats"]);
}

#[tokio::test]
async fn timezone_shifts_the_day_window() {
    let h = harness().await;
    // 23:30 UTC on Jan 1 is 08:30 on Jan 2 at +09:00.
    send(
        &h.app,
        sync_request("key-1", vec![session("late", "Editor", DAY_START + 23 * 3600 + 1800, 60)]),
    )
    .await;
    h.worker.drain_pending().await;

    // Cached in UTC first; the timezone change must not serve it.
    let (_, utc) = send(&h.app, get_request("/api/daily/2020-01-01")).await;
    assert_eq!(utc["stats"]["sessionCount"], 1);
    for _ in 0..100 {
        if h.db.get_daily_summary("user-1", "2020-01-01", "UTC").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let put = Request::builder()
        .method("PUT")
        .uri("/api/settings/timezone")
        .header("authorization", "Bearer key-1")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"timezone":"+09:00"}"#))
        .unwrap();
    let (status, _) = send(&h.app, put).await;
    assert_eq!(status, StatusCode::OK);

    let (_, jan1) = send(&h.app, get_request("/api/daily/2020-01-01")).await;
    let (_, jan2) = send(&h.app, get_request("/api/daily/2020-01-02")).await;
    assert_eq!(jan1["timezone"], "+09:00");
    assert_eq!(jan1["cached"], false);
    assert_eq!(jan1["stats"]["sessionCount"], 0);
    assert_eq!(jan2["stats"]["sessionCount"], 1);
}

/// Fails the first `failures` inserts, then delegates to the database.
struct FlakyStore {
    db: Database,
    failures: AtomicU32,
}

#[async_trait]
impl SyncStore for FlakyStore {
    async fn insert_sessions(&self, records: &[SessionRecord]) -> DbResult<InsertOutcome> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DbError::CreateDir(std::io::Error::other("store unavailable")));
        }
        self.db.insert_sessions_if_absent(records).await
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> DbResult<()> {
        self.db.append_sync_log(entry).await
    }
}

#[tokio::test]
async fn transient_failure_is_retried_within_the_pass() {
    let h = harness_with(|db| FlakyStore {
        db,
        failures: AtomicU32::new(1),
    })
    .await;
    send(&h.app, sync_request("key-1", vec![session("a", "Editor", DAY_START, 60)])).await;

    let batch = h.queue.take_next().unwrap();
    let report = h.worker.drain_batch(batch).await;

    assert_eq!(report.outcome.inserted, 1);
    assert!(report.logged);
    assert_eq!(report.leftover, Leftover::None);
    assert_eq!(h.queue.depth(), 0);
}

#[tokio::test]
async fn parked_batch_is_stored_once_the_store_recovers() {
    // Three passes of two attempts each fail, then the store comes back.
    let h = harness_with(|db| FlakyStore {
        db,
        failures: AtomicU32::new(6),
    })
    .await;
    send(&h.app, sync_request("key-1", vec![session("a", "Editor", DAY_START, 60)])).await;

    // Requeued until the batch has been retried `max_batch_requeues` times.
    let mut reports = Vec::new();
    while let Some(batch) = h.queue.take_next() {
        reports.push(h.worker.drain_batch(batch).await);
    }
    let leftovers: Vec<Leftover> = reports.iter().map(|r| r.leftover).collect();
    assert_eq!(
        leftovers,
        vec![Leftover::Requeued(1), Leftover::Requeued(1), Leftover::Parked(1)]
    );
    assert!(reports.iter().all(|r| !r.logged));
    assert!(h.db.recent_sync_logs("user-1", 10).await.unwrap().is_empty());

    let (_, status) = send(&h.app, get_request("/api/sync/status")).await;
    assert_eq!(status["drain"]["batchesParked"], 1);
    assert_eq!(status["drain"]["sessionsParked"], 1);
    assert_eq!(status["parkedBatches"], 1);
    assert_eq!(status["parkedSessions"], 1);
    assert_eq!(status["queueDepth"], 0);

    assert_eq!(h.worker.retry_parked(), 1);
    assert_eq!(h.worker.drain_pending().await, 1);
    assert_eq!(h.db.count_sessions("user-1", None).await.unwrap(), 1);

    let (_, status) = send(&h.app, get_request("/api/sync/status")).await;
    assert_eq!(status["parkedBatches"], 0);
    assert_eq!(status["parkedSessions"], 0);
    assert_eq!(status["recentSyncs"][0]["insertedCount"], 1);
}

#[tokio::test]
async fn parked_batch_that_fails_again_stays_parked() {
    let h = harness_with(|db| FlakyStore {
        db,
        failures: AtomicU32::new(u32::MAX),
    })
    .await;
    send(&h.app, sync_request("key-1", vec![session("a", "Editor", DAY_START, 60)])).await;
    while let Some(batch) = h.queue.take_next() {
        h.worker.drain_batch(batch).await;
    }
    assert_eq!(h.queue.parked_batches(), 1);

    h.worker.retry_parked();
    let batch = h.queue.take_next().unwrap();
    let report = h.worker.drain_batch(batch).await;
    assert_eq!(report.leftover, Leftover::Parked(1));
    assert_eq!(h.queue.depth(), 0);
    assert_eq!(h.queue.parked_batches(), 1);
}

#[tokio::test]
async fn partial_chunk_failure_keeps_committed_chunks() {
    // First chunk of 10 fails both attempts, second chunk succeeds.
    let h = harness_with(|db| FlakyStore {
        db,
        failures: AtomicU32::new(2),
    })
    .await;
    let sessions = (0..15)
        .map(|i| session(&format!("s{i}"), "Editor", DAY_START + i * 120, 60))
        .collect();
    send(&h.app, sync_request("key-1", sessions)).await;

    let batch = h.queue.take_next().unwrap();
    let report = h.worker.drain_batch(batch).await;
    assert_eq!(report.outcome.inserted, 5);
    assert!(report.logged);
    assert_eq!(report.leftover, Leftover::Requeued(10));

    let retry = h.queue.take_next().unwrap();
    assert_eq!(retry.attempts, 1);
    let report = h.worker.drain_batch(retry).await;
    assert_eq!(report.outcome.inserted, 10);
    assert_eq!(h.db.count_sessions("user-1", None).await.unwrap(), 15);

    // One log row per pass that committed something, same sync id.
    let logs = h.db.recent_sync_logs("user-1", 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].sync_id, logs[1].sync_id);
}

#[tokio::test]
async fn flush_drains_what_is_left() {
    let h = harness().await;
    for i in 0..3 {
        send(
            &h.app,
            sync_request("key-1", vec![session(&format!("s{i}"), "Editor", DAY_START + i * 100, 60)]),
        )
        .await;
    }

    let report = h.worker.flush(Duration::from_secs(5)).await;
    assert_eq!(report.drained_batches, 3);
    assert_eq!(report.abandoned_batches, 0);
    assert_eq!(h.db.count_sessions("user-1", None).await.unwrap(), 3);
}
