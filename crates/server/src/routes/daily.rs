// crates/server/src/routes/daily.rs
//! Daily stats read path and analysis write-back.
//!
//! Only past days are served: their sessions no longer change, so the
//! computed stats are cached per (user, date) on first read, tagged with the
//! timezone they were computed in. The cache is an optimisation only: a
//! failed lookup is a miss and a failed write-back is logged and dropped.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use focuslog_core::{compute_daily_stats, resolve_past_day, DailyAnalysis, DailyStats};
use focuslog_db::CachedDaily;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::auth::AuthenticatedDevice;
use crate::background::spawn_best_effort;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::routes::settings::user_timezone;
use crate::state::AppState;

/// Response for `GET /api/daily/{date}`.
#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct DailyResponse {
    pub stats: DailyStats,
    pub ai: Option<DailyAnalysis>,
    /// The timezone the day was resolved in.
    pub timezone: String,
    /// True when `stats` came from the cache.
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
struct AnalysisRequest {
    score: Option<i64>,
    result: String,
    model: String,
}

/// GET /api/daily/{date} - Stats for one past day in the caller's timezone.
async fn get_daily(
    State(state): State<Arc<AppState>>,
    device: AuthenticatedDevice,
    Path(date): Path<String>,
) -> ApiResult<Json<DailyResponse>> {
    let tz = user_timezone(&state, &device.user_id).await?;
    let day = resolve_past_day(&date, tz, Utc::now())?;
    let date_key = day.date_key();
    let timezone = tz.to_string();

    let cached = match state
        .db
        .get_daily_summary(&device.user_id, &date_key, &timezone)
        .await
    {
        Ok(cached) => cached.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(
                user_id = %device.user_id,
                date = %date_key,
                error = %e,
                "Daily cache lookup failed, recomputing"
            );
            metrics::record_cache_read_failure();
            CachedDaily::default()
        }
    };

    if let Some(stats) = cached.stats {
        metrics::record_daily_cache(true);
        return Ok(Json(DailyResponse {
            stats,
            ai: cached.analysis,
            timezone,
            cached: true,
        }));
    }

    metrics::record_daily_cache(false);
    let records = state
        .db
        .get_sessions_in_range(&device.user_id, day.start, day.end)
        .await?;
    let stats = compute_daily_stats(&date_key, &records);

    let db = state.db.clone();
    let user_id = device.user_id.clone();
    let to_store = stats.clone();
    let stored_tz = timezone.clone();
    spawn_best_effort("daily_cache_write", async move {
        let result = db
            .put_daily_stats(
                &user_id,
                &to_store.date,
                &stored_tz,
                &to_store,
                Utc::now().timestamp(),
            )
            .await;
        if result.is_err() {
            metrics::record_cache_write_failure();
        }
        result
    });

    Ok(Json(DailyResponse {
        stats,
        ai: cached.analysis,
        timezone,
        cached: false,
    }))
}

/// PUT /api/daily/{date}/ai - Store (or replace) the analysis for a past day.
///
/// `generatedAt` is assigned here; the cached stats are left untouched.
async fn put_analysis(
    State(state): State<Arc<AppState>>,
    device: AuthenticatedDevice,
    Path(date): Path<String>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<Json<DailyAnalysis>> {
    let Json(body) = payload?;
    let tz = user_timezone(&state, &device.user_id).await?;
    let day = resolve_past_day(&date, tz, Utc::now())?;

    if body.model.trim().is_empty() {
        return Err(ApiError::BadRequest("model must not be empty".into()));
    }
    if let Some(score) = body.score {
        if !(0..=100).contains(&score) {
            return Err(ApiError::BadRequest("score must be between 0 and 100".into()));
        }
    }

    let analysis = DailyAnalysis {
        score: body.score,
        result: body.result,
        model: body.model,
        generated_at: Utc::now().timestamp(),
    };
    state
        .db
        .put_daily_analysis(&device.user_id, &day.date_key(), &analysis)
        .await?;
    Ok(Json(analysis))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/daily/{date}", get(get_daily))
        .route("/daily/{date}/ai", put(put_analysis))
}
