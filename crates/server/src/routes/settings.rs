//! Per-user settings routes.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use focuslog_core::UserTimezone;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedDevice;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TimezoneRequest {
    timezone: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct TimezoneResponse {
    pub timezone: String,
}

/// The caller's timezone, UTC when unset. A stored value that no longer
/// parses is treated as UTC.
pub async fn user_timezone(state: &AppState, user_id: &str) -> ApiResult<UserTimezone> {
    let Some(stored) = state.db.get_user_timezone(user_id).await? else {
        return Ok(UserTimezone::utc());
    };
    Ok(UserTimezone::parse(&stored).unwrap_or_else(|e| {
        tracing::warn!(user_id, error = %e, "Ignoring unparseable stored timezone");
        UserTimezone::utc()
    }))
}

/// GET /api/settings/timezone
async fn get_timezone(
    State(state): State<Arc<AppState>>,
    device: AuthenticatedDevice,
) -> ApiResult<Json<TimezoneResponse>> {
    let tz = user_timezone(&state, &device.user_id).await?;
    Ok(Json(TimezoneResponse {
        timezone: tz.to_string(),
    }))
}

/// PUT /api/settings/timezone - Store a fixed UTC offset for the caller.
async fn update_timezone(
    State(state): State<Arc<AppState>>,
    device: AuthenticatedDevice,
    payload: Result<Json<TimezoneRequest>, JsonRejection>,
) -> ApiResult<Json<TimezoneResponse>> {
    let Json(body) = payload?;
    let tz = UserTimezone::parse(&body.timezone)?;
    let canonical = tz.to_string();
    state
        .db
        .set_user_timezone(&device.user_id, &canonical, Utc::now().timestamp())
        .await?;
    tracing::info!(user_id = %device.user_id, timezone = %canonical, "Timezone updated");
    Ok(Json(TimezoneResponse { timezone: canonical }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/settings/timezone", get(get_timezone).put(update_timezone))
}
