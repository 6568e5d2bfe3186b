// crates/core/src/types.rs
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// One continuous interval of focus on a single application window.
///
/// Created by the origin client, stamped with the authenticated owner at
/// ingestion, and immutable once stored. `id` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    pub app_name: String,
    pub window_title: String,
    pub url: Option<String>,
    /// Epoch seconds, UTC.
    pub start_time: i64,
    /// Epoch seconds, UTC. Always `start_time + duration`.
    pub end_time: i64,
    pub duration: i64,
    pub bundle_id: Option<String>,
    pub tab_title: Option<String>,
    pub tab_count: Option<i64>,
    pub document_path: Option<String>,
    pub is_full_screen: bool,
    pub is_minimized: bool,
    /// Server ingestion timestamp (epoch seconds).
    pub synced_at: i64,
}

/// A run of same-app sessions joined because the gaps between them are small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct MergedSegment {
    pub app_name: String,
    #[ts(type = "number")]
    pub start: i64,
    #[ts(type = "number")]
    pub end: i64,
    /// Sum of the member sessions' durations, not `end - start`.
    #[ts(type = "number")]
    pub duration: i64,
    pub session_count: usize,
}

/// The four 0-100 score dimensions plus their weighted overall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct DailyScores {
    pub focus: u8,
    pub deep_work: u8,
    pub switch_rate: u8,
    pub concentration: u8,
    pub overall: u8,
}

/// Per-app totals for a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct AppUsage {
    pub app_name: String,
    #[ts(type = "number")]
    pub duration: i64,
    pub session_count: usize,
    /// Share of the day's total duration, 0.0-100.0.
    pub percentage: f64,
}

/// First start to last end across a day's sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ActiveSpan {
    #[ts(type = "number")]
    pub start: i64,
    #[ts(type = "number")]
    pub end: i64,
    #[ts(type = "number")]
    pub seconds: i64,
}

/// Chart-ready view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ChartSession {
    pub id: String,
    pub app_name: String,
    pub window_title: String,
    #[ts(type = "number")]
    pub start_time: i64,
    #[ts(type = "number")]
    pub end_time: i64,
    #[ts(type = "number")]
    pub duration: i64,
}

impl From<&SessionRecord> for ChartSession {
    fn from(r: &SessionRecord) -> Self {
        Self {
            id: r.id.clone(),
            app_name: r.app_name.clone(),
            window_title: r.window_title.clone(),
            start_time: r.start_time,
            end_time: r.end_time,
            duration: r.duration,
        }
    }
}

/// Full analytics for one user-day. Safe to cache once the day is past.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    /// `YYYY-MM-DD` in the user's timezone.
    pub date: String,
    #[ts(type = "number")]
    pub total_duration: i64,
    pub session_count: usize,
    pub unique_apps: usize,
    pub active_span: Option<ActiveSpan>,
    pub top_apps: Vec<AppUsage>,
    pub segment_count: usize,
    pub deep_work_segments: usize,
    pub switch_count: usize,
    pub scores: DailyScores,
    pub sessions: Vec<ChartSession>,
}

/// Externally-produced analysis stored next to a day's stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalysis {
    #[ts(type = "number | null")]
    pub score: Option<i64>,
    pub result: String,
    pub model: String,
    /// Epoch seconds.
    #[ts(type = "number")]
    pub generated_at: i64,
}
