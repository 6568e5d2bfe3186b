// crates/core/src/stats.rs
//! Daily stats aggregation: one pure pass from raw sessions to [`DailyStats`].

use std::collections::HashMap;

use crate::scoring::ScoreInputs;
use crate::segments::{merge_sorted, sort_sessions};
use crate::types::{ActiveSpan, AppUsage, ChartSession, DailyScores, DailyStats, SessionRecord};

/// Aggregate a day's sessions. `date` is carried through verbatim.
///
/// Pure: the same multiset of sessions always yields the same stats, which is
/// what makes the result cacheable once the day is in the past.
pub fn compute_daily_stats(date: &str, records: &[SessionRecord]) -> DailyStats {
    let sorted = sort_sessions(records);
    let segments = merge_sorted(&sorted);
    let inputs = ScoreInputs::from_sorted(&sorted, &segments);
    let scores = DailyScores::from_inputs(sorted.len(), &inputs);

    let active_span = sorted.first().map(|first| {
        let end = sorted
            .iter()
            .map(|r| r.end_time)
            .max()
            .unwrap_or(first.end_time);
        ActiveSpan {
            start: first.start_time,
            end,
            seconds: end - first.start_time,
        }
    });

    let top_apps = top_apps(&sorted, inputs.total_duration);

    DailyStats {
        date: date.to_string(),
        total_duration: inputs.total_duration,
        session_count: sorted.len(),
        unique_apps: top_apps.len(),
        active_span,
        top_apps,
        segment_count: segments.len(),
        deep_work_segments: inputs.deep_work_segments,
        switch_count: inputs.switch_count,
        scores,
        sessions: sorted.iter().map(|r| ChartSession::from(*r)).collect(),
    }
}

/// Per-app totals, longest first; ties broken by name for stable output.
fn top_apps(sorted: &[&SessionRecord], total_duration: i64) -> Vec<AppUsage> {
    let mut per_app: HashMap<&str, (i64, usize)> = HashMap::new();
    for r in sorted {
        let entry = per_app.entry(r.app_name.as_str()).or_default();
        entry.0 += r.duration;
        entry.1 += 1;
    }

    let mut apps: Vec<AppUsage> = per_app
        .into_iter()
        .map(|(app_name, (duration, session_count))| AppUsage {
            app_name: app_name.to_string(),
            duration,
            session_count,
            percentage: if total_duration > 0 {
                (duration as f64 / total_duration as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            },
        })
        .collect();
    apps.sort_by(|a, b| {
        b.duration
            .cmp(&a.duration)
            .then_with(|| a.app_name.cmp(&b.app_name))
    });
    apps
}
