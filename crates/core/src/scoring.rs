// crates/core/src/scoring.rs
//! Daily productivity scores.
//!
//! Four dimensions, each an integer 0-100:
//! - focus: how much of the active span was spent in sessions
//! - deepWork: number of merged segments of at least 30 minutes
//! - switchRate: app changes per active hour, banded (fewer is better)
//! - concentration: share of time spent in the top three apps
//!
//! `overall` weights them 0.3 / 0.3 / 0.2 / 0.2.

use std::collections::HashMap;

use crate::segments::{merge_sorted, sort_sessions};
use crate::types::{DailyScores, MergedSegment, SessionRecord};

/// Minimum merged-segment length that counts as deep work.
pub const DEEP_WORK_MIN_SECS: i64 = 1800;

/// Score for 0..=4 deep-work segments; five or more saturate at 100.
const DEEP_WORK_SCORES: [u8; 5] = [0, 40, 60, 75, 85];

/// Upper bound of switches per hour (inclusive) and the score for that band.
const SWITCH_BANDS: [(f64, u8); 4] = [(4.0, 100), (8.0, 80), (15.0, 60), (25.0, 40)];
const SWITCH_FLOOR_SCORE: u8 = 20;

const WEIGHT_FOCUS: f64 = 0.3;
const WEIGHT_DEEP_WORK: f64 = 0.3;
const WEIGHT_SWITCH_RATE: f64 = 0.2;
const WEIGHT_CONCENTRATION: f64 = 0.2;

/// Intermediate counts that feed the scores, kept so the stats view can
/// show them alongside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreInputs {
    pub total_duration: i64,
    pub active_span: i64,
    pub deep_work_segments: usize,
    pub switch_count: usize,
    pub top3_duration: i64,
}

impl ScoreInputs {
    /// Gather inputs from sessions in [`sort_sessions`] order and their segments.
    pub fn from_sorted(sorted: &[&SessionRecord], segments: &[MergedSegment]) -> Self {
        let Some(first) = sorted.first() else {
            return Self::default();
        };

        let total_duration: i64 = sorted.iter().map(|r| r.duration).sum();
        let earliest = first.start_time;
        let latest = sorted.iter().map(|r| r.end_time).max().unwrap_or(earliest);

        let switch_count = sorted
            .windows(2)
            .filter(|w| w[0].app_name != w[1].app_name)
            .count();

        let deep_work_segments = segments
            .iter()
            .filter(|s| s.duration >= DEEP_WORK_MIN_SECS)
            .count();

        let mut per_app: HashMap<&str, i64> = HashMap::new();
        for r in sorted {
            *per_app.entry(r.app_name.as_str()).or_default() += r.duration;
        }
        let mut app_totals: Vec<i64> = per_app.into_values().collect();
        app_totals.sort_unstable_by(|a, b| b.cmp(a));
        let top3_duration = app_totals.iter().take(3).sum();

        Self {
            total_duration,
            active_span: latest - earliest,
            deep_work_segments,
            switch_count,
            top3_duration,
        }
    }
}

impl DailyScores {
    /// Compute scores for an unordered set of a day's sessions.
    pub fn compute(records: &[SessionRecord]) -> Self {
        let sorted = sort_sessions(records);
        let segments = merge_sorted(&sorted);
        Self::from_inputs(sorted.len(), &ScoreInputs::from_sorted(&sorted, &segments))
    }

    /// Compute scores from pre-gathered inputs. No sessions means all zeros.
    pub fn from_inputs(session_count: usize, inputs: &ScoreInputs) -> Self {
        if session_count == 0 {
            return Self::default();
        }

        let focus = focus_score(inputs.total_duration, inputs.active_span);
        let deep_work = deep_work_score(inputs.deep_work_segments);
        let switch_rate = switch_rate_score(inputs.switch_count, inputs.active_span);
        let concentration = concentration_score(inputs.top3_duration, inputs.total_duration);

        let overall = WEIGHT_FOCUS * f64::from(focus)
            + WEIGHT_DEEP_WORK * f64::from(deep_work)
            + WEIGHT_SWITCH_RATE * f64::from(switch_rate)
            + WEIGHT_CONCENTRATION * f64::from(concentration);

        Self {
            focus,
            deep_work,
            switch_rate,
            concentration,
            overall: clamp_score(overall),
        }
    }
}

fn clamp_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// round(min(100, 100 * total / span)); 0 when the span is empty.
pub fn focus_score(total_duration: i64, active_span: i64) -> u8 {
    if active_span <= 0 {
        return 0;
    }
    clamp_score((100.0 * total_duration as f64 / active_span as f64).min(100.0))
}

pub fn deep_work_score(segments: usize) -> u8 {
    DEEP_WORK_SCORES.get(segments).copied().unwrap_or(100)
}

/// Band the switches-per-active-hour rate.
pub fn switch_rate_score(switches: usize, active_span: i64) -> u8 {
    let per_hour = if active_span > 0 {
        switches as f64 / (active_span as f64 / 3600.0)
    } else {
        0.0
    };
    SWITCH_BANDS
        .iter()
        .find(|(limit, _)| per_hour <= *limit)
        .map(|(_, score)| *score)
        .unwrap_or(SWITCH_FLOOR_SCORE)
}

/// round(100 * top3 / total); 0 when nothing was recorded.
pub fn concentration_score(top3_duration: i64, total_duration: i64) -> u8 {
    if total_duration <= 0 {
        return 0;
    }
    clamp_score(100.0 * top3_duration as f64 / total_duration as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::session;
    use proptest::prelude::*;

    #[test]
    fn test_empty_day_scores_zero() {
        assert_eq!(DailyScores::compute(&[]), DailyScores::default());
    }

    #[test]
    fn test_single_hour_session() {
        let scores = DailyScores::compute(&[session("a", "Editor", 0, 3600)]);
        assert_eq!(scores.focus, 100);
        assert_eq!(scores.concentration, 100);
        assert_eq!(scores.switch_rate, 100);
        assert_eq!(scores.deep_work, 40);
        // 0.3*100 + 0.3*40 + 0.2*100 + 0.2*100
        assert_eq!(scores.overall, 82);
    }

    #[test]
    fn test_focus_counts_idle_gaps() {
        // 1h of sessions across a 2h span.
        let records = vec![
            session("a", "Editor", 0, 1800),
            session("b", "Editor", 5400, 1800),
        ];
        let scores = DailyScores::compute(&records);
        assert_eq!(scores.focus, 50);
        // The 1h gap splits the work into two 30-min segments.
        assert_eq!(scores.deep_work, 60);
    }

    #[test]
    fn test_focus_caps_overlapping_sessions_at_100() {
        let records = vec![
            session("a", "Editor", 0, 1000),
            session("b", "Browser", 0, 1000),
        ];
        assert_eq!(DailyScores::compute(&records).focus, 100);
    }

    #[test]
    fn test_deep_work_lookup_saturates() {
        assert_eq!(deep_work_score(0), 0);
        assert_eq!(deep_work_score(1), 40);
        assert_eq!(deep_work_score(2), 60);
        assert_eq!(deep_work_score(3), 75);
        assert_eq!(deep_work_score(4), 85);
        assert_eq!(deep_work_score(5), 100);
        assert_eq!(deep_work_score(42), 100);
    }

    #[test]
    fn test_switch_rate_bands() {
        let hour = 3600;
        assert_eq!(switch_rate_score(0, hour), 100);
        assert_eq!(switch_rate_score(4, hour), 100);
        assert_eq!(switch_rate_score(5, hour), 80);
        assert_eq!(switch_rate_score(8, hour), 80);
        assert_eq!(switch_rate_score(15, hour), 60);
        assert_eq!(switch_rate_score(25, hour), 40);
        assert_eq!(switch_rate_score(26, hour), 20);
        // Normalized per hour: 8 switches over 2h is 4/h.
        assert_eq!(switch_rate_score(8, 2 * hour), 100);
    }

    #[test]
    fn test_switches_count_adjacent_app_changes() {
        let records = vec![
            session("a", "Editor", 0, 60),
            session("b", "Browser", 60, 60),
            session("c", "Browser", 120, 60),
            session("d", "Editor", 180, 60),
        ];
        let sorted = sort_sessions(&records);
        let inputs = ScoreInputs::from_sorted(&sorted, &merge_sorted(&sorted));
        assert_eq!(inputs.switch_count, 2);
    }

    #[test]
    fn test_concentration_uses_top_three_apps() {
        let records = vec![
            session("a", "A", 0, 400),
            session("b", "B", 400, 300),
            session("c", "C", 700, 200),
            session("d", "D", 900, 100),
        ];
        assert_eq!(DailyScores::compute(&records).concentration, 90);
    }

    fn arb_records() -> impl Strategy<Value = Vec<SessionRecord>> {
        prop::collection::vec((0i64..86_400, 1i64..10_000, 0usize..6), 0..60).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (start, duration, app))| {
                    session(&format!("s{i}"), &format!("app-{app}"), start, duration)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_scores_stay_in_range(records in arb_records()) {
            let s = DailyScores::compute(&records);
            for v in [s.focus, s.deep_work, s.switch_rate, s.concentration, s.overall] {
                prop_assert!(v <= 100);
            }
            if records.is_empty() {
                prop_assert_eq!(s, DailyScores::default());
            }
        }

        #[test]
        fn prop_focus_monotonic_in_total_duration(
            span in 1i64..100_000,
            a in 0i64..200_000,
            b in 0i64..200_000,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(focus_score(lo, span) <= focus_score(hi, span));
        }
    }
}
