// crates/core/src/segments.rs
//! Segment merging: joins consecutive same-app sessions into work segments.

use crate::types::{MergedSegment, SessionRecord};

/// A same-app session starting less than this many seconds after the current
/// segment's end extends that segment.
pub const MERGE_GAP_SECS: i64 = 300;

/// Sort sessions by start time with a total tie-break, so every later step
/// sees the same order regardless of how the input was arranged.
pub fn sort_sessions(records: &[SessionRecord]) -> Vec<&SessionRecord> {
    let mut sorted: Vec<&SessionRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.end_time.cmp(&b.end_time))
            .then_with(|| a.app_name.cmp(&b.app_name))
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted
}

/// Merge a day's sessions into segments. Input order does not matter.
pub fn merge_segments(records: &[SessionRecord]) -> Vec<MergedSegment> {
    merge_sorted(&sort_sessions(records))
}

/// Merge sessions that are already in [`sort_sessions`] order.
pub fn merge_sorted(sorted: &[&SessionRecord]) -> Vec<MergedSegment> {
    let mut segments: Vec<MergedSegment> = Vec::new();

    for record in sorted {
        match segments.last_mut() {
            Some(current)
                if current.app_name == record.app_name
                    && record.start_time - current.end < MERGE_GAP_SECS =>
            {
                // Overlapping records never shrink the segment.
                current.end = current.end.max(record.end_time);
                current.duration += record.duration;
                current.session_count += 1;
            }
            _ => segments.push(MergedSegment {
                app_name: record.app_name.clone(),
                start: record.start_time,
                end: record.end_time,
                duration: record.duration,
                session_count: 1,
            }),
        }
    }

    segments
}
