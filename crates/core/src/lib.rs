// crates/core/src/lib.rs
//! Pure domain logic for focus-session ingestion and daily analytics.
//!
//! Nothing in this crate performs I/O: validation, segment merging, scoring
//! and aggregation are deterministic functions of their inputs.

pub mod date;
pub mod error;
pub mod ingest;
pub mod paths;
pub mod scoring;
pub mod segments;
pub mod stats;
pub mod types;

pub use date::{parse_date, resolve_past_day, DayWindow, UserTimezone};
pub use error::*;
pub use ingest::{BatchOwner, RawSession, SchemaVersion, SyncRequest, MAX_BATCH_SIZE};
pub use scoring::ScoreInputs;
pub use segments::{merge_segments, MERGE_GAP_SECS};
pub use stats::compute_daily_stats;
pub use types::*;
