// crates/core/src/ingest.rs
//! Boundary validation for inbound sync batches.
//!
//! The wire payload is deserialized into [`SyncRequest`], whose session
//! fields are all optional so that a missing field can be reported by index
//! instead of failing the whole body. [`SyncRequest::into_records`] is the one
//! place where required-vs-optional is decided; everything downstream works
//! on fully-populated [`SessionRecord`]s.

use serde::Deserialize;

use crate::error::IngestError;
use crate::types::SessionRecord;

/// Hard ceiling on sessions per sync request.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Which field carries the interval length.
///
/// Version 2 is canonical. Version 1 is only used when the client asks for
/// it explicitly; there is no silent fallback between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// `end_time` required, `duration` derived.
    V1,
    /// `duration` required, `end_time` derived.
    V2,
}

impl SchemaVersion {
    pub const CURRENT: Self = Self::V2;

    pub fn from_number(n: u32) -> Result<Self, IngestError> {
        match n {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(IngestError::UnsupportedSchema(other)),
        }
    }
}

/// The authenticated owner stamped on every record of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOwner {
    pub user_id: String,
    pub device_id: String,
}

/// One session as sent by the client. Unknown fields (including any
/// client-supplied `user_id`) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSession {
    pub id: Option<String>,
    pub app_name: Option<String>,
    pub window_title: Option<String>,
    pub url: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub duration: Option<i64>,
    pub bundle_id: Option<String>,
    pub tab_title: Option<String>,
    pub tab_count: Option<i64>,
    pub document_path: Option<String>,
    #[serde(default)]
    pub is_full_screen: bool,
    #[serde(default)]
    pub is_minimized: bool,
}

/// Body of `POST /api/sync`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub sessions: Vec<RawSession>,
}

impl SyncRequest {
    pub fn schema(&self) -> Result<SchemaVersion, IngestError> {
        self.schema_version
            .map(SchemaVersion::from_number)
            .unwrap_or(Ok(SchemaVersion::CURRENT))
    }

    /// Validate the whole batch and map it onto records owned by `owner`.
    ///
    /// Size checks run before any per-record work, so an oversized batch is
    /// rejected without touching its contents.
    pub fn into_records(
        self,
        owner: &BatchOwner,
        synced_at: i64,
    ) -> Result<Vec<SessionRecord>, IngestError> {
        if self.sessions.is_empty() {
            return Err(IngestError::EmptyBatch);
        }
        if self.sessions.len() > MAX_BATCH_SIZE {
            return Err(IngestError::BatchTooLarge {
                size: self.sessions.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        let schema = self.schema()?;

        self.sessions
            .into_iter()
            .enumerate()
            .map(|(index, raw)| validate_session(index, raw, schema, owner, synced_at))
            .collect()
    }
}

fn required_text(
    index: usize,
    field: &'static str,
    value: Option<String>,
) -> Result<String, IngestError> {
    match value {
        None => Err(IngestError::MissingField { index, field }),
        Some(v) if v.trim().is_empty() => Err(IngestError::invalid(index, field, "must not be empty")),
        Some(v) => Ok(v),
    }
}

fn validate_session(
    index: usize,
    raw: RawSession,
    schema: SchemaVersion,
    owner: &BatchOwner,
    synced_at: i64,
) -> Result<SessionRecord, IngestError> {
    let id = required_text(index, "id", raw.id)?;
    let app_name = required_text(index, "app_name", raw.app_name)?;
    let window_title = raw.window_title.ok_or(IngestError::MissingField {
        index,
        field: "window_title",
    })?;
    let start_time = raw.start_time.ok_or(IngestError::MissingField {
        index,
        field: "start_time",
    })?;
    if start_time < 0 {
        return Err(IngestError::invalid(index, "start_time", "must not be negative"));
    }

    let (end_time, duration) = match schema {
        SchemaVersion::V2 => {
            let duration = raw.duration.ok_or(IngestError::MissingField {
                index,
                field: "duration",
            })?;
            if duration <= 0 {
                return Err(IngestError::invalid(index, "duration", "must be positive"));
            }
            let end_time = start_time
                .checked_add(duration)
                .ok_or_else(|| IngestError::invalid(index, "duration", "overflows end_time"))?;
            if raw.end_time.is_some_and(|e| e != end_time) {
                return Err(IngestError::invalid(
                    index,
                    "end_time",
                    "must equal start_time + duration",
                ));
            }
            (end_time, duration)
        }
        SchemaVersion::V1 => {
            let end_time = raw.end_time.ok_or(IngestError::MissingField {
                index,
                field: "end_time",
            })?;
            if end_time <= start_time {
                return Err(IngestError::invalid(index, "end_time", "must be after start_time"));
            }
            let duration = end_time - start_time;
            if raw.duration.is_some_and(|d| d != duration) {
                return Err(IngestError::invalid(
                    index,
                    "duration",
                    "must equal end_time - start_time",
                ));
            }
            (end_time, duration)
        }
    };

    if raw.tab_count.is_some_and(|c| c < 0) {
        return Err(IngestError::invalid(index, "tab_count", "must not be negative"));
    }

    Ok(SessionRecord {
        id,
        user_id: owner.user_id.clone(),
        device_id: owner.device_id.clone(),
        app_name,
        window_title,
        url: raw.url,
        start_time,
        end_time,
        duration,
        bundle_id: raw.bundle_id,
        tab_title: raw.tab_title,
        tab_count: raw.tab_count,
        document_path: raw.document_path,
        is_full_screen: raw.is_full_screen,
        is_minimized: raw.is_minimized,
        synced_at,
    })
}
