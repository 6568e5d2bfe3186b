// crates/core/src/error.rs
use thiserror::Error;

/// Errors raised while validating an inbound sync batch.
///
/// Every variant is a client error: nothing here is retried by the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("Batch contains no sessions")]
    EmptyBatch,

    #[error("Batch of {size} sessions exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Unsupported schema version: {0}")]
    UnsupportedSchema(u32),

    #[error("sessions[{index}].{field} is required")]
    MissingField { index: usize, field: &'static str },

    #[error("sessions[{index}].{field} is invalid: {reason}")]
    InvalidField {
        index: usize,
        field: &'static str,
        reason: String,
    },
}

impl IngestError {
    pub fn invalid(index: usize, field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            index,
            field,
            reason: reason.into(),
        }
    }

    /// True when the caller must split the batch and resubmit.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::BatchTooLarge { .. })
    }
}

/// Errors raised while resolving a requested calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    Malformed(String),

    #[error("Date {date} is not in the past (today is {today})")]
    NotInPast { date: String, today: String },

    #[error("Invalid timezone '{0}', expected UTC or an offset like +09:00")]
    InvalidTimezone(String),
}
