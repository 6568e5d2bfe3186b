// crates/server/src/error.rs
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use focuslog_core::{DateError, IngestError};
use focuslog_db::DbError;
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use crate::sync_queue::QueueError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid sync batch: {0}")]
    Ingest(#[from] IngestError),

    #[error("Invalid date: {0}")]
    Date(#[from] DateError),

    #[error("Queue unavailable: {0}")]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Ingest(err) if err.is_capacity() => {
                tracing::warn!(error = %err, "Sync batch too large");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::with_details("Batch too large", err.to_string()),
                )
            }
            ApiError::Ingest(err) => {
                tracing::warn!(error = %err, "Rejected sync batch");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid sync batch", err.to_string()),
                )
            }
            ApiError::Date(err) => {
                tracing::warn!(error = %err, "Rejected date");
                let error_msg = match err {
                    DateError::InvalidTimezone(_) => "Invalid timezone",
                    DateError::Malformed(_) | DateError::NotInPast { .. } => "Invalid date",
                };
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details(error_msg, err.to_string()),
                )
            }
            ApiError::Queue(err) => {
                tracing::warn!(error = %err, "Sync queue full");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::with_details("Sync queue full, retry later", err.to_string()),
                )
            }
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Database error", db_err.to_string()),
                )
            }
            ApiError::Unauthorized(msg) => {
                tracing::warn!(message = %msg, "Unauthorized");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::with_details("Unauthorized", msg.clone()),
                )
            }
            ApiError::PayloadTooLarge(msg) => {
                tracing::warn!(message = %msg, "Payload too large");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::with_details("Payload too large", msg.clone()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
