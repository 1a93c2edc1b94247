//! HTTP-facing error taxonomy.
//!
//! Validation and authorization failures are rejected synchronously and map
//! to 4xx responses. Retryable failures (an object-store completion that
//! timed out, a queue that could not accept a message) map to 503 so the
//! caller knows a retry is worthwhile. Internal errors are logged with full
//! detail but never expose it to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::domains::jobs::store::JobStoreError;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input. Never enqueued, never retried.
    #[error("{0}")]
    Validation(String),

    /// Caller is not the owner (or an admin) of the resource.
    #[error("forbidden")]
    Forbidden,

    /// Unknown, expired, or purged resource. Distinct from Forbidden.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The request conflicts with the resource's current state.
    #[error("{0}")]
    Conflict(String),

    /// A dependency failed transiently; the caller should retry.
    #[error("{0}")]
    Retryable(String),

    /// Unexpected failure. Details are logged, not exposed.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Retryable(_) => (StatusCode::SERVICE_UNAVAILABLE, "retryable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            ApiError::Internal(e) => {
                error!(error = %e, "internal error serving request");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": { "code": code, "message": message }
        }));

        (status, body).into_response()
    }
}

impl From<JobStoreError> for ApiError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound { .. } => ApiError::NotFound("job"),
            JobStoreError::InvalidTransition { from, to } => {
                ApiError::Conflict(format!("job cannot move from {from} to {to}"))
            }
            other => ApiError::Internal(other.into()),
        }
    }
}
