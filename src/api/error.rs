//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::scheduling::validation::ValidationReport;
use crate::scheduling::SchedulingError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    /// Structured validation report, present only for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Caller identity required")]
    MissingCaller,
    #[error("Access denied: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Validation failed")]
    Validation(ValidationReport),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            ApiError::MissingCaller => (
                StatusCode::UNAUTHORIZED,
                "CALLER_REQUIRED",
                "X-Caller-Id header required".to_string(),
                None,
            ),
            ApiError::Forbidden(detail) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                detail.clone(),
                None,
            ),
            ApiError::NotFound(detail) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                detail.clone(),
                None,
            ),
            ApiError::Conflict(detail) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                detail.clone(),
                None,
            ),
            ApiError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                detail.clone(),
                None,
            ),
            ApiError::Validation(report) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                report.error_summary(),
                serde_json::to_value(report).ok(),
            ),
            ApiError::Unprocessable(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE",
                detail.clone(),
                None,
            ),
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::UnsupportedFrequency(input) => {
                ApiError::BadRequest(format!("unsupported frequency {input:?}"))
            }
            SchedulingError::Validation(detail) => ApiError::BadRequest(detail),
            SchedulingError::MissingTimezone { patient_id } => ApiError::Unprocessable(format!(
                "patient {patient_id} has a missing or invalid timezone"
            )),
            SchedulingError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} {id}"))
            }
            SchedulingError::AccessDenied { caller } => {
                ApiError::Forbidden(format!("caller {caller} may not act on this patient"))
            }
            SchedulingError::TransitionConflict { id } => ApiError::Conflict(format!(
                "dose event {id} is no longer in the scheduled state"
            )),
            SchedulingError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
