//! HTTP error responses.
//!
//! Engine errors map onto four codes clients can branch on:
//! `NOT_FOUND`, `CONFLICT`, `VALIDATION_ERROR` and `INTERNAL_SERVER_ERROR`.
//! Handlers replace the generic detail with wording for their resource.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::engine::EngineError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    /// User-facing message.
    detail: String,
    code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            detail: detail.into(),
            code,
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail, "NOT_FOUND")
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, detail, "CONFLICT")
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail, "VALIDATION_ERROR")
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred",
            "INTERNAL_SERVER_ERROR",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.detail)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
    code: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: &self.detail,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::RegistrationNotFound { .. }
            | EngineError::KindMismatch { .. } => Self::not_found(err.to_string()),
            EngineError::AlreadyExists(_)
            | EngineError::Conflict(_)
            | EngineError::CapacityExceeded(_)
            | EngineError::Duplicate(_)
            | EngineError::CapacityBelowOccupancy { .. }
            | EngineError::HasActiveBookings(_) => Self::conflict(err.to_string()),
            EngineError::InvalidWindow(_) | EngineError::LimitExceeded(_) => {
                Self::validation(err.to_string())
            }
            EngineError::WalError(e) => {
                tracing::error!(error = %e, "storage failure");
                Self::internal()
            }
        }
    }
}
