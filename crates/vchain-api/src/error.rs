//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vchain_firestore::FirestoreError;
use vchain_models::ValidationError;
use vchain_queue::QueueError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Firestore(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Firestore(e) if e.is_already_exists() => StatusCode::CONFLICT,
            ApiError::Queue(QueueError::Duplicate(_)) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Firestore(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code, in the callable-function vocabulary
    /// clients already understand.
    pub fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "invalid-argument",
            StatusCode::NOT_FOUND => "not-found",
            StatusCode::CONFLICT => "already-exists",
            StatusCode::TOO_MANY_REQUESTS => "resource-exhausted",
            _ => "internal",
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT")
                .map(|e| e.eq_ignore_ascii_case("production"))
                .unwrap_or(false)
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}
