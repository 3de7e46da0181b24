//! Errors returned by handlers, rendered as `{"detail": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use framex_queue::QueueError;
use framex_store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

const HIDDEN_DETAIL: &str = "internal server error";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// Request body failed field validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The job's current status does not allow the operation.
    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Internal(String),

    #[error("job store: {0}")]
    Store(#[from] StoreError),

    #[error("work queue: {0}")]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(detail.into())
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest(detail.into())
    }

    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState(detail.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    pub fn status_code(&self) -> StatusCode {
        use ApiError::*;
        match self {
            NotFound(_) | Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            BadRequest(_) | Validation(_) | InvalidState(_) => StatusCode::BAD_REQUEST,
            Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            Internal(_) | Store(_) | Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn hide_internal_details() -> bool {
    std::env::var("ENVIRONMENT").is_ok_and(|env| env.eq_ignore_ascii_case("production"))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = if status.is_server_error() {
            error!(error = %self, "Request failed");
            if hide_internal_details() {
                HIDDEN_DETAIL.to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
