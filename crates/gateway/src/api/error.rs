//! HTTP error responses.  Every error body is `{ "error": "<message>" }`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::runtime::TurnError;

/// Errors a handler can return before (or instead of) streaming.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("UNAUTHORIZED")]
    Unauthorized,
    #[error("ACCESS_DENIED")]
    AccessDenied,
    #[error("INSUFFICIENT_PERMISSIONS")]
    InsufficientPermissions,
    #[error("Thread not found or access denied")]
    NotFound,
    #[error("{0}")]
    ThreadBusy(String),
    #[error("{0}")]
    Upstream(String),
    /// Logged in full, reported generically.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AccessDenied | ApiError::InsufficientPermissions => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ThreadBusy(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                "An internal error occurred".to_owned()
            }
            ApiError::Upstream(detail) => {
                tracing::warn!(error = %detail, "upstream provider error");
                detail.clone()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Validation(msg) => ApiError::Validation(msg),
            TurnError::ThreadNotFound => ApiError::NotFound,
            TurnError::Busy(busy) => ApiError::ThreadBusy(busy.to_string()),
            TurnError::Upstream(e) => ApiError::Upstream(e.to_string()),
            TurnError::Run(msg) => ApiError::Upstream(msg),
            TurnError::Ownership(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<fr_domain::error::Error> for ApiError {
    fn from(err: fr_domain::error::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
