//! Web error type and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use loess_core::StoreError;

pub type Result<T> = std::result::Result<T, WebError>;

/// Request-level failures, surfaced before any stream opens. Everything
/// after the stream starts is reported as an `error` event instead.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WebError::Store(_) | WebError::Config(_) | WebError::Io(_) => {
                tracing::error!(error = %self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let detail = match &self {
            // Internal detail stays in the logs.
            WebError::Store(_) | WebError::Io(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
