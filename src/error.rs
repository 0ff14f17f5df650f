// coordinator-agent: Error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Coordinator result type
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Coordinator error types
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Caller sent an unusable request (missing fields, nothing extractable)
    #[error("{0}")]
    BadRequest(String),

    /// An upstream collaborator (LLM or vector store) failed or answered garbage
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Requested resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// HTTP status this error surfaces as
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoordinatorError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::Upstream(_) => StatusCode::BAD_GATEWAY,
            CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::Config(_) | CoordinatorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<reqwest::Error> for CoordinatorError {
    fn from(err: reqwest::Error) -> Self {
        CoordinatorError::Upstream(err.to_string())
    }
}
