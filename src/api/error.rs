//! HTTP-facing errors. Every variant renders as a FAILED response body.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use super::types::ExecuteCodeResponse;
use crate::executor::ExecuteError;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The shared secret is missing or wrong.
    #[error("Unauthorized access")]
    Unauthorized,

    /// The body is malformed or misses a required field.
    #[error("{0}")]
    BadRequest(String),

    /// The requested language has no executor.
    #[error("{0}")]
    Unsupported(String),

    /// Anything the caller cannot fix.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Unsupported(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The FAILED body carried by this error.
    pub fn to_body(&self) -> ExecuteCodeResponse {
        ExecuteCodeResponse::failed(self.to_string())
    }
}

impl From<ExecuteError> for ApiError {
    fn from(err: ExecuteError) -> Self {
        match err {
            ExecuteError::Validation { message } => Self::BadRequest(message),
            ExecuteError::UnsupportedLanguage { .. } => Self::Unsupported(err.to_string()),
            ExecuteError::ContainerUnavailable(_) | ExecuteError::Payload(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(message) = &self {
            error!("Request failed: {}", message);
        }
        (self.status_code(), Json(self.to_body())).into_response()
    }
}
