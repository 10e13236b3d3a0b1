//! Shared-secret authentication for mutating endpoints.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::error::ApiError;

/// Request header carrying the shared secret.
pub const AUTH_HEADER: &str = "auth";

/// Secret the `auth` header is checked against.
#[derive(Clone)]
pub struct AuthState {
    secret: Arc<str>,
}

impl AuthState {
    /// Creates the state for `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    /// Constant-time comparison against the configured secret.
    pub fn is_valid(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.secret.as_bytes()))
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState").finish_non_exhaustive()
    }
}

/// Rejects requests whose `auth` header does not match with a 401 FAILED body.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let presented = headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok());

    match presented {
        Some(secret) if auth.is_valid(secret) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected request with invalid auth header");
            ApiError::Unauthorized.into_response()
        }
    }
}
