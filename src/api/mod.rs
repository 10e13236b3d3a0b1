//! HTTP API under `/api/sandbox`.
//!
//! `health`, `languages` and `containers/status` are public; every route
//! that executes code or tears containers down requires the shared secret
//! in the `auth` header.

mod auth;
mod error;
mod handlers;
mod types;

pub use auth::{AuthState, AUTH_HEADER};
pub use error::ApiError;
pub use handlers::AppState;
pub use types::{ExecuteCodeRequest, ExecuteCodeResponse, JudgeInfo, ResponseStatus};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;

/// Builds the router over a running service.
pub fn router(service: AppState, server: &ServerConfig) -> Router {
    let auth_state = AuthState::new(server.auth_secret.clone());

    let public = Router::new()
        .route("/api/sandbox/health", get(handlers::health))
        .route("/api/sandbox/languages", get(handlers::languages))
        .route("/api/sandbox/containers/status", get(handlers::container_status));

    let protected = Router::new()
        .route("/api/sandbox/execute", post(handlers::execute))
        .route("/api/sandbox/execute/batch", post(handlers::execute_batch))
        .route("/api/sandbox/java", post(handlers::execute_java))
        .route("/api/sandbox/python", post(handlers::execute_python))
        .route("/api/sandbox/javascript", post(handlers::execute_javascript))
        .route("/api/sandbox/cleanup", post(handlers::cleanup))
        .route_layer(middleware::from_fn_with_state(auth_state, auth::auth_middleware));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .with_state(service)
}

/// Serves `app` until `shutdown` resolves, then drains in-flight requests.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Sandbox API listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
