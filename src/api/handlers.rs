//! Route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::error::ApiError;
use super::types::{ExecuteCodeRequest, ExecuteCodeResponse};
use crate::language::Language;
use crate::service::SandboxService;

/// State shared by every handler.
pub type AppState = Arc<SandboxService>;

pub(super) async fn health() -> &'static str {
    "ok"
}

pub(super) async fn languages(State(service): State<AppState>) -> Json<Vec<&'static str>> {
    Json(service.languages().into_iter().map(Language::wire_name).collect())
}

pub(super) async fn container_status(
    State(service): State<AppState>,
) -> Json<BTreeMap<Language, String>> {
    Json(service.container_status().await)
}

pub(super) async fn execute(
    State(service): State<AppState>,
    body: Result<Json<ExecuteCodeRequest>, JsonRejection>,
) -> Result<Json<ExecuteCodeResponse>, ApiError> {
    let Json(request) = body?;
    run_one(&service, request, None).await.map(Json)
}

pub(super) async fn execute_java(
    State(service): State<AppState>,
    body: Result<Json<ExecuteCodeRequest>, JsonRejection>,
) -> Result<Json<ExecuteCodeResponse>, ApiError> {
    let Json(request) = body?;
    run_one(&service, request, Some(Language::Java)).await.map(Json)
}

pub(super) async fn execute_python(
    State(service): State<AppState>,
    body: Result<Json<ExecuteCodeRequest>, JsonRejection>,
) -> Result<Json<ExecuteCodeResponse>, ApiError> {
    let Json(request) = body?;
    run_one(&service, request, Some(Language::Python)).await.map(Json)
}

pub(super) async fn execute_javascript(
    State(service): State<AppState>,
    body: Result<Json<ExecuteCodeRequest>, JsonRejection>,
) -> Result<Json<ExecuteCodeResponse>, ApiError> {
    let Json(request) = body?;
    run_one(&service, request, Some(Language::JavaScript)).await.map(Json)
}

/// Runs every item concurrently; a failing item becomes a FAILED entry at
/// its position instead of failing the batch.
///
/// Only the outer array is parsed up front. Each item is decoded on its own
/// so a malformed item fails alone.
pub(super) async fn execute_batch(
    State(service): State<AppState>,
    body: Result<Json<Vec<serde_json::Value>>, JsonRejection>,
) -> Result<Json<Vec<ExecuteCodeResponse>>, ApiError> {
    let Json(items) = body?;
    info!(items = items.len(), "Executing batch");

    let responses = join_all(items.into_iter().map(|item| {
        let service = Arc::clone(&service);
        async move {
            let outcome = match serde_json::from_value::<ExecuteCodeRequest>(item) {
                Ok(request) => run_one(&service, request, None).await,
                Err(e) => Err(ApiError::BadRequest(format!("Invalid batch item: {e}"))),
            };
            outcome.unwrap_or_else(|e| e.to_body())
        }
    }))
    .await;

    Ok(Json(responses))
}

pub(super) async fn cleanup(State(service): State<AppState>) -> String {
    service.cleanup().await.to_string()
}

async fn run_one(
    service: &SandboxService,
    request: ExecuteCodeRequest,
    forced: Option<Language>,
) -> Result<ExecuteCodeResponse, ApiError> {
    let request = request.into_execution_request(forced)?;
    let judged = request.expected_output.is_some();
    debug!(
        language = %request.language,
        runs = request.effective_repeat(),
        judged,
        "Executing request"
    );

    let result = service.execute(&request).await?;
    let response = ExecuteCodeResponse::from_result(&result, judged);
    info!(
        language = %request.language,
        status = ?response.status,
        time_ms = response.judge_info.time,
        memory_kb = response.judge_info.memory,
        "Request finished"
    );
    Ok(response)
}
