//! Integration tests for the sandbox HTTP API.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot` on top of
//! the scripted `MockRuntime`, so no Docker daemon is needed.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use ojsandbox::api;
use ojsandbox::config::Config;
use ojsandbox::sandbox::mock::{MockExec, MockRuntime};
use ojsandbox::service::SandboxService;

const SECRET: &str = "secretKey";

// -----------------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------------

struct TestApp {
    _root: TempDir,
    router: Router,
    runtime: Arc<MockRuntime>,
}

fn app_with(runtime: MockRuntime, tweak: impl FnOnce(&mut Config)) -> TestApp {
    let root = TempDir::new().unwrap();
    let mut config = Config::default();
    config.sandbox.work_root = root.path().to_path_buf();
    config.sandbox.memory_sample_interval_ms = 10;
    tweak(&mut config);

    let runtime = Arc::new(runtime);
    let service = SandboxService::from_config(runtime.clone(), &config).unwrap();
    let router = api::router(Arc::new(service), &config.server);

    TestApp {
        _root: root,
        router,
        runtime,
    }
}

fn hello_app() -> TestApp {
    app_with(
        MockRuntime::new().with_exec(|cmd| {
            if cmd.contains("javac") {
                MockExec::stdout("")
            } else {
                MockExec::stdout("Hello")
            }
        }),
        |_| {},
    )
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn post_json(app: &TestApp, path: &str, auth: Option<&str>, body: &Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(secret) = auth {
        builder = builder.header("auth", secret);
    }
    let (status, bytes) = send(app, builder.body(Body::from(body.to_string())).unwrap()).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &TestApp, path: &str) -> (StatusCode, Vec<u8>) {
    send(app, Request::builder().uri(path).body(Body::empty()).unwrap()).await
}

// -----------------------------------------------------------------------------
// Execution
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_java_hello_world_three_runs() {
    let app = hello_app();
    let body = json!({
        "language": "JAVA",
        "code": "public class Main { public static void main(String[] a) { System.out.println(\"Hello\"); } }",
        "executionCount": 3
    });

    let (status, response) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "SUCCEED");
    assert_eq!(response["output"], json!(["Hello", "Hello", "Hello"]));
    assert_eq!(response["judgeInfo"]["message"], "Succeeded");
    assert_eq!(app.runtime.created_count(), 1);
}

#[tokio::test]
async fn test_oversized_execution_count_is_rejected() {
    let app = app_with(MockRuntime::new(), |config| config.sandbox.max_execution_count = 5);
    let body = json!({ "language": "PYTHON", "code": "print(1)", "executionCount": i64::MAX });

    let (status, response) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["status"], "FAILED");
    assert!(response["judgeInfo"]["message"]
        .as_str()
        .unwrap()
        .contains("at most 5"));
    assert_eq!(app.runtime.created_count(), 0);
}

#[tokio::test]
async fn test_python_infinite_loop_times_out() {
    let app = app_with(
        MockRuntime::new().with_exec(|cmd| {
            if cmd.contains("kill -9") {
                MockExec::stdout("")
            } else {
                MockExec::Hang
            }
        }),
        |config| config.sandbox.run_timeout_ms = 300,
    );
    let body = json!({ "language": "PYTHON", "code": "while True:\n    pass\n" });

    let (status, response) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "FAILED");
    assert!(response["judgeInfo"]["message"]
        .as_str()
        .unwrap()
        .starts_with("TIMEOUT"));
    assert_eq!(response["judgeInfo"]["time"], 300);
}

#[tokio::test]
async fn test_expected_output_is_judged() {
    let app = hello_app();
    let accepted = json!({ "language": "PYTHON", "code": "print('Hello')", "expectedOutput": "Hello\n" });
    let wrong = json!({ "language": "PYTHON", "code": "print('Hello')", "expectedOutput": "Bye" });

    let (_, accepted) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &accepted).await;
    let (_, wrong) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &wrong).await;

    assert_eq!(accepted["status"], "SUCCEED");
    assert_eq!(accepted["judgeInfo"]["message"], "Accepted");
    assert_eq!(wrong["status"], "FAILED");
    assert_eq!(wrong["judgeInfo"]["message"], "Wrong Answer");
}

#[tokio::test]
async fn test_language_route_forces_language() {
    let app = app_with(
        MockRuntime::new().with_exec(|cmd| {
            if cmd.contains("node main.js") {
                MockExec::stdout("from node")
            } else {
                MockExec::stdout("elsewhere")
            }
        }),
        |_| {},
    );
    let body = json!({ "language": "JAVA", "code": "console.log('from node')" });

    let (status, response) = post_json(&app, "/api/sandbox/javascript", Some(SECRET), &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["output"], json!(["from node"]));
}

#[tokio::test]
async fn test_file_inputs_reach_stdin() {
    let app = app_with(
        MockRuntime::new().with_exec(|cmd| {
            if cmd.contains("< input.txt") {
                MockExec::stdout("3")
            } else {
                MockExec::exit(1, "no input")
            }
        }),
        |_| {},
    );
    let body = json!({
        "language": "PYTHON",
        "code": "print(sum(int(l) for l in open(0)))",
        "inputs": ["1", "2"],
        "inputType": "FILE"
    });

    let (_, response) = post_json(&app, "/api/sandbox/python", Some(SECRET), &body).await;

    assert_eq!(response["status"], "SUCCEED");
    assert_eq!(response["output"], json!(["3"]));
}

// -----------------------------------------------------------------------------
// Request errors
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_null_language_is_bad_request() {
    let app = hello_app();
    let body = json!({ "language": null, "code": "print(1)" });

    let (status, response) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["status"], "FAILED");
    assert_eq!(app.runtime.created_count(), 0);
}

#[tokio::test]
async fn test_blank_code_and_unknown_language_are_bad_requests() {
    let app = hello_app();
    let blank = json!({ "language": "PYTHON", "code": "   " });
    let unknown = json!({ "language": "COBOL", "code": "DISPLAY 'HI'." });

    let (blank_status, blank) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &blank).await;
    let (unknown_status, unknown) =
        post_json(&app, "/api/sandbox/execute", Some(SECRET), &unknown).await;

    assert_eq!(blank_status, StatusCode::BAD_REQUEST);
    assert_eq!(blank["status"], "FAILED");
    assert_eq!(unknown_status, StatusCode::BAD_REQUEST);
    assert!(unknown["judgeInfo"]["message"]
        .as_str()
        .unwrap()
        .contains("COBOL"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = hello_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/sandbox/execute")
        .header("content-type", "application/json")
        .header("auth", SECRET)
        .body(Body::from("{not json"))
        .unwrap();

    let (status, bytes) = send(&app, request).await;
    let response: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["status"], "FAILED");
}

#[tokio::test]
async fn test_wrong_auth_is_unauthorized() {
    let app = hello_app();
    let body = json!({ "language": "PYTHON", "code": "print(1)" });

    let (wrong_status, wrong) = post_json(&app, "/api/sandbox/execute", Some("nope"), &body).await;
    let (missing_status, _) = post_json(&app, "/api/sandbox/execute", None, &body).await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["status"], "FAILED");
    assert_eq!(wrong["judgeInfo"]["message"], "Unauthorized access");
    assert_eq!(missing_status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.runtime.created_count(), 0);
}

#[tokio::test]
async fn test_unreachable_docker_is_internal_error() {
    let app = app_with(MockRuntime::new().unavailable(), |_| {});
    let body = json!({ "language": "PYTHON", "code": "print(1)" });

    let (status, response) = post_json(&app, "/api/sandbox/execute", Some(SECRET), &body).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response["status"], "FAILED");
    assert!(response["judgeInfo"]["message"]
        .as_str()
        .unwrap()
        .contains("Container unavailable"));
}

// -----------------------------------------------------------------------------
// Batch
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_batch_isolates_failing_item() {
    let app = hello_app();
    let body = json!([
        { "language": "PYTHON", "code": "print('Hello')" },
        { "language": "PYTHON" },
        { "language": "JAVASCRIPT", "code": "console.log('Hello')" },
        { "language": "PYTHON", "code": "print('Hello')", "executionCount": "three" },
        42
    ]);

    let (status, response) = post_json(&app, "/api/sandbox/execute/batch", Some(SECRET), &body).await;
    let items = response.as_array().unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(items.len(), 5);
    assert_eq!(items[0]["status"], "SUCCEED");
    assert_eq!(items[1]["status"], "FAILED");
    assert_eq!(items[1]["judgeInfo"]["message"], "code is required");
    assert_eq!(items[2]["status"], "SUCCEED");
    for malformed in &items[3..] {
        assert_eq!(malformed["status"], "FAILED");
        assert!(malformed["judgeInfo"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid batch item"));
    }
}

#[tokio::test]
async fn test_batch_rejects_non_array_body() {
    let app = hello_app();
    let body = json!({ "language": "PYTHON", "code": "print('Hello')" });

    let (status, response) = post_json(&app, "/api/sandbox/execute/batch", Some(SECRET), &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["status"], "FAILED");
}

#[tokio::test]
async fn test_batch_requires_auth() {
    let app = hello_app();

    let (status, _) = post_json(&app, "/api/sandbox/execute/batch", None, &json!([])).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -----------------------------------------------------------------------------
// Observability and lifecycle
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_status_before_any_request_reports_no_containers() {
    let app = hello_app();

    let (status, bytes) = get(&app, "/api/sandbox/containers/status").await;
    let summary: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(status, StatusCode::OK);
    for language in ["JAVA", "PYTHON", "JAVASCRIPT"] {
        assert_eq!(summary[language], "no container");
    }
}

#[tokio::test]
async fn test_status_after_request_reports_container() {
    let app = hello_app();
    let body = json!({ "language": "PYTHON", "code": "print('Hello')" });
    post_json(&app, "/api/sandbox/execute", Some(SECRET), &body).await;

    let (_, bytes) = get(&app, "/api/sandbox/containers/status").await;
    let summary: Value = serde_json::from_slice(&bytes).unwrap();

    assert!(summary["PYTHON"].as_str().unwrap().contains("running"));
    assert_eq!(summary["JAVA"], "no container");
}

#[tokio::test]
async fn test_health_and_languages() {
    let app = hello_app();

    let (health_status, health) = get(&app, "/api/sandbox/health").await;
    let (_, languages) = get(&app, "/api/sandbox/languages").await;
    let languages: Value = serde_json::from_slice(&languages).unwrap();

    assert_eq!(health_status, StatusCode::OK);
    assert_eq!(health, b"ok");
    assert_eq!(languages, json!(["JAVA", "PYTHON", "JAVASCRIPT"]));
}

#[tokio::test]
async fn test_cleanup_tears_down_containers() {
    let app = hello_app();
    let body = json!({ "language": "PYTHON", "code": "print('Hello')" });
    post_json(&app, "/api/sandbox/execute", Some(SECRET), &body).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/sandbox/cleanup")
        .header("auth", SECRET)
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = send(&app, request).await;
    let summary = String::from_utf8(bytes).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(summary.starts_with("Cleaned up 1 containers in"));
    assert_eq!(app.runtime.live_count(), 0);
}
