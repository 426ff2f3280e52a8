#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use unistacker_api::config::{DriverConfig, ServerConfig, TaskConfig};
use unistacker_api::router::build_app_router;
use unistacker_api::state::AppState;
use unistacker_core::submission::ScrapeRequest;
use unistacker_worker::{AutomationWorker, LogSink, WorkerError};

/// Upper bound on any single wait in these tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a test `ServerConfig` with safe defaults.
///
/// Points the static directory at a path that does not exist, so unmatched
/// routes fall through to 404.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8000".to_string()],
        request_timeout_secs: 30,
        static_dir: "__missing_static_dir__".to_string(),
        tasks: TaskConfig {
            max_concurrent_jobs: 8,
            job_timeout: Duration::from_secs(30),
            stream_idle: Duration::from_secs(1),
            channel_capacity: 64,
            ..TaskConfig::default()
        },
        driver: DriverConfig::default(),
    }
}

/// Build the full application router around `worker`.
///
/// Returns the state too so tests can inspect the registry directly.
pub fn build_test_app(worker: impl AutomationWorker + 'static) -> (Router, AppState) {
    let config = test_config();
    let state = AppState::new(config.clone(), Arc::new(worker));
    let app = build_app_router(state.clone(), &config);
    (app, state)
}

// ---------------------------------------------------------------------------
// Scripted worker
// ---------------------------------------------------------------------------

/// Worker that emits fixed lines, optionally waits for a gate to open, and
/// returns a fixed outcome.
///
/// Lines and results may contain `{user}`, replaced with the submitted
/// username so concurrent tasks are distinguishable.
#[derive(Clone)]
pub struct ScriptedWorker {
    lines: Vec<String>,
    outcome: Result<Value, String>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedWorker {
    pub fn succeed(lines: &[&str], result: Value) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            outcome: Ok(result),
            gate: None,
        }
    }

    pub fn fail(lines: &[&str], cause: &str) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            outcome: Err(cause.to_string()),
            gate: None,
        }
    }

    /// Hold every run after its lines until [`open_gate`] is called.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }
}

/// Let every gated run finish.
pub fn open_gate(gate: &Semaphore) {
    gate.add_permits(1);
}

#[async_trait]
impl AutomationWorker for ScriptedWorker {
    async fn run(&self, request: ScrapeRequest, sink: LogSink) -> Result<Value, WorkerError> {
        for line in &self.lines {
            sink.emit(line.replace("{user}", &request.username)).await;
        }
        if let Some(gate) = &self.gate {
            // Dropping the permit hands it to the next gated run.
            let _permit = gate.acquire().await;
        }
        match &self.outcome {
            Ok(result) => {
                let rendered = result.to_string().replace("{user}", &request.username);
                Ok(serde_json::from_str(&rendered)?)
            }
            Err(cause) => Err(WorkerError::Failed(cause.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, json: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read an SSE response to its end and parse every `data:` line as JSON.
///
/// Keepalive comments are skipped.
pub async fn sse_events(response: Response<Body>) -> Vec<Value> {
    let collected = tokio::time::timeout(TEST_TIMEOUT, response.into_body().collect())
        .await
        .expect("event stream did not end in time")
        .unwrap();
    let text = String::from_utf8(collected.to_bytes().to_vec()).unwrap();
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}

/// A valid submission for `username`.
pub fn submission(username: &str) -> Value {
    serde_json::json!({
        "username": username,
        "password": "secret",
        "captcha_api_key": "key",
    })
}

/// Submit a job and return its task id.
pub async fn submit(app: &Router, username: &str) -> String {
    let response = post_json(app.clone(), "/api/run-scraper", submission(username)).await;
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);
    let json = body_json(response).await;
    json["task_id"].as_str().unwrap().to_string()
}

/// Poll the task status endpoint until the task reaches `state`.
pub async fn wait_for_state(app: &Router, task_id: &str, state: &str) {
    let uri = format!("/api/tasks/{task_id}");
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let response = get(app.clone(), &uri).await;
            if response.status().is_success() && body_json(response).await["data"]["state"] == state
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {task_id} never reached {state}"));
}
