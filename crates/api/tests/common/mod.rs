#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get as route_get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use poser_api::config::ServerConfig;
use poser_api::engine::run_log::{RunLog, RunLogError};
use poser_api::engine::runner::GenerationRunner;
use poser_api::router::build_app_router;
use poser_api::state::AppState;
use poser_comfyui::executor::WorkflowExecutor;
use poser_core::template_store::TemplateStore;
use poser_db::models::workflow_run::NewWorkflowRun;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

pub const PROMPT_ID: &str = "prompt-42";
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR fake";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(comfyui_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        comfyui_url: comfyui_url.to_string(),
        comfyui_ws_url: poser_api::config::derive_ws_url(comfyui_url),
        workflows_dir: workflows_dir().display().to_string(),
        default_timeout_secs: 5,
        max_timeout_secs: 10,
        database_url: None,
    }
}

pub fn workflows_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../workflows")
}

/// Build the full application router against `comfyui_url`, with
/// `run_log` standing in for PostgreSQL.
pub fn build_test_app(run_log: Arc<MemoryRunLog>, comfyui_url: &str) -> Router {
    let config = test_config(comfyui_url);
    let executor = WorkflowExecutor::new(config.comfyui_url.clone(), config.comfyui_ws_url.clone());
    let templates = TemplateStore::new(&config.workflows_dir);
    let runner = GenerationRunner::new(executor, templates, run_log);

    let state = AppState {
        config: Arc::new(config.clone()),
        runner: Arc::new(runner),
    };
    build_app_router(state, &config)
}

/// A base URL nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// In-memory run log
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryRunLog {
    pub runs: Mutex<Vec<NewWorkflowRun>>,
    pub cache: Mutex<HashMap<String, String>>,
    /// Make every operation fail.
    pub broken: bool,
}

impl MemoryRunLog {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn seed(&self, fingerprint: &str, image_base64: &str) {
        self.cache
            .lock()
            .unwrap()
            .insert(fingerprint.to_string(), image_base64.to_string());
    }

    pub fn runs(&self) -> Vec<NewWorkflowRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunLog for MemoryRunLog {
    async fn record(&self, run: NewWorkflowRun) -> Result<(), RunLogError> {
        if self.broken {
            return Err(RunLogError::Unavailable("memory log is broken".into()));
        }
        self.runs.lock().unwrap().push(run);
        Ok(())
    }

    async fn cached_image(&self, fingerprint: &str) -> Result<Option<String>, RunLogError> {
        if self.broken {
            return Err(RunLogError::Unavailable("memory log is broken".into()));
        }
        Ok(self.cache.lock().unwrap().get(fingerprint).cloned())
    }

    async fn is_healthy(&self) -> bool {
        !self.broken
    }
}

// ---------------------------------------------------------------------------
// Fake ComfyUI
// ---------------------------------------------------------------------------

pub struct FakeEngine {
    /// Events pushed after submission.
    pub events: Vec<Value>,
    /// Per-node outputs served from history.
    pub outputs: Value,
    pub submitted: Notify,
    pub prompt: Mutex<Option<Value>>,
    pub uploads: Mutex<usize>,
}

impl FakeEngine {
    /// An engine that finishes every prompt with `x.png` in `out`.
    pub fn succeeding() -> Self {
        Self::new(
            vec![json!({"type": "execution_success", "data": {"prompt_id": PROMPT_ID}})],
            json!({"170": {"images": [{"filename": "x.png", "subfolder": "out", "type": "output"}]}}),
        )
    }

    pub fn new(events: Vec<Value>, outputs: Value) -> Self {
        Self {
            events,
            outputs,
            submitted: Notify::new(),
            prompt: Mutex::new(None),
            uploads: Mutex::new(0),
        }
    }
}

type Engine = Arc<FakeEngine>;

async fn engine_submit(State(engine): State<Engine>, Json(body): Json<Value>) -> Json<Value> {
    *engine.prompt.lock().unwrap() = Some(body["prompt"].clone());
    engine.submitted.notify_one();
    Json(json!({"prompt_id": PROMPT_ID, "number": 1}))
}

async fn engine_history(State(engine): State<Engine>) -> Json<Value> {
    Json(json!({PROMPT_ID: {"outputs": engine.outputs.clone()}}))
}

async fn engine_view() -> Response {
    PNG_BYTES.to_vec().into_response()
}

async fn engine_upload(State(engine): State<Engine>) -> Json<Value> {
    *engine.uploads.lock().unwrap() += 1;
    Json(json!({"name": "portrait.png", "subfolder": "poser", "type": "input"}))
}

async fn engine_ws(State(engine): State<Engine>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| engine_push(socket, engine))
}

async fn engine_push(mut socket: WebSocket, engine: Engine) {
    engine.submitted.notified().await;
    for event in &engine.events {
        if socket.send(Message::Text(event.to_string().into())).await.is_err() {
            return;
        }
    }
    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
}

/// Serve `engine` on an ephemeral port; returns its base URL.
pub async fn spawn_engine(engine: Engine) -> String {
    let app = Router::new()
        .route("/prompt", post(engine_submit))
        .route("/history/{prompt_id}", route_get(engine_history))
        .route("/view", route_get(engine_view))
        .route("/upload/image", post(engine_upload))
        .route("/ws", route_get(engine_ws))
        .with_state(engine);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    app.oneshot(
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
