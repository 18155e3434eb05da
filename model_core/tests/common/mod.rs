//! Common utilities for model_core integration tests
//!
//! A small axum server stands in for both the model hub (handle probes) and
//! the hosted inference API.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use model_core::InferenceConfig;

pub const TOKEN: &str = "test-token";
pub const CAPTION: &str = "a dog running in a field";
pub const STORY: &str = "The dog ran free under golden skies, chasing dreams only it could see.";

#[derive(Clone, Default)]
pub struct HubCounters {
    pub probes: Arc<AtomicUsize>,
    pub inferences: Arc<AtomicUsize>,
    pub last_body: Arc<std::sync::Mutex<Option<Value>>>,
}

impl HubCounters {
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn inferences(&self) -> usize {
        self.inferences.load(Ordering::SeqCst)
    }
}

pub struct MockHub {
    pub addr: SocketAddr,
    pub counters: HubCounters,
}

impl MockHub {
    /// Config pointing every URL at this mock, using the given model ids.
    pub fn config(&self, caption_model: &str, story_model: &str) -> InferenceConfig {
        let mut config = InferenceConfig::new(TOKEN);
        config.inference_url = format!("http://{}/models", self.addr);
        config.hub_url = format!("http://{}", self.addr);
        config.caption_model = caption_model.to_string();
        config.story_model = story_model.to_string();
        config.timeout_secs = 5;
        config
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TOKEN}"))
        .unwrap_or(false)
}

async fn model_info(
    State(counters): State<HubCounters>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    counters.probes.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid credentials"}))).into_response();
    }
    match id.as_str() {
        "opaque" => "<html>model card</html>".into_response(),
        "missing" => (StatusCode::NOT_FOUND, Json(json!({"error": "Repository not found"}))).into_response(),
        "captioner" | "blank-captioner" | "blank-text-captioner" => Json(json!({"id": id, "pipeline_tag": "image-to-text"})).into_response(),
        _ => Json(json!({"id": id, "pipeline_tag": "text-generation"})).into_response(),
    }
}

async fn infer(
    State(counters): State<HubCounters>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    counters.inferences.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid credentials"}))).into_response();
    }
    if let Ok(value) = serde_json::from_slice::<Value>(&body) {
        *counters.last_body.lock().unwrap() = Some(value);
    }
    match id.as_str() {
        "captioner" => Json(json!([{ "generated_text": CAPTION }])).into_response(),
        "blank-captioner" => Json(json!([])).into_response(),
        "blank-text-captioner" => Json(json!([{ "generated_text": "" }])).into_response(),
        "storyteller" => {
            let prompt = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|v| v["inputs"].as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            Json(json!([{ "generated_text": format!("  {prompt}{STORY}\n\n") }])).into_response()
        }
        "silent" => Json(json!([{ "generated_text": "   \n" }])).into_response(),
        _ => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "Model is overloaded"}))).into_response(),
    }
}

/// Start the mock on an ephemeral port.
pub async fn spawn_hub() -> MockHub {
    let counters = HubCounters::default();
    let app = Router::new()
        .route("/api/models/{*id}", get(model_info))
        .route("/models/{*id}", post(infer))
        .with_state(counters.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockHub { addr, counters }
}

/// Smallest byte string that sniffs as JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9]
}
