//! HTTP surface: routes, middleware and handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::{Html, Response},
    routing::{get, post},
    Json, Router,
};
use model_core::{ModelRegistry, ModelStatus};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tts_core::{SpeechConfig, Strictness};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{MetricsResponse, SystemMetrics};
use crate::pipeline::{StoryPipeline, StoryRun};
use crate::validation::{validate_upload, IMAGE_FIELD};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Multipart framing allowance on top of the image size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// What `/models` reports about the speech endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechStatus {
    pub endpoint: String,
    pub strict: bool,
}

impl From<&SpeechConfig> for SpeechStatus {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            strict: config.strictness == Strictness::Strict,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<StoryPipeline>,
    pub registry: Arc<ModelRegistry>,
    pub speech: SpeechStatus,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        pipeline: StoryPipeline,
        registry: Arc<ModelRegistry>,
        speech: SpeechStatus,
        config: ServerConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            registry,
            speech,
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoryResponse {
    pub run_id: String,
    pub scenario: String,
    pub story: String,
    pub audio_base64: String,
    pub audio_mime: String,
    pub audio_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelStatus>,
    pub speech: SpeechStatus,
}

/// Build the full router with middleware.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let _ = START_TIME.get_or_init(Instant::now);
    let config = state.config.clone();

    // Global limit: one replenished slot every 60/rate seconds, bursting up to `rate`.
    let rate = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond((60_000 / rate as u64).max(1))
            .burst_size(rate)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", rate);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/models", get(list_models))
        .route("/story", post(story_endpoint))
        .route("/metrics", get(metrics_endpoint));

    let app = Router::new()
        .route("/", get(index))
        .merge(api.clone())
        .nest("/api", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state);

    Ok(app)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        base.allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.registry.status(),
        speech: state.speech.clone(),
    })
}

pub async fn story_endpoint(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StoryResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Failed to read upload: {e}")))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload
        .ok_or_else(|| ApiError::InvalidInput(format!("Missing '{IMAGE_FIELD}' field")))?;
    let image = validate_upload(file_name.as_deref(), bytes, state.config.max_upload_bytes)?;

    let run = StoryRun::new();
    info!(run_id = %run.id(), bytes = image.len(), "Story request received");

    let output = state.pipeline.execute(&run, &image).await?;

    let audio_base64 = output
        .audio
        .to_base64()
        .map_err(|e| ApiError::InternalError(format!("Failed to read audio: {e}")))?;

    // `output.audio` drops at the end of this scope, removing the temp file.
    Ok(Json(StoryResponse {
        run_id: run.id().to_string(),
        scenario: output.scenario,
        story: output.story,
        audio_mime: output.audio.mime().to_string(),
        audio_bytes: output.audio.len(),
        audio_base64,
    }))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let system_load = {
        #[cfg(unix)]
        {
            Some(sysinfo::System::load_average().one)
        }
        #[cfg(not(unix))]
        None
    };

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            system_load,
        },
        pipeline: state.pipeline.metrics().snapshot(),
    })
}
