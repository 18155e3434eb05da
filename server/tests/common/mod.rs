//! Common utilities for server tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::post, Router};
use model_core::{Describer, InferenceConfig, InferenceError, ModelRegistry, StoryWriter};
use tts_core::{AudioArtifact, SpeechError, SpeechSynthesizer};

use server::config::{speech_config, ServerConfig};
use server::{build_router, AppState, SpeechStatus, StoryPipeline};

pub const SCENARIO: &str = "a dog running in a field";
pub const STORY: &str = "The dog ran free under golden skies, chasing dreams only it could see.";
pub const AUDIO: &[u8] = b"fLaC\x00\x00\x00\x22";

pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01]
}

/// Which stage (if any) the mocks should fail at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nowhere,
    Describe,
    Generate,
    Synthesize,
}

/// Mock stages sharing call counters.
#[derive(Debug)]
pub struct MockStages {
    pub fail_at: FailAt,
    pub describe_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub synthesize_calls: AtomicUsize,
    pub seen_image: Mutex<Option<PathBuf>>,
    pub seen_image_bytes: Mutex<Option<Vec<u8>>>,
    pub seen_scenario: Mutex<Option<String>>,
    pub seen_story: Mutex<Option<String>>,
    pub seen_audio: Mutex<Option<PathBuf>>,
}

impl MockStages {
    pub fn new(fail_at: FailAt) -> Arc<Self> {
        Arc::new(Self {
            fail_at,
            describe_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            synthesize_calls: AtomicUsize::new(0),
            seen_image: Mutex::new(None),
            seen_image_bytes: Mutex::new(None),
            seen_scenario: Mutex::new(None),
            seen_story: Mutex::new(None),
            seen_audio: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.describe_calls.load(Ordering::SeqCst),
            self.generate_calls.load(Ordering::SeqCst),
            self.synthesize_calls.load(Ordering::SeqCst),
        )
    }

    pub fn image_path(&self) -> Option<PathBuf> {
        self.seen_image.lock().unwrap().clone()
    }

    pub fn audio_path(&self) -> Option<PathBuf> {
        self.seen_audio.lock().unwrap().clone()
    }
}

pub struct MockDescriber(pub Arc<MockStages>);
pub struct MockWriter(pub Arc<MockStages>);
pub struct MockSynthesizer(pub Arc<MockStages>);

#[async_trait]
impl Describer for MockDescriber {
    async fn describe(&self, image: &Path) -> Result<String, InferenceError> {
        self.0.describe_calls.fetch_add(1, Ordering::SeqCst);
        *self.0.seen_image.lock().unwrap() = Some(image.to_path_buf());
        *self.0.seen_image_bytes.lock().unwrap() = std::fs::read(image).ok();
        if self.0.fail_at == FailAt::Describe {
            return Err(InferenceError::Status {
                model: "captioner".into(),
                status: 503,
                body: "Model is overloaded".into(),
            });
        }
        Ok(SCENARIO.to_string())
    }
}

#[async_trait]
impl StoryWriter for MockWriter {
    async fn write_story(&self, scenario: &str) -> Result<String, InferenceError> {
        self.0.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.0.seen_scenario.lock().unwrap() = Some(scenario.to_string());
        if self.0.fail_at == FailAt::Generate {
            return Err(InferenceError::EmptyResult {
                model: "storyteller".into(),
            });
        }
        Ok(STORY.to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, story: &str) -> Result<AudioArtifact, SpeechError> {
        self.0.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        *self.0.seen_story.lock().unwrap() = Some(story.to_string());
        if self.0.fail_at == FailAt::Synthesize {
            return Err(SpeechError::Rejected {
                status: 401,
                body: r#"{"error":"Invalid credentials"}"#.into(),
            });
        }
        let artifact = AudioArtifact::write(AUDIO, "audio/flac")?;
        *self.0.seen_audio.lock().unwrap() = Some(artifact.path().to_path_buf());
        Ok(artifact)
    }
}

pub fn mock_pipeline(stages: &Arc<MockStages>) -> StoryPipeline {
    StoryPipeline::new(
        Arc::new(MockDescriber(stages.clone())),
        Arc::new(MockWriter(stages.clone())),
        Arc::new(MockSynthesizer(stages.clone())),
    )
}

/// Create a test app instance around mock stages.
pub fn create_test_app(stages: &Arc<MockStages>) -> Router {
    create_test_app_with(stages, ServerConfig::default())
}

pub fn create_test_app_with(stages: &Arc<MockStages>, config: ServerConfig) -> Router {
    create_test_app_from(mock_pipeline(stages), config)
}

pub fn create_test_app_from(pipeline: StoryPipeline, config: ServerConfig) -> Router {
    let inference = InferenceConfig::new("test-token");
    let speech = SpeechStatus::from(&speech_config(&inference, config.speech_lenient));
    let registry = Arc::new(ModelRegistry::new(reqwest::Client::new(), inference));
    let state = AppState::new(pipeline, registry, speech, config);
    build_router(state).expect("router")
}

/// Speech endpoint that answers long after any test timeout.
pub async fn spawn_slow_speech_endpoint() -> SocketAddr {
    let app = Router::new().route(
        "/models/tts",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Hand-built multipart body with a single file field.
pub fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "story-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
