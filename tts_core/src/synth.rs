use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::AudioArtifact;

/// How much of the endpoint's response is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Reject error statuses and non-audio payloads.
    #[default]
    Strict,
    /// Write whatever comes back, warning on anything suspicious.
    Lenient,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub api_token: String,
    pub timeout: Duration,
    pub strictness: Strictness,
    pub wait_for_model: bool,
}

impl SpeechConfig {
    pub fn new(endpoint: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: api_token.into(),
            timeout: Duration::from_secs(120),
            strictness: Strictness::Strict,
            wait_for_model: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("speech endpoint rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("speech endpoint returned a non-audio payload ({content_type})")]
    UnverifiedResponse { content_type: String },

    #[error("speech endpoint returned no audio")]
    EmptyAudio,

    #[error("failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeechError {
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            SpeechError::Rejected { status, .. }
                if *status == StatusCode::UNAUTHORIZED.as_u16() || *status == StatusCode::FORBIDDEN.as_u16()
        )
    }
}

/// Turns a Story into playable audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, story: &str) -> Result<AudioArtifact, SpeechError>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    inputs: &'a str,
}

/// Synthesizer calling a hosted text-to-speech endpoint.
#[derive(Debug, Clone)]
pub struct HostedSynthesizer {
    client: Client,
    config: SpeechConfig,
}

impl HostedSynthesizer {
    pub fn new(client: Client, config: SpeechConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }
}

/// `audio/*` and raw octet streams count as audio.
pub fn is_audio_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("audio/") || essence == "application/octet-stream"
}

#[async_trait]
impl SpeechSynthesizer for HostedSynthesizer {
    async fn synthesize(&self, story: &str) -> Result<AudioArtifact, SpeechError> {
        let t0 = Instant::now();

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_token)
            .timeout(self.config.timeout)
            .json(&SpeechRequest { inputs: story });
        if self.config.wait_for_model {
            request = request.header("x-wait-for-model", "true");
        }
        let response = request.send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.bytes().await?;

        match self.config.strictness {
            Strictness::Strict => {
                if !status.is_success() {
                    return Err(SpeechError::Rejected {
                        status: status.as_u16(),
                        body: String::from_utf8_lossy(&body).into_owned(),
                    });
                }
                if !is_audio_content_type(&content_type) {
                    return Err(SpeechError::UnverifiedResponse { content_type });
                }
                if body.is_empty() {
                    return Err(SpeechError::EmptyAudio);
                }
            }
            Strictness::Lenient => {
                if !status.is_success() || !is_audio_content_type(&content_type) {
                    warn!(
                        status = status.as_u16(),
                        content_type = %content_type,
                        "Speech response does not look like audio, writing it anyway"
                    );
                }
            }
        }

        let mime = if content_type.is_empty() {
            "audio/flac".to_string()
        } else {
            content_type
        };
        let artifact = tokio::task::spawn_blocking(move || AudioArtifact::write(&body, mime))
            .await
            .map_err(std::io::Error::other)??;

        info!(
            bytes = artifact.len(),
            "Synthesized speech in {:.2}s",
            t0.elapsed().as_secs_f64()
        );

        Ok(artifact)
    }
}
