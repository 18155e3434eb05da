// Configuration for the server

use std::time::Duration;

use model_core::config::parse_flag;
use model_core::InferenceConfig;
use tracing::warn;
use tts_core::{SpeechConfig, Strictness};

/// Headroom on top of the three outbound stage timeouts.
const REQUEST_TIMEOUT_MARGIN_SECS: u64 = 30;

/// Smallest request timeout that lets all three stages run to their own limit.
pub fn min_request_timeout_secs(inference_timeout_secs: u64) -> u64 {
    inference_timeout_secs
        .saturating_mul(3)
        .saturating_add(REQUEST_TIMEOUT_MARGIN_SECS)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub max_upload_bytes: usize,
    pub speech_lenient: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: min_request_timeout_secs(120),
            cors_allowed_origins: None,
            max_upload_bytes: 10 * 1024 * 1024,
            speech_lenient: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v: &u32| v > 0)
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        let speech_lenient = std::env::var("SPEECH_LENIENT")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.speech_lenient);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            max_upload_bytes,
            speech_lenient,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Raise the request timeout to cover a run whose stages each stay
    /// within the inference timeout.
    pub fn fit_to_inference(mut self, inference: &InferenceConfig) -> Self {
        let min = min_request_timeout_secs(inference.timeout_secs);
        if self.request_timeout_secs < min {
            warn!(
                configured = self.request_timeout_secs,
                min, "REQUEST_TIMEOUT_SECS is shorter than three inference timeouts, raising it"
            );
            self.request_timeout_secs = min;
        }
        self
    }
}

/// Speech endpoint settings derived from the shared inference config.
pub fn speech_config(inference: &InferenceConfig, lenient: bool) -> SpeechConfig {
    let mut speech = SpeechConfig::new(
        inference.model_url(&inference.speech_model),
        inference.api_token.clone(),
    );
    speech.timeout = inference.timeout();
    speech.wait_for_model = inference.wait_for_model;
    speech.strictness = if lenient {
        Strictness::Lenient
    } else {
        Strictness::Strict
    };
    speech
}
