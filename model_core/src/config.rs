// Inference configuration read from the environment

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";
pub const DEFAULT_CAPTION_MODEL: &str = "Salesforce/blip-image-captioning-base";
pub const DEFAULT_STORY_MODEL: &str = "EleutherAI/gpt-neo-2.7B";
pub const DEFAULT_SPEECH_MODEL: &str = "espnet/kan-bayashi_ljspeech_vits";

/// Settings shared by every hosted model call.
#[derive(Clone)]
pub struct InferenceConfig {
    pub api_token: String,
    pub inference_url: String,
    pub hub_url: String,
    pub caption_model: String,
    pub story_model: String,
    pub speech_model: String,
    pub story_max_new_tokens: u32,
    pub timeout_secs: u64,
    pub wait_for_model: bool,
}

impl InferenceConfig {
    /// Config with defaults for everything but the token.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            caption_model: DEFAULT_CAPTION_MODEL.to_string(),
            story_model: DEFAULT_STORY_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            story_max_new_tokens: 100,
            timeout_secs: 120,
            wait_for_model: true,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `HUGGINGFACE_API_TOKEN` is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("HUGGINGFACE_API_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingCredential("HUGGINGFACE_API_TOKEN"))?;

        let mut config = Self::new(token);

        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = text("HF_INFERENCE_URL") {
            config.inference_url = validate_url("HF_INFERENCE_URL", url)?;
        }
        if let Some(url) = text("HF_HUB_URL") {
            config.hub_url = validate_url("HF_HUB_URL", url)?;
        }
        if let Some(model) = text("CAPTION_MODEL") {
            config.caption_model = model;
        }
        if let Some(model) = text("STORY_MODEL") {
            config.story_model = model;
        }
        if let Some(model) = text("SPEECH_MODEL") {
            config.speech_model = model;
        }

        config.story_max_new_tokens = text("STORY_MAX_NEW_TOKENS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.story_max_new_tokens);

        config.timeout_secs = text("INFERENCE_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.timeout_secs);

        config.wait_for_model = text("HF_WAIT_FOR_MODEL")
            .map(|v| parse_flag(&v))
            .unwrap_or(config.wait_for_model);

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// URL an inference request for `model_id` is posted to.
    pub fn model_url(&self, model_id: &str) -> String {
        format!("{}/{}", self.inference_url, model_id)
    }

    /// Hub metadata URL used to verify a model before first use.
    pub fn model_info_url(&self, model_id: &str) -> String {
        format!("{}/api/models/{}", self.hub_url, model_id)
    }
}

// The token stays out of logs.
impl fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("api_token", &"<redacted>")
            .field("inference_url", &self.inference_url)
            .field("hub_url", &self.hub_url)
            .field("caption_model", &self.caption_model)
            .field("story_model", &self.story_model)
            .field("speech_model", &self.speech_model)
            .field("story_max_new_tokens", &self.story_max_new_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("wait_for_model", &self.wait_for_model)
            .finish()
    }
}

fn validate_url(key: &'static str, url: String) -> Result<String, ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidUrl { key, value: url })
    }
}

/// Truthy values: `1`, `true`, `yes`, `on` (any case).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
