//! Handles onto models served by the hosted inference API.
//!
//! A handle is verified against the model hub once, when it is loaded, and
//! is then reused for every inference call for the rest of the process.

use std::fmt;
use std::time::Instant;

use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::InferenceConfig;
use crate::error::InferenceError;

/// What a handle is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTask {
    ImageToText,
    TextGeneration,
}

impl ModelTask {
    /// Hub pipeline tag for this task.
    pub fn pipeline_tag(&self) -> &'static str {
        match self {
            ModelTask::ImageToText => "image-to-text",
            ModelTask::TextGeneration => "text-generation",
        }
    }
}

impl fmt::Display for ModelTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pipeline_tag())
    }
}

/// One candidate returned by a text-producing model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Generated {
    pub generated_text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GeneratedPayload {
    Many(Vec<Generated>),
    One(Generated),
}

/// Sampling settings for text generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub do_sample: bool,
    pub return_full_text: bool,
}

#[derive(Serialize)]
struct TextGenerationRequest<'a> {
    inputs: &'a str,
    parameters: &'a GenerationParameters,
}

#[derive(Debug, Default, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    pipeline_tag: Option<String>,
}

/// A loaded, reusable reference to a hosted model.
#[derive(Debug)]
pub struct InferenceModel {
    client: Client,
    config: InferenceConfig,
    task: ModelTask,
    model_id: String,
    url: String,
}

impl InferenceModel {
    /// Verify the credential and the model against the hub, then build a handle.
    pub async fn load(
        client: Client,
        config: &InferenceConfig,
        task: ModelTask,
        model_id: &str,
    ) -> Result<Self, InferenceError> {
        info!(model = model_id, %task, "Loading model handle");
        let t0 = Instant::now();

        let response = client
            .get(config.model_info_url(model_id))
            .bearer_auth(&config.api_token)
            .timeout(config.timeout())
            .send()
            .await
            .map_err(|e| InferenceError::ModelUnavailable {
                model: model_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(InferenceError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(InferenceError::ModelUnavailable {
                model: model_id.to_string(),
                reason: format!("hub returned HTTP {}", status.as_u16()),
            });
        }

        let info = match response.json::<ModelInfo>().await {
            Ok(info) => info,
            Err(e) => {
                debug!(model = model_id, error = %e, "Unreadable model info, skipping pipeline tag check");
                ModelInfo::default()
            }
        };
        if let Some(tag) = info.pipeline_tag.as_deref() {
            if tag != task.pipeline_tag() {
                warn!(model = model_id, tag, expected = task.pipeline_tag(), "Model pipeline tag mismatch");
            }
        }

        info!(
            model = model_id,
            "Model handle ready in {:.2}s",
            t0.elapsed().as_secs_f64()
        );

        Ok(Self {
            client,
            config: config.clone(),
            task,
            url: config.model_url(model_id),
            model_id: model_id.to_string(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn task(&self) -> ModelTask {
        self.task
    }

    /// Caption raw JPEG bytes.
    pub async fn caption(&self, image: Vec<u8>) -> Result<Vec<Generated>, InferenceError> {
        debug!(model = %self.model_id, bytes = image.len(), "Captioning image");
        let response = self
            .post()
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(image)
            .send()
            .await?;
        self.read_generated(response).await
    }

    /// Run a text-generation prompt.
    pub async fn generate(
        &self,
        prompt: &str,
        parameters: &GenerationParameters,
    ) -> Result<Vec<Generated>, InferenceError> {
        debug!(model = %self.model_id, prompt_len = prompt.len(), "Generating text");
        let response = self
            .post()
            .json(&TextGenerationRequest {
                inputs: prompt,
                parameters,
            })
            .send()
            .await?;
        self.read_generated(response).await
    }

    fn post(&self) -> RequestBuilder {
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.config.api_token)
            .timeout(self.config.timeout());
        if self.config.wait_for_model {
            request.header("x-wait-for-model", "true")
        } else {
            request
        }
    }

    async fn read_generated(&self, response: Response) -> Result<Vec<Generated>, InferenceError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(InferenceError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                model: self.model_id.clone(),
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        parse_generated(&self.model_id, &bytes)
    }
}

/// Decode a `[{"generated_text": ..}]` (or single-object) response body.
pub fn parse_generated(model: &str, body: &[u8]) -> Result<Vec<Generated>, InferenceError> {
    match serde_json::from_slice::<GeneratedPayload>(body) {
        Ok(GeneratedPayload::Many(items)) => Ok(items),
        Ok(GeneratedPayload::One(item)) => Ok(vec![item]),
        Err(e) => Err(InferenceError::Decode {
            model: model.to_string(),
            reason: e.to_string(),
        }),
    }
}
