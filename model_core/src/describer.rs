use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::InferenceError;
use crate::registry::ModelRegistry;

/// Turns an image on disk into a Scenario (a caption).
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, image: &Path) -> Result<String, InferenceError>;
}

/// Describer backed by the registry's captioning model.
#[derive(Debug, Clone)]
pub struct HostedDescriber {
    registry: Arc<ModelRegistry>,
}

impl HostedDescriber {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Describer for HostedDescriber {
    async fn describe(&self, image: &Path) -> Result<String, InferenceError> {
        let model = self.registry.captioner().await?;
        let bytes = tokio::fs::read(image).await?;

        // First candidate only, passed through untouched unless it is empty.
        let scenario = model
            .caption(bytes)
            .await?
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| InferenceError::EmptyResult {
                model: model.model_id().to_string(),
            })?;

        info!(model = model.model_id(), len = scenario.len(), "Image described");
        Ok(scenario)
    }
}
