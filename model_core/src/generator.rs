use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::InferenceError;
use crate::inference::GenerationParameters;
use crate::registry::ModelRegistry;

/// Expands a Scenario into a short Story.
#[async_trait]
pub trait StoryWriter: Send + Sync {
    async fn write_story(&self, scenario: &str) -> Result<String, InferenceError>;
}

/// Fixed prompt the Scenario is embedded in.
pub fn story_prompt(scenario: &str) -> String {
    format!(
        "Write a short story based on the following scenario. The story should be engaging, \
         concise, and imaginative, with a maximum of 50 words. Avoid any additional commentary \
         or explanation.\n\nSCENARIO: {scenario}\n\nSTORY:\n"
    )
}

/// Story generator backed by the registry's text-generation model.
///
/// Output is whatever the model emits, trimmed. The prompt echo is kept and
/// the 50-word limit is only an instruction to the model.
#[derive(Debug, Clone)]
pub struct HostedStoryGenerator {
    registry: Arc<ModelRegistry>,
    parameters: GenerationParameters,
}

impl HostedStoryGenerator {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let parameters = GenerationParameters {
            max_new_tokens: registry.config().story_max_new_tokens,
            do_sample: true,
            return_full_text: true,
        };
        Self {
            registry,
            parameters,
        }
    }

    pub fn parameters(&self) -> &GenerationParameters {
        &self.parameters
    }
}

#[async_trait]
impl StoryWriter for HostedStoryGenerator {
    async fn write_story(&self, scenario: &str) -> Result<String, InferenceError> {
        let model = self.registry.story_model().await?;
        let prompt = story_prompt(scenario);

        let story = model
            .generate(&prompt, &self.parameters)
            .await?
            .into_iter()
            .next()
            .map(|g| g.generated_text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| InferenceError::EmptyResult {
                model: model.model_id().to_string(),
            })?;

        info!(model = model.model_id(), len = story.len(), "Story generated");
        Ok(story)
    }
}
