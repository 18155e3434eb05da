// Process-wide model handles, built once on first use

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::InferenceConfig;
use crate::error::InferenceError;
use crate::inference::{InferenceModel, ModelTask};

/// Load state of one registry slot, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub task: ModelTask,
    pub model_id: String,
    pub loaded: bool,
}

/// Owns the captioning and story-generation handles.
///
/// Construct one per process and share it by `Arc`. Each handle is built
/// at most once; concurrent first callers wait on the same construction.
/// A failed construction is not cached.
#[derive(Debug)]
pub struct ModelRegistry {
    client: Client,
    config: InferenceConfig,
    captioner: OnceCell<Arc<InferenceModel>>,
    story_model: OnceCell<Arc<InferenceModel>>,
}

impl ModelRegistry {
    pub fn new(client: Client, config: InferenceConfig) -> Self {
        Self {
            client,
            config,
            captioner: OnceCell::new(),
            story_model: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub async fn captioner(&self) -> Result<Arc<InferenceModel>, InferenceError> {
        self.handle(&self.captioner, ModelTask::ImageToText, &self.config.caption_model)
            .await
    }

    pub async fn story_model(&self) -> Result<Arc<InferenceModel>, InferenceError> {
        self.handle(&self.story_model, ModelTask::TextGeneration, &self.config.story_model)
            .await
    }

    /// Load both handles up front so a bad credential or model fails at startup.
    pub async fn warm_up(&self) -> Result<(), InferenceError> {
        self.captioner().await?;
        self.story_model().await?;
        info!("Model registry warmed up");
        Ok(())
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        vec![
            ModelStatus {
                task: ModelTask::ImageToText,
                model_id: self.config.caption_model.clone(),
                loaded: self.captioner.initialized(),
            },
            ModelStatus {
                task: ModelTask::TextGeneration,
                model_id: self.config.story_model.clone(),
                loaded: self.story_model.initialized(),
            },
        ]
    }

    async fn handle(
        &self,
        slot: &OnceCell<Arc<InferenceModel>>,
        task: ModelTask,
        model_id: &str,
    ) -> Result<Arc<InferenceModel>, InferenceError> {
        slot.get_or_try_init(|| async {
            InferenceModel::load(self.client.clone(), &self.config, task, model_id)
                .await
                .map(Arc::new)
        })
        .await
        .cloned()
    }
}
