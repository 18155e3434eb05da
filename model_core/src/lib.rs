//! Hosted model access for the image-to-story pipeline: configuration, the
//! model registry, the image describer and the story generator.

pub mod config;
pub mod describer;
pub mod error;
pub mod generator;
pub mod inference;
pub mod registry;
pub mod upload;

pub use config::InferenceConfig;
pub use describer::{Describer, HostedDescriber};
pub use error::{ConfigError, ImageError, InferenceError};
pub use generator::{story_prompt, HostedStoryGenerator, StoryWriter};
pub use inference::{GenerationParameters, Generated, InferenceModel, ModelTask};
pub use registry::{ModelRegistry, ModelStatus};
pub use upload::UploadedImage;
