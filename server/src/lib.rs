pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod validation;

pub use app::{build_router, AppState, SpeechStatus};
pub use pipeline::{PipelineError, RunState, Stage, StoryOutput, StoryPipeline, StoryRun};
