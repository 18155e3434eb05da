//! Story pipeline: describe the image, write a story, speak it.
//!
//! Stages run strictly in order on the caller's task. The first failure
//! marks the run failed and skips everything downstream. Temporary files
//! (the staged upload, the audio) are owned by scoped handles and are
//! removed on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use model_core::{Describer, ImageError, InferenceError, StoryWriter, UploadedImage};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, info_span, Instrument};
use tts_core::{AudioArtifact, SpeechError, SpeechSynthesizer};
use uuid::Uuid;

use crate::metrics::{PipelineMetrics, StageMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Describe,
    Generate,
    Synthesize,
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Describing,
    Generating,
    Synthesizing,
    Done,
    Failed(Stage),
}

impl RunState {
    /// Stage being worked on, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunState::Describing => Some(Stage::Describe),
            RunState::Generating => Some(Stage::Generate),
            RunState::Synthesizing => Some(Stage::Synthesize),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }

    pub fn can_advance_to(&self, next: RunState) -> bool {
        match (self, next) {
            (RunState::Idle, RunState::Describing)
            | (RunState::Describing, RunState::Generating)
            | (RunState::Generating, RunState::Synthesizing)
            | (RunState::Synthesizing, RunState::Done) => true,
            (current, RunState::Failed(stage)) => current.stage() == Some(stage),
            _ => false,
        }
    }
}

/// Handle on one run. Subscribers see every state change.
#[derive(Debug)]
pub struct StoryRun {
    id: Uuid,
    state: watch::Sender<RunState>,
}

impl StoryRun {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            id: Uuid::new_v4(),
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn advance(&self, next: RunState) {
        debug_assert!(
            self.state().can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state(),
            next
        );
        self.state.send_replace(next);
    }

    fn fail(&self) {
        if let Some(stage) = self.state().stage() {
            self.state.send_replace(RunState::Failed(stage));
        }
    }
}

impl Default for StoryRun {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not stage the uploaded image: {0}")]
    Upload(#[from] ImageError),

    #[error("describing the image failed: {0}")]
    Describe(#[source] InferenceError),

    #[error("generating the story failed: {0}")]
    Generate(#[source] InferenceError),

    #[error("synthesizing speech failed: {0}")]
    Synthesize(#[from] SpeechError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Upload(_) | PipelineError::Describe(_) => Stage::Describe,
            PipelineError::Generate(_) => Stage::Generate,
            PipelineError::Synthesize(_) => Stage::Synthesize,
        }
    }
}

/// The three artifacts of a completed run, in pipeline order.
#[derive(Debug)]
pub struct StoryOutput {
    pub scenario: String,
    pub story: String,
    pub audio: AudioArtifact,
}

/// Sequences describer, story writer and synthesizer.
#[derive(Clone)]
pub struct StoryPipeline {
    describer: Arc<dyn Describer>,
    writer: Arc<dyn StoryWriter>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    metrics: Arc<PipelineMetrics>,
}

impl StoryPipeline {
    pub fn new(
        describer: Arc<dyn Describer>,
        writer: Arc<dyn StoryWriter>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            describer,
            writer,
            synthesizer,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Run the pipeline on a fresh [`StoryRun`].
    pub async fn run(&self, image: &UploadedImage) -> Result<StoryOutput, PipelineError> {
        self.execute(&StoryRun::new(), image).await
    }

    /// Run the pipeline, reporting progress through `run`.
    pub async fn execute(
        &self,
        run: &StoryRun,
        image: &UploadedImage,
    ) -> Result<StoryOutput, PipelineError> {
        let span = info_span!("story_run", run_id = %run.id());
        async move {
            let t0 = Instant::now();
            let result = self.stages(run, image).await;
            match &result {
                Ok(output) => {
                    self.metrics.record_run(true);
                    info!(
                        audio_bytes = output.audio.len(),
                        "Story run complete in {:.2}s",
                        t0.elapsed().as_secs_f64()
                    );
                }
                Err(e) => {
                    run.fail();
                    self.metrics.record_run(false);
                    error!(stage = ?e.stage(), "Story run failed: {e}");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn stages(
        &self,
        run: &StoryRun,
        image: &UploadedImage,
    ) -> Result<StoryOutput, PipelineError> {
        run.advance(RunState::Describing);
        let scenario = {
            // The staged file lives only as long as this block.
            let upload = image.clone();
            let staged = tokio::task::spawn_blocking(move || upload.materialize())
                .await
                .map_err(|e| ImageError::Io(std::io::Error::other(e)))??;
            timed(&self.metrics.describe, self.describer.describe(staged.path()))
                .await
                .map_err(PipelineError::Describe)?
        };
        info!(scenario = %scenario, "Scenario ready");

        run.advance(RunState::Generating);
        let story = timed(&self.metrics.generate, self.writer.write_story(&scenario))
            .await
            .map_err(PipelineError::Generate)?;
        info!(story_len = story.len(), "Story ready");

        run.advance(RunState::Synthesizing);
        let audio = timed(&self.metrics.synthesize, self.synthesizer.synthesize(&story)).await?;

        run.advance(RunState::Done);
        Ok(StoryOutput {
            scenario,
            story,
            audio,
        })
    }
}

async fn timed<T, E, F>(metrics: &StageMetrics, stage: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let t0 = Instant::now();
    let result = stage.await;
    match &result {
        Ok(_) => metrics.record(t0.elapsed().as_millis() as u64),
        Err(_) => metrics.record_error(),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(RunState::Idle.can_advance_to(RunState::Describing));
        assert!(RunState::Describing.can_advance_to(RunState::Generating));
        assert!(RunState::Generating.can_advance_to(RunState::Synthesizing));
        assert!(RunState::Synthesizing.can_advance_to(RunState::Done));
    }

    #[test]
    fn test_no_skipping_or_rewinding() {
        assert!(!RunState::Idle.can_advance_to(RunState::Generating));
        assert!(!RunState::Describing.can_advance_to(RunState::Done));
        assert!(!RunState::Generating.can_advance_to(RunState::Describing));
        assert!(!RunState::Done.can_advance_to(RunState::Describing));
    }

    #[test]
    fn test_failure_only_from_matching_stage() {
        assert!(RunState::Describing.can_advance_to(RunState::Failed(Stage::Describe)));
        assert!(RunState::Synthesizing.can_advance_to(RunState::Failed(Stage::Synthesize)));
        assert!(!RunState::Describing.can_advance_to(RunState::Failed(Stage::Generate)));
        assert!(!RunState::Idle.can_advance_to(RunState::Failed(Stage::Describe)));
        assert!(!RunState::Done.can_advance_to(RunState::Failed(Stage::Synthesize)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed(Stage::Generate).is_terminal());
        assert!(!RunState::Synthesizing.is_terminal());
    }

    #[test]
    fn test_run_starts_idle_and_fail_is_noop_when_idle() {
        let run = StoryRun::new();
        assert_eq!(run.state(), RunState::Idle);
        run.fail();
        assert_eq!(run.state(), RunState::Idle);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(RunState::Failed(Stage::Generate)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "failed", "stage": "generate"}));
        let json = serde_json::to_value(RunState::Done).unwrap();
        assert_eq!(json, serde_json::json!({"state": "done"}));
    }
}
