//! Speech synthesis for generated stories.
//!
//! The synthesizer posts story text to a hosted text-to-speech endpoint and
//! stores the returned audio in an [`AudioArtifact`], a temporary `.flac`
//! file that is removed when the artifact goes out of scope.

mod artifact;
mod synth;

pub use artifact::{AudioArtifact, AUDIO_SUFFIX};
pub use synth::{
    is_audio_content_type, HostedSynthesizer, SpeechConfig, SpeechError, SpeechSynthesizer,
    Strictness,
};
