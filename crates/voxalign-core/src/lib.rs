//! voxalign-core - shared data model for speaker-attributed transcription
//!
//! Defines the types that flow between diarization, ASR fusion and the
//! job layer, plus WAV loading for the audio pipeline.

pub mod audio;
pub mod types;

pub use audio::{AudioData, AudioError, AudioProcessor};
pub use types::*;
