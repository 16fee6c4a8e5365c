//! Diarization-transcription fusion for voxalign
//!
//! Reconciles two independent, imperfect signals (diarization segments
//! and ASR word timings) into one consistent speaker labeling:
//! 1. `resolver` assigns each word a speaker through an ordered list of
//!    heuristic rules plus bidirectional smoothing
//! 2. `builder` groups resolved words into speaker turns and refines them
//!    through a chain of pure passes, consulting the LLM arbiter only for
//!    genuinely ambiguous question/answer patterns
//! 3. `main_speaker` picks the speaker who drives the conversation

pub mod builder;
pub mod config;
pub mod lexicon;
pub mod main_speaker;
pub mod resolver;

pub use builder::SegmentBuilder;
pub use config::FusionConfig;
pub use lexicon::Lexicon;
pub use main_speaker::select_main_speaker;
pub use resolver::WordSpeakerResolver;

// Re-export types from voxalign-core
pub use voxalign_core::{DiarizationSegment, ResolvedWord, Segment, SpeakerId, Word};
