//! LLM speaker arbitration for voxalign
//!
//! The fusion engine consults an LLM for two narrow decisions: whether an
//! ambiguous segment mixes a question and its answer, and which speaker a
//! contested segment belongs to. Both calls are bounded and degrade to
//! "no opinion" on any failure, so the fusion algorithm never depends on
//! the network.

pub mod arbiter;
pub mod error;
pub mod prompts;

#[cfg(feature = "claude")]
pub mod claude;
#[cfg(feature = "ollama")]
pub mod ollama;

pub use arbiter::{NoOpinionArbiter, SpeakerArbiter, SplitDecision, SplitPart};
pub use error::LlmError;

#[cfg(feature = "claude")]
pub use claude::ClaudeArbiter;
#[cfg(feature = "ollama")]
pub use ollama::OllamaArbiter;
