//! ASR provider trait and request options

use serde::{Deserialize, Serialize};

use crate::error::AsrError;
use voxalign_core::TranscriptResult;

/// Transcription options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    /// Language code (e.g. "en"); None lets the engine detect
    pub language: Option<String>,
    /// Include word-level timestamps
    pub word_timestamps: bool,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            language: None,
            word_timestamps: true,
        }
    }
}

/// ASR provider trait
///
/// Implemented by whatever recognizer backs the pipeline. Providers that
/// diarize on their own may fill `Word::speaker_hint`; the fusion engine
/// treats it as a weak signal only.
#[trait_variant::make(AsrProvider: Send)]
pub trait LocalAsrProvider {
    /// Transcribe an audio file with word-level timing
    async fn transcribe(
        &self,
        audio_path: &str,
        options: TranscriptionOptions,
    ) -> Result<TranscriptResult, AsrError>;

    /// Check if the engine is reachable and ready
    async fn is_available(&self) -> bool;

    /// Get provider name
    fn name(&self) -> &'static str;
}
