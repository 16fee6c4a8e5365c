//! ASR error types

use thiserror::Error;

/// ASR-related errors
#[derive(Error, Debug)]
pub enum AsrError {
    /// Audio file not found
    #[error("Audio file not found: {0}")]
    FileNotFound(String),

    /// Unsupported language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Engine reachable but not ready to serve yet
    #[error("ASR engine not ready: {0}")]
    NotReady(String),

    /// Request timed out
    #[error("ASR request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transcription failed
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Response could not be interpreted
    #[error("Invalid ASR response: {0}")]
    InvalidResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AsrError {
    /// Whether the call site may retry this error.
    ///
    /// A not-ready engine or a timed-out request is transient; a missing
    /// file or a rejected language never heals on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AsrError::NotReady(_) | AsrError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryable_classification() {
        assert!(AsrError::NotReady("warming up".into()).is_retryable());
        assert!(AsrError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!AsrError::FileNotFound("x.wav".into()).is_retryable());
        assert!(!AsrError::TranscriptionFailed("decode".into()).is_retryable());
    }
}
