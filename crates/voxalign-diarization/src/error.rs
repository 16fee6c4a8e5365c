//! Diarization error types

use thiserror::Error;

/// Diarization-related errors.
///
/// These never escape the clusterer's public surface; they are caught,
/// logged, and reported to callers as an empty segment list.
#[derive(Error, Debug)]
pub enum DiarizationError {
    /// Embedding model produced unusable vectors
    #[error("Embedding model output unusable: {0}")]
    EmbeddingFailed(String),

    /// Embeddings are inconsistent or empty
    #[error("Invalid embedding input: {0}")]
    InvalidInput(String),
}
