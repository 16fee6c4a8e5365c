//! Job error types

use thiserror::Error;
use uuid::Uuid;

use voxalign_asr::AsrError;
use voxalign_core::AudioError;

/// Job-related errors
#[derive(Error, Debug)]
pub enum JobError {
    /// Unknown job id
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Input rejected at submission time
    #[error("Invalid audio input: {0}")]
    InvalidInput(#[from] AudioError),

    /// Transcription collaborator failed
    #[error("Transcription failed: {0}")]
    Asr(#[from] AsrError),

    /// Worker task failed unexpectedly
    #[error("Worker failed: {0}")]
    Worker(String),
}
