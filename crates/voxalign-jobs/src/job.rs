//! Job data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voxalign_core::{Segment, SpeakerId};

/// Job lifecycle state.
///
/// `Pending -> Processing -> {Completed | Failed}`; the terminal states
/// are final. A job may sit in `Processing` with `error` set when a
/// transient upstream failure is being retried; callers should keep
/// polling rather than treat that as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether this state is final
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Per-speaker totals derived from the final segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerAirtime {
    pub speaker: SpeakerId,
    /// Total words attributed to this speaker
    pub words: usize,
    /// Total speaking time in seconds
    pub duration: f64,
}

/// Finished pipeline output plus derived metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptOutcome {
    /// Ordered speaker-attributed segments
    pub segments: Vec<Segment>,
    /// Number of distinct speakers in the segments
    pub speaker_count: usize,
    /// Dominant speaker, if any speech was found
    pub main_speaker: Option<SpeakerId>,
    /// Airtime totals, ordered by speaker id
    pub speakers: Vec<SpeakerAirtime>,
    /// Language reported by the recognizer
    pub language: String,
    /// Audio duration in seconds
    pub duration: f64,
}

/// One unit of asynchronous work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Present once the job completes
    pub result: Option<TranscriptOutcome>,
    /// Failure message, or the latest transient error while `Processing`
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            created_at,
            result: None,
            error: None,
        }
    }
}
