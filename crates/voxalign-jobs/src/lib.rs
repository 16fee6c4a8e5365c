//! Job lifecycle and pipeline orchestration for voxalign
//!
//! Wraps the diarization/fusion pipeline as units of asynchronous work:
//! one worker task per submitted job, a mutex-guarded in-memory store
//! that concurrent pollers observe through snapshots, and a periodic
//! sweep that drops abandoned results.

pub mod error;
pub mod job;
pub mod service;
pub mod store;

pub use error::JobError;
pub use job::{Job, JobStatus, SpeakerAirtime, TranscriptOutcome};
pub use service::{JobServiceConfig, SubmitOptions, TranscriptionService};
pub use store::JobStore;
