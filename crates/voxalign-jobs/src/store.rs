//! In-memory job store
//!
//! The job map is the only shared mutable state in the system. Every
//! access goes through one mutex, held only for the duration of a read
//! or update, never across a blocking call or an await point. Exactly
//! one worker writes a given job's fields; pollers only ever see cloned
//! snapshots.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::job::{Job, JobStatus, TranscriptOutcome};

/// Mutex-guarded job map with TTL-based cleanup
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `Pending` job and return its id
    pub fn create(&self) -> Uuid {
        self.create_with_time(Utc::now())
    }

    /// Insert a `Pending` job with an explicit creation time
    pub fn create_with_time(&self, created_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        let mut jobs = self.jobs.lock().expect("job store lock");
        jobs.insert(id, Job::new(id, created_at));
        id
    }

    /// Transition a job to `Processing`
    pub fn mark_processing(&self, id: Uuid) {
        self.update(id, |job| {
            if job.status.is_terminal() {
                warn!(%id, "ignoring processing transition on terminal job");
                return;
            }
            job.status = JobStatus::Processing;
        });
    }

    /// Record a transient failure without leaving `Processing`.
    ///
    /// Pollers observe the error and keep polling.
    pub fn record_soft_error(&self, id: Uuid, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |job| {
            if job.status.is_terminal() {
                return;
            }
            debug!(%id, %message, "transient error recorded");
            job.error = Some(message);
        });
    }

    /// Finish a job with its result
    pub fn complete(&self, id: Uuid, outcome: TranscriptOutcome) {
        self.update(id, |job| {
            if job.status.is_terminal() {
                warn!(%id, "ignoring completion of terminal job");
                return;
            }
            job.status = JobStatus::Completed;
            job.result = Some(outcome);
            job.error = None;
        });
    }

    /// Finish a job with a failure message
    pub fn fail(&self, id: Uuid, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |job| {
            if job.status.is_terminal() {
                warn!(%id, "ignoring failure of terminal job");
                return;
            }
            job.status = JobStatus::Failed;
            job.error = Some(message);
            job.result = None;
        });
    }

    /// Consistent snapshot of a job for pollers
    pub fn snapshot(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().expect("job store lock").get(&id).cloned()
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove jobs older than `ttl` regardless of status; uncollected
    /// results are treated as abandoned. Returns the number removed.
    pub fn sweep_expired(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1));
        let mut jobs = self.jobs.lock().expect("job store lock");
        let before = jobs.len();
        jobs.retain(|_, job| now - job.created_at <= ttl);
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, "swept expired jobs");
        }
        removed
    }

    fn update(&self, id: Uuid, mutate: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.lock().expect("job store lock");
        match jobs.get_mut(&id) {
            Some(job) => mutate(job),
            None => warn!(%id, "update for unknown job"),
        }
    }
}
