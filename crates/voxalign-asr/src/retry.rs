//! Bounded retry/timeout wrapper for ASR calls
//!
//! Transient upstream errors are retried a fixed number of times at this
//! boundary; the pipeline itself never loops on the recognizer.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AsrError;
use crate::provider::{AsrProvider, TranscriptionOptions};
use voxalign_core::TranscriptResult;

/// Retry policy for the ASR call boundary
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            request_timeout: Duration::from_secs(120),
            backoff: Duration::from_secs(2),
        }
    }
}

/// Wraps an [`AsrProvider`] with the bounded retry policy
pub struct RetryingAsr<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: AsrProvider + Sync> RetryingAsr<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Transcribe with retries; `on_retry` observes each transient failure
    /// before the next attempt (the job layer uses it to surface soft
    /// errors to pollers).
    pub async fn transcribe_with<F>(
        &self,
        audio_path: &str,
        options: TranscriptionOptions,
        mut on_retry: F,
    ) -> Result<TranscriptResult, AsrError>
    where
        F: FnMut(&AsrError),
    {
        let mut last_err = None;

        for attempt in 1..=self.policy.attempts.max(1) {
            debug!(attempt, audio_path, "ASR attempt");

            let result = tokio::time::timeout(
                self.policy.request_timeout,
                self.inner.transcribe(audio_path, options.clone()),
            )
            .await
            .unwrap_or(Err(AsrError::Timeout(self.policy.request_timeout)));

            match result {
                Ok(transcript) => return Ok(transcript),
                Err(e) if e.is_retryable() && attempt < self.policy.attempts => {
                    warn!(attempt, error = %e, "transient ASR failure, will retry");
                    on_retry(&e);
                    last_err = Some(e);
                    if !self.policy.backoff.is_zero() {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| AsrError::TranscriptionFailed("no attempts made".into())))
    }

    /// Transcribe with retries, discarding transient-failure notifications
    pub async fn transcribe(
        &self,
        audio_path: &str,
        options: TranscriptionOptions,
    ) -> Result<TranscriptResult, AsrError> {
        self.transcribe_with(audio_path, options, |_| {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAsr {
        calls: AtomicU32,
        fail_first: u32,
        retryable: bool,
    }

    impl AsrProvider for FlakyAsr {
        async fn transcribe(
            &self,
            _audio_path: &str,
            _options: TranscriptionOptions,
        ) -> Result<TranscriptResult, AsrError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                if self.retryable {
                    Err(AsrError::NotReady("warming up".into()))
                } else {
                    Err(AsrError::TranscriptionFailed("bad audio".into()))
                }
            } else {
                Ok(TranscriptResult {
                    full_text: "ok".into(),
                    words: vec![],
                    language: "en".into(),
                    duration: 1.0,
                })
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            request_timeout: Duration::from_secs(5),
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let asr = RetryingAsr::new(
            FlakyAsr {
                calls: AtomicU32::new(0),
                fail_first: 2,
                retryable: true,
            },
            policy(),
        );

        let mut soft_errors = 0;
        let result = asr
            .transcribe_with("a.wav", TranscriptionOptions::default(), |_| soft_errors += 1)
            .await;

        assert!(result.is_ok());
        assert_eq!(soft_errors, 2);
        assert_eq!(asr.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let asr = RetryingAsr::new(
            FlakyAsr {
                calls: AtomicU32::new(0),
                fail_first: 10,
                retryable: false,
            },
            policy(),
        );

        let result = asr.transcribe("a.wav", TranscriptionOptions::default()).await;
        assert!(matches!(result, Err(AsrError::TranscriptionFailed(_))));
        assert_eq!(asr.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_bound_is_honored() {
        let asr = RetryingAsr::new(
            FlakyAsr {
                calls: AtomicU32::new(0),
                fail_first: 10,
                retryable: true,
            },
            policy(),
        );

        let result = asr.transcribe("a.wav", TranscriptionOptions::default()).await;
        assert!(matches!(result, Err(AsrError::NotReady(_))));
        assert_eq!(asr.inner.calls.load(Ordering::SeqCst), 3);
    }
}
