//! LLM error types

use thiserror::Error;

/// LLM arbiter errors.
///
/// All of these degrade to "no opinion" at the fusion layer; none is
/// retried.
#[derive(Error, Debug)]
pub enum LlmError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to parse the model output
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::ConnectionError(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}
