//! Claude API arbiter backend

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::arbiter::{extract_json_object, SpeakerArbiter, SplitDecision, SplitPart};
use crate::error::LlmError;
use crate::prompts;
use voxalign_core::{Segment, SpeakerId};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Claude API arbiter
pub struct ClaudeArbiter {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl ClaudeArbiter {
    /// Create a new Claude arbiter with a bounded request timeout
    pub fn new(api_key: SecretString) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    /// Create with custom model
    pub fn with_model(api_key: SecretString, model: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            model: model.to_string(),
        }
    }

    /// Send message to Claude API
    async fn send_message(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: 1024,
            messages: vec![ClaudeMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Sending arbitration request to Claude API");

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Claude API error: {} - {}", status, error_text);
            return Err(LlmError::RequestFailed(format!("{}: {}", status, error_text)));
        }

        let response: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| LlmError::InvalidResponse("Empty response".to_string()))
    }
}

impl SpeakerArbiter for ClaudeArbiter {
    async fn split_segment(
        &self,
        segment: &Segment,
        context: &[Segment],
    ) -> Result<SplitDecision, LlmError> {
        let prompt = prompts::build_split_prompt(segment, context);
        let response = self.send_message(&prompt).await?;

        let parsed: SplitResponse = serde_json::from_str(extract_json_object(&response))
            .map_err(|e| LlmError::ParseError(format!("Failed to parse split verdict: {}", e)))?;

        Ok(SplitDecision {
            should_split: parsed.should_split && parsed.parts.len() >= 2,
            parts: parsed
                .parts
                .into_iter()
                .map(|p| SplitPart { text: p.text, speaker: p.speaker })
                .collect(),
        })
    }

    async fn resolve_speaker(
        &self,
        prev: &Segment,
        current: &Segment,
        gap_secs: f64,
        context: &[Segment],
    ) -> Result<Option<SpeakerId>, LlmError> {
        let prompt = prompts::build_resolve_prompt(prev, current, gap_secs, context);
        let response = self.send_message(&prompt).await?;

        let parsed: ResolveResponse = serde_json::from_str(extract_json_object(&response))
            .map_err(|e| LlmError::ParseError(format!("Failed to parse speaker verdict: {}", e)))?;

        Ok(parsed.speaker)
    }

    async fn is_available(&self) -> bool {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: 10,
            messages: vec![ClaudeMessage {
                role: "user",
                content: "Hello",
            }],
        };

        self.client
            .post(CLAUDE_API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "Claude"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    text: String,
}

#[derive(Deserialize)]
struct SplitResponse {
    should_split: bool,
    #[serde(default)]
    parts: Vec<SplitResponsePart>,
}

#[derive(Deserialize)]
struct SplitResponsePart {
    text: String,
    speaker: SpeakerId,
}

#[derive(Deserialize)]
struct ResolveResponse {
    speaker: Option<SpeakerId>,
}
