//! Ollama local arbiter backend

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::arbiter::{extract_json_object, SpeakerArbiter, SplitDecision, SplitPart};
use crate::error::LlmError;
use crate::prompts;
use voxalign_core::{Segment, SpeakerId};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ollama local arbiter
pub struct OllamaArbiter {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaArbiter {
    /// Create a new Ollama arbiter with default settings
    pub fn new() -> Self {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    /// Create with custom URL and model
    pub fn with_config(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }

    /// Generate response from Ollama
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: Some(OllamaOptions {
                temperature: 0.2,
                num_predict: 1024,
            }),
        };

        debug!("Sending arbitration request to Ollama at {}", url);

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_connect() {
                LlmError::ConnectionError(format!(
                    "Cannot connect to Ollama at {}. Is Ollama running?",
                    self.base_url
                ))
            } else {
                LlmError::from(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Ollama API error: {} - {}", status, error_text);

            if error_text.contains("model") && error_text.contains("not found") {
                return Err(LlmError::ModelNotAvailable(self.model.clone()));
            }

            return Err(LlmError::RequestFailed(format!("{}: {}", status, error_text)));
        }

        let response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(response.response)
    }
}

impl Default for OllamaArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeakerArbiter for OllamaArbiter {
    async fn split_segment(
        &self,
        segment: &Segment,
        context: &[Segment],
    ) -> Result<SplitDecision, LlmError> {
        let prompt = prompts::build_split_prompt(segment, context);
        let response = self.generate(&prompt).await?;

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
        let response = self.generate(&prompt).await?;

        let parsed: ResolveResponse = serde_json::from_str(extract_json_object(&response))
            .map_err(|e| LlmError::ParseError(format!("Failed to parse speaker verdict: {}", e)))?;

        Ok(parsed.speaker)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
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
