//! Speaker arbiter trait and common types

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use voxalign_core::{Segment, SpeakerId};

/// One part of a split segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPart {
    /// Text of this part
    pub text: String,
    /// Speaker this part belongs to
    pub speaker: SpeakerId,
}

/// Verdict on whether a segment mixes two speakers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitDecision {
    /// Whether the segment should be split
    pub should_split: bool,
    /// Ordered parts when splitting; empty otherwise
    pub parts: Vec<SplitPart>,
}

impl SplitDecision {
    /// The safe default: leave the segment alone
    pub fn no_opinion() -> Self {
        Self {
            should_split: false,
            parts: Vec::new(),
        }
    }
}

/// LLM speaker arbiter capability.
///
/// Callers must treat every error as "no opinion"; the arbiter is never
/// load-bearing for correctness.
#[trait_variant::make(SpeakerArbiter: Send)]
pub trait LocalSpeakerArbiter {
    /// Decide whether `segment` mixes a question and its answer, and how
    /// to split it. `context` is the surrounding conversation.
    async fn split_segment(
        &self,
        segment: &Segment,
        context: &[Segment],
    ) -> Result<SplitDecision, LlmError>;

    /// Decide which speaker `current` belongs to given the previous turn.
    /// `None` means no opinion.
    async fn resolve_speaker(
        &self,
        prev: &Segment,
        current: &Segment,
        gap_secs: f64,
        context: &[Segment],
    ) -> Result<Option<SpeakerId>, LlmError>;

    /// Check if the backend is reachable
    async fn is_available(&self) -> bool;

    /// Get arbiter name
    fn name(&self) -> &'static str;

    /// Get model name
    fn model(&self) -> &str;
}

/// Arbiter that never has an opinion.
///
/// Used in tests and whenever no LLM backend is configured; the fusion
/// engine then relies purely on its deterministic rules.
#[derive(Debug, Clone, Default)]
pub struct NoOpinionArbiter;

impl SpeakerArbiter for NoOpinionArbiter {
    async fn split_segment(
        &self,
        _segment: &Segment,
        _context: &[Segment],
    ) -> Result<SplitDecision, LlmError> {
        Ok(SplitDecision::no_opinion())
    }

    async fn resolve_speaker(
        &self,
        _prev: &Segment,
        _current: &Segment,
        _gap_secs: f64,
        _context: &[Segment],
    ) -> Result<Option<SpeakerId>, LlmError> {
        Ok(None)
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "NoOpinion"
    }

    fn model(&self) -> &str {
        ""
    }
}

/// Extract the outermost JSON object from a model response that may wrap
/// it in prose or code fences
pub(crate) fn extract_json_object(response: &str) -> &str {
    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return &response[start..=end];
        }
    }
    response
}
