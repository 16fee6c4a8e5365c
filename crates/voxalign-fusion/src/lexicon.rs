//! Text lexicons used by the fusion heuristics
//!
//! Closed word lists for the conversational patterns the passes look for:
//! question/instruction openers, backchannel replies, negations and
//! short-answer markers.

use regex::Regex;

/// Compiled lexicon matchers
pub struct Lexicon {
    question_opener: Regex,
    negation_opener: Regex,
    backchannel: Regex,
    short_answer: Regex,
}

impl Lexicon {
    pub fn new() -> Self {
        Self {
            question_opener: Regex::new(
                r"(?i)^(what|how|why|when|where|who|which|hey|did you|do you|can you|could you|would you|will you|are you|is it|tell me|show me|let's|please)\b",
            )
            .expect("static pattern"),
            negation_opener: Regex::new(r"(?i)^(no|nope|nah|not really)\b").expect("static pattern"),
            backchannel: Regex::new(
                r"(?i)^(yes|yeah|yep|no|nope|uh[- ]?huh|mm[- ]?hmm|mhm|okay|ok|right|sure|exactly|totally|got it|i see|thanks|thank you)$",
            )
            .expect("static pattern"),
            short_answer: Regex::new(r"(?i)\b(uh|um|well|yeah|per second|i think|maybe)\b")
                .expect("static pattern"),
        }
    }

    /// Does the text open with a question or instruction marker?
    pub fn is_question_opener(&self, text: &str) -> bool {
        self.question_opener.is_match(text.trim())
    }

    /// Does the text open with a negation?
    pub fn is_negation_opener(&self, text: &str) -> bool {
        self.negation_opener.is_match(text.trim())
    }

    /// Is the whole text a backchannel reply?
    pub fn is_backchannel(&self, text: &str) -> bool {
        let trimmed = text.trim().trim_end_matches(['.', ',', '!', '?']);
        self.backchannel.is_match(trimmed)
    }

    /// Does the text contain a short-answer marker?
    pub fn has_short_answer_marker(&self, text: &str) -> bool {
        self.short_answer.is_match(text)
    }

    /// Does the text read like a factual reply a negation might correct?
    pub fn looks_informational(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        lower.chars().any(|c| c.is_ascii_digit())
            || lower.contains(" is ")
            || lower.contains(" are ")
            || lower.contains("it's ")
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new()
    }
}
