//! Shared type definitions

use serde::{Deserialize, Serialize};

/// Speaker identifier assigned by diarization (0-based)
pub type SpeakerId = u32;

/// One diarization interval: a single speaker talking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationSegment {
    /// Speaker identifier
    pub speaker: SpeakerId,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl DiarizationSegment {
    pub fn new(speaker: SpeakerId, start: f64, end: f64) -> Self {
        Self { speaker, start, end }
    }

    /// Duration of this segment in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Midpoint of this segment in seconds
    pub fn center(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    /// Length of the temporal overlap with `[start, end]`, zero if disjoint
    pub fn overlap_with(&self, start: f64, end: f64) -> f64 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }
}

/// Word-level ASR output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Word text
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// ASR confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Speaker hint from providers that do their own diarization.
    /// Weak signal only, never authoritative.
    pub speaker_hint: Option<SpeakerId>,
}

impl Word {
    /// Duration of this word in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Midpoint of this word in seconds
    pub fn center(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// A word with its final speaker assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedWord {
    /// The original ASR word
    pub word: Word,
    /// Assigned speaker
    pub speaker: SpeakerId,
    /// Whether a heuristic pass overrode the naive overlap assignment
    pub corrected: bool,
}

/// A speaker turn: consecutive resolved words sharing a speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Speaker identifier
    pub speaker: SpeakerId,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Text content (words joined on single spaces)
    pub text: String,
    /// Constituent words
    pub words: Vec<ResolvedWord>,
}

impl Segment {
    /// Build a segment from a non-empty run of resolved words.
    ///
    /// The segment takes `speaker`, not the words' own labels; callers
    /// splitting mixed runs pass pure runs.
    pub fn from_words(speaker: SpeakerId, words: Vec<ResolvedWord>) -> Self {
        let start = words.first().map(|w| w.word.start).unwrap_or(0.0);
        let end = words.last().map(|w| w.word.end).unwrap_or(start);
        let text = join_words(&words);
        Self { speaker, start, end, text, words }
    }

    /// Duration of this segment in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Number of words in this segment
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Reassign the whole segment to `speaker`, rewriting word labels so
    /// the words stay consistent with their containing segment.
    pub fn reassign(&mut self, speaker: SpeakerId) {
        self.speaker = speaker;
        for w in &mut self.words {
            if w.speaker != speaker {
                w.speaker = speaker;
                w.corrected = true;
            }
        }
    }
}

/// Join word texts on single spaces, skipping empty entries
pub fn join_words(words: &[ResolvedWord]) -> String {
    words
        .iter()
        .map(|w| w.word.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Transcription result from the ASR collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Full transcript text
    pub full_text: String,
    /// Word-level timestamps
    pub words: Vec<Word>,
    /// Language code
    pub language: String,
    /// Audio duration in seconds
    pub duration: f64,
}

/// Audio file information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    /// File path
    pub path: String,
    /// Duration in seconds
    pub duration: f64,
    /// Sample rate
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Bit depth
    pub bits_per_sample: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> ResolvedWord {
        ResolvedWord {
            word: Word {
                text: text.to_string(),
                start,
                end,
                confidence: 1.0,
                speaker_hint: None,
            },
            speaker: 0,
            corrected: false,
        }
    }

    #[test]
    fn test_diarization_segment_overlap() {
        let seg = DiarizationSegment::new(0, 1.0, 3.0);
        assert!((seg.overlap_with(2.0, 4.0) - 1.0).abs() < 1e-9);
        assert_eq!(seg.overlap_with(4.0, 5.0), 0.0);
        assert!((seg.overlap_with(0.0, 10.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_segment_from_words() {
        let seg = Segment::from_words(1, vec![word("hello", 0.5, 0.9), word("there", 1.0, 1.4)]);
        assert_eq!(seg.speaker, 1);
        assert_eq!(seg.text, "hello there");
        assert!((seg.start - 0.5).abs() < 1e-9);
        assert!((seg.end - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_reassign_rewrites_words() {
        let mut seg = Segment::from_words(0, vec![word("yes", 0.0, 0.3)]);
        seg.reassign(2);
        assert_eq!(seg.speaker, 2);
        assert_eq!(seg.words[0].speaker, 2);
        assert!(seg.words[0].corrected);
    }

    #[test]
    fn test_join_words_skips_empty() {
        let words = vec![word("a", 0.0, 0.1), word("  ", 0.1, 0.2), word("b", 0.2, 0.3)];
        assert_eq!(join_words(&words), "a b");
    }
}
