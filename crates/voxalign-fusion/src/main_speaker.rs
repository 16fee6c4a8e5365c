//! Main speaker selection
//!
//! Picks the speaker who drives the conversation; downstream consumers
//! use it for dialogue rendering and for isolating the dominant voice.

use std::collections::HashMap;

use tracing::debug;

use voxalign_core::{Segment, SpeakerId};

/// Word-count and airtime totals per speaker
#[derive(Debug, Clone, Copy, Default)]
struct SpeakerStats {
    words: usize,
    duration: f64,
}

/// Select the dominant speaker.
///
/// Word count is the primary criterion; when the top two speakers are
/// within 10% of the total word count, total airtime decides instead.
/// Empty input yields `None`.
pub fn select_main_speaker(segments: &[Segment]) -> Option<SpeakerId> {
    let mut stats: HashMap<SpeakerId, SpeakerStats> = HashMap::new();
    for segment in segments {
        let entry = stats.entry(segment.speaker).or_default();
        entry.words += segment.word_count();
        entry.duration += segment.duration();
    }
    if stats.is_empty() {
        return None;
    }

    let total_words: usize = stats.values().map(|s| s.words).sum();

    let mut by_words: Vec<(SpeakerId, SpeakerStats)> = stats.into_iter().collect();
    by_words.sort_by(|a, b| b.1.words.cmp(&a.1.words).then(a.0.cmp(&b.0)));

    if by_words.len() == 1 {
        return Some(by_words[0].0);
    }

    let lead = by_words[0].1.words - by_words[1].1.words;
    let near_tie = total_words > 0 && (lead as f64) < 0.10 * total_words as f64;

    if near_tie {
        // Word counts too close to call; airtime breaks the tie
        let winner = by_words
            .iter()
            .max_by(|a, b| {
                a.1.duration
                    .partial_cmp(&b.1.duration)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.0.cmp(&a.0))
            })
            .map(|(id, _)| *id);
        debug!(?winner, "main speaker by duration tie-break");
        return winner;
    }

    Some(by_words[0].0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxalign_core::{ResolvedWord, Word};

    fn segment(speaker: SpeakerId, start: f64, end: f64, word_count: usize) -> Segment {
        let step = (end - start) / word_count.max(1) as f64;
        let words: Vec<ResolvedWord> = (0..word_count)
            .map(|i| ResolvedWord {
                word: Word {
                    text: format!("w{i}"),
                    start: start + i as f64 * step,
                    end: start + (i + 1) as f64 * step,
                    confidence: 1.0,
                    speaker_hint: None,
                },
                speaker,
                corrected: false,
            })
            .collect();
        Segment::from_words(speaker, words)
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(select_main_speaker(&[]), None);
    }

    #[test]
    fn test_word_count_wins() {
        let segments = vec![segment(0, 0.0, 10.0, 40), segment(1, 10.0, 15.0, 10)];
        assert_eq!(select_main_speaker(&segments), Some(0));
    }

    #[test]
    fn test_near_tie_falls_back_to_duration() {
        // 52 vs 48 words: an 8% lead on 100 words, under the 10% line,
        // so the 60s of airtime must win over the 52 words
        let segments = vec![segment(0, 0.0, 40.0, 52), segment(1, 40.0, 100.0, 48)];
        assert_eq!(select_main_speaker(&segments), Some(1));
    }

    #[test]
    fn test_clear_lead_ignores_duration() {
        // 70 vs 30 words is decisive even with less airtime
        let segments = vec![segment(0, 0.0, 10.0, 70), segment(1, 10.0, 100.0, 30)];
        assert_eq!(select_main_speaker(&segments), Some(0));
    }

    #[test]
    fn test_single_speaker() {
        let segments = vec![segment(2, 0.0, 5.0, 10)];
        assert_eq!(select_main_speaker(&segments), Some(2));
    }
}
