//! Word-to-speaker resolution
//!
//! Assigns every ASR word a speaker by reconciling it with the
//! diarization segments. Each heuristic is a named rule evaluated in
//! priority order until one fires; the rule ordering is the contract, so
//! the rules themselves stay pure and individually testable. A
//! bidirectional smoothing stage then flips isolated, contextually
//! inconsistent words.

use tracing::debug;

use crate::config::FusionConfig;
use crate::lexicon::Lexicon;
use voxalign_core::{DiarizationSegment, ResolvedWord, SpeakerId, Word};

/// A diarization segment scored against one word
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub segment: &'a DiarizationSegment,
    /// Overlap length divided by word duration
    pub overlap_ratio: f64,
    /// Distance between segment midpoint and word midpoint
    pub center_distance: f64,
    /// Long segments tend to absorb brief interjections from others
    pub suspicious: bool,
}

/// Immutable context shared by the resolution rules
struct RuleContext<'a> {
    config: &'a FusionConfig,
    segments: &'a [DiarizationSegment],
    /// Airtime-dominant speaker; the final main speaker does not exist yet
    provisional_main: Option<SpeakerId>,
    prev_speaker: Option<SpeakerId>,
    prev_end: Option<f64>,
    next_start: Option<f64>,
    /// The naive overlap pick, for rules that need "a different speaker"
    naive: Option<SpeakerId>,
}

/// Assigns speakers to words
pub struct WordSpeakerResolver {
    config: FusionConfig,
    lexicon: Lexicon,
}

impl WordSpeakerResolver {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            lexicon: Lexicon::new(),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Resolve every word to a speaker, in time order.
    ///
    /// Empty-text words are dropped; empty diarization degrades to a
    /// single speaker 0 instead of failing.
    pub fn resolve(&self, segments: &[DiarizationSegment], words: &[Word]) -> Vec<ResolvedWord> {
        let words: Vec<&Word> = words.iter().filter(|w| !w.text.trim().is_empty()).collect();

        if segments.is_empty() {
            debug!("no diarization available, assigning all words to speaker 0");
            return words
                .into_iter()
                .map(|w| ResolvedWord {
                    word: w.clone(),
                    speaker: 0,
                    corrected: false,
                })
                .collect();
        }

        let provisional_main = airtime_main(segments);
        let mut resolved: Vec<ResolvedWord> = Vec::with_capacity(words.len());

        for (i, &word) in words.iter().enumerate() {
            let candidates = score_candidates(segments, word, &self.config);
            let naive = naive_pick(&candidates);

            let ctx = RuleContext {
                config: &self.config,
                segments,
                provisional_main,
                prev_speaker: resolved.last().map(|r| r.speaker),
                prev_end: resolved.last().map(|r| r.word.end),
                next_start: words.get(i + 1).map(|w| w.start),
                naive,
            };

            let mut chosen = rule_inherit_previous(word, &candidates, &ctx)
                .or_else(|| rule_nearby_over_suspicious(word, &candidates, &ctx))
                .or_else(|| rule_overlap_selection(word, &candidates, &ctx))
                .or_else(|| rule_nearest_without_overlap(word, &candidates, &ctx))
                .unwrap_or(0);

            let opener_text = match words.get(i + 1) {
                Some(next) => format!("{} {}", word.text, next.text),
                None => word.text.clone(),
            };
            if let Some(main) =
                rule_opening_question(word, chosen, &ctx, &self.lexicon, &opener_text)
            {
                chosen = main;
            }

            resolved.push(ResolvedWord {
                word: word.clone(),
                speaker: chosen,
                corrected: Some(chosen) != naive,
            });
        }

        smooth_words(resolved, &self.config)
    }
}

impl Default for WordSpeakerResolver {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

/// Speaker with the greatest total diarization airtime
fn airtime_main(segments: &[DiarizationSegment]) -> Option<SpeakerId> {
    let mut totals: Vec<(SpeakerId, f64)> = Vec::new();
    for seg in segments {
        match totals.iter_mut().find(|(s, _)| *s == seg.speaker) {
            Some((_, d)) => *d += seg.duration(),
            None => totals.push((seg.speaker, seg.duration())),
        }
    }
    totals
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(s, _)| s)
}

/// Score every overlapping segment against the word
fn score_candidates<'a>(
    segments: &'a [DiarizationSegment],
    word: &Word,
    config: &FusionConfig,
) -> Vec<Candidate<'a>> {
    let duration = word.duration().max(1e-6);
    segments
        .iter()
        .filter_map(|segment| {
            let overlap = segment.overlap_with(word.start, word.end);
            if overlap <= 0.0 {
                return None;
            }
            Some(Candidate {
                segment,
                overlap_ratio: overlap / duration,
                center_distance: (segment.center() - word.center()).abs(),
                suspicious: segment.duration() > config.suspicious_duration_secs,
            })
        })
        .collect()
}

/// The assignment pure overlap would make: best ratio, nearest center on
/// ties
fn naive_pick(candidates: &[Candidate<'_>]) -> Option<SpeakerId> {
    candidates
        .iter()
        .max_by(|a, b| {
            a.overlap_ratio
                .partial_cmp(&b.overlap_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.center_distance
                        .partial_cmp(&a.center_distance)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        })
        .map(|c| c.segment.speaker)
}

/// Best candidate by overlap, letting an ASR speaker hint break exact
/// ties (the hint is a weak signal, never authoritative)
fn best_by_overlap(pool: &[&Candidate<'_>], word: &Word) -> SpeakerId {
    let top = pool
        .iter()
        .max_by(|a, b| {
            a.overlap_ratio
                .partial_cmp(&b.overlap_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.center_distance
                        .partial_cmp(&a.center_distance)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        })
        .expect("pool is non-empty");

    if let Some(hint) = word.speaker_hint {
        if let Some(hinted) = pool
            .iter()
            .find(|c| c.segment.speaker == hint && c.overlap_ratio > top.overlap_ratio - 0.01)
        {
            return hinted.segment.speaker;
        }
    }
    top.segment.speaker
}

/// Context override: adjacency at sub-second gaps is a stronger signal
/// than segment overlap
fn rule_inherit_previous(
    word: &Word,
    candidates: &[Candidate<'_>],
    ctx: &RuleContext<'_>,
) -> Option<SpeakerId> {
    let prev_speaker = ctx.prev_speaker?;
    let prev_end = ctx.prev_end?;

    let gap = word.start - prev_end;
    if gap >= ctx.config.context_inherit_gap_secs {
        return None;
    }
    if candidates.is_empty() || candidates.iter().any(|c| c.segment.speaker == prev_speaker) {
        return None;
    }
    Some(prev_speaker)
}

/// Prefer a nearby non-suspicious segment when every overlapping segment
/// is suspicious, or when a large pause around the word contains another
/// speaker's boundary
fn rule_nearby_over_suspicious(
    word: &Word,
    candidates: &[Candidate<'_>],
    ctx: &RuleContext<'_>,
) -> Option<SpeakerId> {
    let config = ctx.config;

    let all_suspicious = !candidates.is_empty() && candidates.iter().all(|c| c.suspicious);

    let pause_signal = {
        let mut signal = false;
        if let Some(prev_end) = ctx.prev_end {
            let before = word.start - prev_end;
            if before > config.large_pause_secs {
                signal |= boundary_in_pause(ctx, prev_end, word.start);
            }
        }
        if let Some(next_start) = ctx.next_start {
            let after = next_start - word.end;
            if after > config.large_pause_secs {
                signal |= boundary_in_pause(ctx, word.end, next_start);
            }
        }
        signal
    };

    if !all_suspicious && !pause_signal {
        return None;
    }

    let best_suspicious = candidates
        .iter()
        .filter(|c| c.suspicious)
        .map(|c| c.center_distance)
        .fold(f64::INFINITY, f64::min);

    let (nearest, distance) = ctx
        .segments
        .iter()
        .filter(|s| s.duration() <= config.suspicious_duration_secs)
        .map(|s| (s, (s.center() - word.center()).abs()))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    if distance < config.nearby_distance_secs && distance < best_suspicious {
        Some(nearest.speaker)
    } else {
        None
    }
}

/// Does a segment of some other speaker start or end inside the pause?
fn boundary_in_pause(ctx: &RuleContext<'_>, lo: f64, hi: f64) -> bool {
    ctx.segments.iter().any(|s| {
        Some(s.speaker) != ctx.naive
            && ((s.start >= lo && s.start <= hi) || (s.end >= lo && s.end <= hi))
    })
}

/// The overlap-selection ladder: tight candidates, then non-suspicious
/// overlap, then the closest suspicious segment weighed against a
/// competing different-speaker segment
fn rule_overlap_selection(
    word: &Word,
    candidates: &[Candidate<'_>],
    ctx: &RuleContext<'_>,
) -> Option<SpeakerId> {
    if candidates.is_empty() {
        return None;
    }
    let config = ctx.config;

    // (a) tight center distance with real overlap, non-suspicious first
    let tight: Vec<&Candidate<'_>> = candidates
        .iter()
        .filter(|c| {
            c.center_distance < config.tight_center_distance_secs
                && c.overlap_ratio > config.min_overlap_ratio
        })
        .collect();
    if !tight.is_empty() {
        let clean: Vec<&Candidate<'_>> = tight.iter().copied().filter(|c| !c.suspicious).collect();
        let pool = if clean.is_empty() { &tight } else { &clean };
        return Some(best_by_overlap(pool, word));
    }

    // (b) any non-suspicious segment with real overlap
    let clean: Vec<&Candidate<'_>> = candidates
        .iter()
        .filter(|c| !c.suspicious && c.overlap_ratio > config.min_overlap_ratio)
        .collect();
    if !clean.is_empty() {
        return Some(best_by_overlap(&clean, word));
    }

    // (c) closest suspicious segment, unless a different-speaker segment
    // is substantially closer or overlaps materially better
    let suspicious = candidates
        .iter()
        .filter(|c| c.suspicious)
        .min_by(|a, b| {
            a.center_distance
                .partial_cmp(&b.center_distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    let Some(suspicious) = suspicious else {
        // Only marginal non-suspicious overlaps remain
        let pool: Vec<&Candidate<'_>> = candidates.iter().collect();
        return Some(best_by_overlap(&pool, word));
    };

    let closer_competitor = ctx
        .segments
        .iter()
        .filter(|s| s.speaker != suspicious.segment.speaker)
        .map(|s| (s, (s.center() - word.center()).abs()))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((competitor, distance)) = closer_competitor {
        if distance + config.competing_distance_margin_secs < suspicious.center_distance {
            return Some(competitor.speaker);
        }
    }

    let better_overlap = candidates
        .iter()
        .filter(|c| c.segment.speaker != suspicious.segment.speaker)
        .max_by(|a, b| {
            a.overlap_ratio
                .partial_cmp(&b.overlap_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(competitor) = better_overlap {
        if competitor.overlap_ratio > suspicious.overlap_ratio + config.competing_overlap_margin {
            return Some(competitor.segment.speaker);
        }
    }

    Some(suspicious.segment.speaker)
}

/// Fallback chain for words no segment overlaps at all
fn rule_nearest_without_overlap(
    word: &Word,
    candidates: &[Candidate<'_>],
    ctx: &RuleContext<'_>,
) -> Option<SpeakerId> {
    if !candidates.is_empty() {
        return None;
    }
    let config = ctx.config;

    let nearest = ctx
        .segments
        .iter()
        .map(|s| (s, (s.center() - word.center()).abs()))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let Some((segment, distance)) = nearest else {
        return Some(0);
    };

    if distance <= config.no_overlap_nearest_secs {
        return Some(segment.speaker);
    }
    if let (Some(prev_speaker), Some(prev_end)) = (ctx.prev_speaker, ctx.prev_end) {
        if word.start - prev_end < config.no_overlap_inherit_gap_secs {
            return Some(prev_speaker);
        }
    }
    Some(segment.speaker)
}

/// Start-of-file special case: an opening question attributed to a
/// time-zero artifact or suspicious segment belongs to the conversation's
/// primary speaker
fn rule_opening_question(
    word: &Word,
    chosen: SpeakerId,
    ctx: &RuleContext<'_>,
    lexicon: &Lexicon,
    opener_text: &str,
) -> Option<SpeakerId> {
    let config = ctx.config;

    if word.start >= config.opening_window_secs {
        return None;
    }
    let main = ctx.provisional_main?;
    if chosen == main {
        return None;
    }

    let (best, _) = ctx
        .segments
        .iter()
        .filter(|s| s.speaker == chosen)
        .map(|s| (s, (s.center() - word.center()).abs()))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    let artifact = best.start < 0.25 || best.duration() > config.suspicious_duration_secs;
    if !artifact {
        return None;
    }

    let has_brief_follower = ctx.segments.iter().any(|s| {
        s.speaker != chosen
            && s.start >= word.start
            && s.start <= word.start + config.opening_follow_secs
            && s.duration() < config.opening_brief_segment_secs
    });
    if !has_brief_follower {
        return None;
    }

    if !lexicon.is_question_opener(opener_text) {
        return None;
    }

    debug!(word = %word.text, main, "opening question reassigned to main speaker");
    Some(main)
}

/// Bidirectional smoothing: flip isolated words that disagree with both
/// neighbors, converging within the pass cap.
///
/// Each pass is a pure transformation; the loop stops early as soon as a
/// pass changes nothing.
pub fn smooth_words(mut words: Vec<ResolvedWord>, config: &FusionConfig) -> Vec<ResolvedWord> {
    for _ in 0..config.smoothing_passes {
        let next = smoothing_pass(&words, config);
        if next == words {
            break;
        }
        words = next;
    }
    words
}

fn smoothing_pass(words: &[ResolvedWord], config: &FusionConfig) -> Vec<ResolvedWord> {
    let mut out = words.to_vec();
    let n = words.len();

    for i in 1..n {
        let current = &words[i];
        let prev = &words[i - 1];
        if current.speaker == prev.speaker {
            continue;
        }
        let gap_prev = current.word.start - prev.word.end;

        let flip = if i + 1 < n {
            let next = &words[i + 1];
            let gap_next = next.word.start - current.word.end;
            let island = next.speaker != current.speaker;

            if prev.speaker == next.speaker
                && gap_prev < config.smoothing_gap_secs
                && gap_next < config.smoothing_gap_secs
            {
                // Both neighbors agree against the current word
                true
            } else {
                // Previous-only flip for isolated words on a small gap
                island && gap_prev < config.forward_gap_secs
            }
        } else {
            // Sequence end: only an extremely small gap justifies a flip
            gap_prev < config.tight_gap_secs
        };

        if flip {
            out[i].speaker = prev.speaker;
            out[i].corrected = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word {
            text: text.to_string(),
            start,
            end,
            confidence: 1.0,
            speaker_hint: None,
        }
    }

    fn resolved(text: &str, start: f64, end: f64, speaker: SpeakerId) -> ResolvedWord {
        ResolvedWord {
            word: word(text, start, end),
            speaker,
            corrected: false,
        }
    }

    fn seg(speaker: SpeakerId, start: f64, end: f64) -> DiarizationSegment {
        DiarizationSegment::new(speaker, start, end)
    }

    #[test]
    fn test_empty_diarization_single_speaker() {
        let resolver = WordSpeakerResolver::default();
        let words = vec![word("hello", 0.0, 0.4), word("there", 0.5, 0.9)];

        let out = resolver.resolve(&[], &words);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.speaker == 0 && !r.corrected));
    }

    #[test]
    fn test_plain_overlap_assignment() {
        let resolver = WordSpeakerResolver::default();
        let segments = vec![seg(0, 0.0, 5.0), seg(1, 5.0, 10.0)];
        let words = vec![word("first", 1.0, 1.5), word("second", 6.0, 6.5)];

        let out = resolver.resolve(&segments, &words);
        assert_eq!(out[0].speaker, 0);
        assert_eq!(out[1].speaker, 1);
        assert!(!out[0].corrected);
        assert!(!out[1].corrected);
    }

    #[test]
    fn test_empty_text_words_dropped() {
        let resolver = WordSpeakerResolver::default();
        let segments = vec![seg(0, 0.0, 5.0)];
        let words = vec![word("ok", 0.0, 0.4), word("  ", 0.5, 0.6), word("go", 1.0, 1.4)];

        let out = resolver.resolve(&segments, &words);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| !r.word.text.trim().is_empty()));
    }

    #[test]
    fn test_inherit_previous_on_tight_gap() {
        let resolver = WordSpeakerResolver::default();
        let segments = vec![seg(0, 0.0, 5.0), seg(1, 5.0, 10.0)];
        // Second word overlaps only speaker 1, but trails the previous
        // word by 0.15s, so adjacency wins
        let words = vec![word("and", 4.0, 4.9), word("then", 5.05, 5.3)];

        let out = resolver.resolve(&segments, &words);
        assert_eq!(out[1].speaker, 0);
        assert!(out[1].corrected);
    }

    #[test]
    fn test_suspicious_segment_avoided_in_tight_selection() {
        let resolver = WordSpeakerResolver::default();
        // A 20s segment is suspicious; the short one wins the tight rung
        let segments = vec![seg(0, 0.0, 20.0), seg(1, 10.2, 11.0)];
        let words = vec![word("sure", 10.3, 10.6)];

        let out = resolver.resolve(&segments, &words);
        assert_eq!(out[0].speaker, 1);
    }

    #[test]
    fn test_all_suspicious_prefers_nearby_clean_segment() {
        let resolver = WordSpeakerResolver::default();
        let segments = vec![seg(0, 0.0, 20.0), seg(1, 15.8, 16.5)];
        // Word overlaps only the suspicious segment; the clean segment
        // sits 0.95s away, well within the nearby threshold
        let words = vec![word("right", 15.0, 15.4)];

        let out = resolver.resolve(&segments, &words);
        assert_eq!(out[0].speaker, 1);
        assert!(out[0].corrected);
    }

    #[test]
    fn test_no_overlap_nearest_within_a_second() {
        let resolver = WordSpeakerResolver::default();
        let segments = vec![seg(0, 0.0, 2.0), seg(1, 4.0, 6.0)];
        let words = vec![word("gap", 2.6, 2.9)];

        // Centers: speaker 0 at 1.0 (1.75 away), speaker 1 at 5.0 (2.25
        // away); neither within 1s, so nearest-regardless applies
        let out = resolver.resolve(&segments, &words);
        assert_eq!(out[0].speaker, 0);
    }

    #[test]
    fn test_opening_question_goes_to_main_speaker() {
        let resolver = WordSpeakerResolver::default();
        let segments = vec![
            seg(1, 0.0, 2.0),  // time-zero artifact claims the opener
            seg(0, 0.6, 1.4),  // brief segment right after the word
            seg(0, 3.0, 15.0), // main speaker by airtime
        ];
        let words = vec![word("what", 0.2, 0.5)];

        let out = resolver.resolve(&segments, &words);
        assert_eq!(out[0].speaker, 0);
        assert!(out[0].corrected);
    }

    #[test]
    fn test_word_coverage() {
        let resolver = WordSpeakerResolver::default();
        let segments = vec![seg(0, 0.0, 5.0), seg(1, 5.0, 10.0)];
        let words: Vec<Word> = (0..20)
            .map(|i| word(&format!("w{i}"), i as f64 * 0.5, i as f64 * 0.5 + 0.4))
            .collect();

        let out = resolver.resolve(&segments, &words);
        assert_eq!(out.len(), words.len());
        for (input, output) in words.iter().zip(out.iter()) {
            assert_eq!(input.text, output.word.text);
        }
    }

    #[test]
    fn test_smoothing_flips_island() {
        let config = FusionConfig::default();
        let words = vec![
            resolved("a", 0.0, 0.4, 0),
            resolved("b", 0.5, 0.9, 1),
            resolved("c", 1.0, 1.4, 0),
        ];

        let out = smooth_words(words, &config);
        assert_eq!(out[1].speaker, 0);
        assert!(out[1].corrected);
    }

    #[test]
    fn test_smoothing_noop_on_consistent_sequence() {
        let config = FusionConfig::default();
        let words = vec![
            resolved("a", 0.0, 0.4, 0),
            resolved("b", 0.5, 0.9, 0),
            resolved("c", 2.0, 2.4, 1),
            resolved("d", 2.5, 2.9, 1),
        ];

        let out = smooth_words(words.clone(), &config);
        assert_eq!(out, words);
    }

    #[test]
    fn test_smoothing_terminates_within_pass_cap() {
        let config = FusionConfig::default();
        // Alternating labels at tight gaps; whatever it converges to, it
        // must converge without exceeding the cap (no panic, same length)
        let words: Vec<ResolvedWord> = (0..12)
            .map(|i| resolved(&format!("w{i}"), i as f64 * 0.2, i as f64 * 0.2 + 0.15, (i % 2) as u32))
            .collect();

        let out = smooth_words(words, &config);
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn test_speaker_hint_breaks_exact_ties() {
        let resolver = WordSpeakerResolver::default();
        // Both segments cover the word completely and sit at the same
        // center distance
        let segments = vec![seg(0, 1.0, 3.0), seg(1, 1.0, 3.0)];
        let mut hinted = word("hm", 1.8, 2.2);
        hinted.speaker_hint = Some(0);

        let out = resolver.resolve(&segments, &[hinted]);
        assert_eq!(out[0].speaker, 0);
    }
}
