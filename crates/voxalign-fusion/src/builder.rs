//! Segment building and refinement
//!
//! Groups resolved words into speaker turns, then refines the turn list
//! through a chain of passes. Every pass is a transformation from one
//! segment list to the next, so each is independently testable and the
//! smoothing convergence check is a plain equality test. The LLM arbiter
//! is consulted only for genuinely ambiguous question/answer patterns and
//! every arbiter failure fails open to "leave it alone".

use tracing::{debug, warn};

use crate::config::FusionConfig;
use crate::lexicon::Lexicon;
use crate::main_speaker::select_main_speaker;
use voxalign_core::{join_words, ResolvedWord, Segment, SpeakerId};
use voxalign_llm::SpeakerArbiter;

/// Builds and refines speaker turns from resolved words
pub struct SegmentBuilder {
    config: FusionConfig,
    lexicon: Lexicon,
}

impl SegmentBuilder {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            lexicon: Lexicon::new(),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Run the full build chain
    pub async fn build<A: SpeakerArbiter + Sync>(
        &self,
        words: Vec<ResolvedWord>,
        arbiter: &A,
    ) -> Vec<Segment> {
        let segments = group_words(&words, self.config.segment_gap_secs);
        let segments = split_mixed(segments);

        // Main speaker from the raw grouping; the refinement passes below
        // need it as an anchor
        let main = select_main_speaker(&segments);

        let segments = self.split_questions(segments, main, arbiter).await;
        let segments = self.smooth_segments(segments);

        let segments = match main {
            Some(main) => {
                let segments = self.reassign_backchannels(segments, main);
                let segments = self.resolve_negations(segments, main, arbiter).await;
                self.resolve_post_reply_questions(segments, main, arbiter).await
            }
            None => segments,
        };

        let mut segments = merge_adjacent(segments, self.config.segment_gap_secs);
        segments.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
        segments
    }

    /// Split segments that mix a question and its short answer.
    ///
    /// An explicit split at the `?` is tried first; only when no marker is
    /// adjacent does the arbiter get a say. Arbiter failure means no
    /// split.
    pub async fn split_questions<A: SpeakerArbiter + Sync>(
        &self,
        segments: Vec<Segment>,
        main: Option<SpeakerId>,
        arbiter: &A,
    ) -> Vec<Segment> {
        let Some(main) = main else {
            return segments;
        };
        let Some(other) = dominant_other(&segments, main) else {
            return segments;
        };
        let context = segments.clone();

        let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if !self.question_split_applies(&segment) {
                out.push(segment);
                continue;
            }

            if let Some((question, answer)) = self.explicit_split(&segment, main, other) {
                debug!(start = segment.start, "explicit question/answer split");
                out.push(question);
                out.push(answer);
                continue;
            }

            match arbiter.split_segment(&segment, &context).await {
                Ok(decision) if decision.should_split && decision.parts.len() >= 2 => {
                    let parts = apportion_parts(&segment, &decision.parts);
                    if parts.is_empty() {
                        out.push(segment);
                    } else {
                        debug!(start = segment.start, parts = parts.len(), "arbiter split");
                        out.extend(parts);
                    }
                }
                Ok(_) => out.push(segment),
                Err(e) => {
                    warn!(error = %e, "arbiter unavailable, keeping segment unsplit");
                    out.push(segment);
                }
            }
        }
        out
    }

    fn question_split_applies(&self, segment: &Segment) -> bool {
        segment.text.contains('?')
            && segment.word_count() > self.config.qa_min_words
            && self.lexicon.has_short_answer_marker(&segment.text)
    }

    /// Split right after the `?` when a short-answer marker directly
    /// follows it
    fn explicit_split(
        &self,
        segment: &Segment,
        main: SpeakerId,
        other: SpeakerId,
    ) -> Option<(Segment, Segment)> {
        let question_end = segment.words.iter().position(|w| {
            w.word.text.trim_end_matches(['"', '\'']).ends_with('?')
        })?;
        if question_end + 1 >= segment.words.len() {
            return None;
        }
        let marker = &segment.words[question_end + 1];
        if !self.lexicon.has_short_answer_marker(&marker.word.text) {
            return None;
        }

        let question_words = segment.words[..=question_end].to_vec();
        let answer_words = segment.words[question_end + 1..].to_vec();

        let question = Segment::from_words(segment.speaker, question_words);
        let mut answer = Segment::from_words(segment.speaker, answer_words);
        // The answer belongs to whoever the question was aimed at
        answer.reassign(if segment.speaker == main { other } else { main });
        Some((question, answer))
    }

    /// Segment-level mirror of the word smoothing rule
    pub fn smooth_segments(&self, mut segments: Vec<Segment>) -> Vec<Segment> {
        for _ in 0..self.config.smoothing_passes {
            let next = self.segment_smoothing_pass(&segments);
            if next == segments {
                break;
            }
            segments = next;
        }
        segments
    }

    fn segment_smoothing_pass(&self, segments: &[Segment]) -> Vec<Segment> {
        let config = &self.config;
        let mut out = segments.to_vec();
        let n = segments.len();

        for i in 1..n {
            let current = &segments[i];
            let prev = &segments[i - 1];
            if current.speaker == prev.speaker {
                continue;
            }
            let gap_prev = current.start - prev.end;

            let flip = if i + 1 < n {
                let next = &segments[i + 1];
                let gap_next = next.start - current.end;
                let island = next.speaker != current.speaker;

                if prev.speaker == next.speaker
                    && gap_prev < config.smoothing_gap_secs
                    && gap_next < config.smoothing_gap_secs
                {
                    true
                } else {
                    island && gap_prev < config.forward_gap_secs
                }
            } else {
                gap_prev < config.tight_gap_secs
            };

            if flip {
                out[i].reassign(prev.speaker);
            }
        }
        out
    }

    /// A short backchannel wedged between two main-speaker turns is
    /// structurally unlikely to belong to the speaker on both sides
    pub fn reassign_backchannels(
        &self,
        mut segments: Vec<Segment>,
        main: SpeakerId,
    ) -> Vec<Segment> {
        let Some(other) = dominant_other(&segments, main) else {
            return segments;
        };
        let config = &self.config;
        let n = segments.len();

        for i in 1..n.saturating_sub(1) {
            if segments[i - 1].speaker != main || segments[i + 1].speaker != main {
                continue;
            }
            let current = &segments[i];
            if current.speaker != other
                && current.duration() < config.backchannel_max_secs
                && current.word_count() <= config.backchannel_max_words
                && self.lexicon.is_backchannel(&current.text)
            {
                debug!(start = current.start, text = %current.text, "backchannel reassigned");
                segments[i].reassign(other);
            }
        }
        segments
    }

    /// A segment opening with a negation right after a question (or an
    /// informational reply) is usually a correction; ask the arbiter, and
    /// fall back to the deterministic alternation rule when it has no
    /// opinion
    pub async fn resolve_negations<A: SpeakerArbiter + Sync>(
        &self,
        mut segments: Vec<Segment>,
        main: SpeakerId,
        arbiter: &A,
    ) -> Vec<Segment> {
        let context = segments.clone();
        let config = &self.config;

        for i in 1..segments.len() {
            if !self.lexicon.is_negation_opener(&segments[i].text) {
                continue;
            }

            let prev = segments[i - 1].clone();
            let prev_has_question = prev.text.contains('?');
            let chained_question = i >= 2
                && prev.start - segments[i - 2].end < config.segment_gap_secs
                && segments[i - 2].text.contains('?');
            let informational = self.lexicon.looks_informational(&prev.text);

            if !(prev_has_question || chained_question || informational) {
                continue;
            }

            let gap = segments[i].start - prev.end;
            let verdict = match arbiter
                .resolve_speaker(&prev, &segments[i], gap, &context)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "arbiter unavailable for negation");
                    None
                }
            };

            if let Some(speaker) = verdict {
                segments[i].reassign(speaker);
                continue;
            }

            // No opinion: read the alternation of the two preceding turns
            if i >= 2 {
                let a = segments[i - 2].speaker;
                let b = segments[i - 1].speaker;
                if a == main && b != main {
                    // main -> other -> negation reads as a correction by main
                    segments[i].reassign(main);
                } else if a == b {
                    let target = if a == main {
                        dominant_other(&context, main)
                    } else {
                        Some(main)
                    };
                    if let Some(target) = target {
                        segments[i].reassign(target);
                    }
                }
            }
        }
        segments
    }

    /// A question or instruction right after a very short reply usually
    /// comes from the main speaker; consult the arbiter only when the
    /// algorithmic confidence is low
    pub async fn resolve_post_reply_questions<A: SpeakerArbiter + Sync>(
        &self,
        mut segments: Vec<Segment>,
        main: SpeakerId,
        arbiter: &A,
    ) -> Vec<Segment> {
        let context = segments.clone();
        let config = &self.config;

        for i in 1..segments.len() {
            let prev = segments[i - 1].clone();
            let current = &segments[i];

            if prev.duration() >= config.short_turn_secs
                || current.start - prev.end >= config.question_follow_gap_secs
                || !self.lexicon.is_question_opener(&current.text)
            {
                continue;
            }

            // High confidence when the pattern already points at main; a
            // question by the same speaker as the reply smells like a
            // diarization error
            let confidence = if current.speaker == main && current.speaker != prev.speaker {
                0.9
            } else if current.speaker == prev.speaker {
                0.3
            } else {
                0.6
            };

            if confidence >= config.arbiter_confidence_threshold {
                segments[i].reassign(main);
                continue;
            }

            let gap = current.start - prev.end;
            let verdict = match arbiter
                .resolve_speaker(&prev, current, gap, &context)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "arbiter unavailable for post-reply question");
                    None
                }
            };
            segments[i].reassign(verdict.unwrap_or(main));
        }
        segments
    }
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

/// Group consecutive same-speaker words, breaking on silence gaps
pub fn group_words(words: &[ResolvedWord], gap_secs: f64) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut run: Vec<ResolvedWord> = Vec::new();

    for word in words {
        if let Some(last) = run.last() {
            if word.speaker != last.speaker || word.word.start - last.word.end > gap_secs {
                let speaker = last.speaker;
                segments.push(Segment::from_words(speaker, std::mem::take(&mut run)));
            }
        }
        run.push(word.clone());
    }
    if let Some(last) = run.last() {
        let speaker = last.speaker;
        segments.push(Segment::from_words(speaker, run));
    }
    segments
}

/// Split any segment whose words span more than one speaker into pure
/// sub-segments, never re-emitting the mixed original
pub fn split_mixed(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out = Vec::with_capacity(segments.len());
    for segment in segments {
        let mixed = segment.words.iter().any(|w| w.speaker != segment.speaker);
        if !mixed {
            out.push(segment);
            continue;
        }

        let mut run: Vec<ResolvedWord> = Vec::new();
        for word in &segment.words {
            if let Some(last) = run.last() {
                if word.speaker != last.speaker {
                    let speaker = last.speaker;
                    out.push(Segment::from_words(speaker, std::mem::take(&mut run)));
                }
            }
            run.push(word.clone());
        }
        if let Some(last) = run.last() {
            let speaker = last.speaker;
            out.push(Segment::from_words(speaker, run));
        }
    }
    out
}

/// Merge adjacent same-speaker segments separated by at most `gap_secs`
pub fn merge_adjacent(segments: Vec<Segment>, gap_secs: f64) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::new();
    for segment in segments {
        if let Some(last) = merged.last_mut() {
            if last.speaker == segment.speaker && segment.start - last.end <= gap_secs {
                last.words.extend(segment.words);
                last.end = last.end.max(segment.end);
                last.text = join_words(&last.words);
                continue;
            }
        }
        merged.push(segment);
    }
    merged
}

/// The speaker with the most words among everyone except `main`
fn dominant_other(segments: &[Segment], main: SpeakerId) -> Option<SpeakerId> {
    let mut counts: Vec<(SpeakerId, usize)> = Vec::new();
    for segment in segments {
        if segment.speaker == main {
            continue;
        }
        match counts.iter_mut().find(|(s, _)| *s == segment.speaker) {
            Some((_, c)) => *c += segment.word_count(),
            None => counts.push((segment.speaker, segment.word_count())),
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(s, _)| s)
}

/// Cut the segment's time span into per-part spans proportional to each
/// part's text length, then deal the words out by their midpoints
fn apportion_parts(segment: &Segment, parts: &[voxalign_llm::SplitPart]) -> Vec<Segment> {
    let total_chars: usize = parts.iter().map(|p| p.text.len().max(1)).sum();
    if total_chars == 0 || segment.words.is_empty() {
        return Vec::new();
    }

    let duration = segment.duration().max(1e-6);
    let mut spans: Vec<(f64, f64, SpeakerId)> = Vec::with_capacity(parts.len());
    let mut cursor = segment.start;
    for (idx, part) in parts.iter().enumerate() {
        let share = part.text.len().max(1) as f64 / total_chars as f64;
        let end = if idx + 1 == parts.len() {
            segment.end
        } else {
            cursor + duration * share
        };
        spans.push((cursor, end, part.speaker));
        cursor = end;
    }

    let mut buckets: Vec<Vec<ResolvedWord>> = vec![Vec::new(); spans.len()];
    for word in &segment.words {
        let center = word.word.center();
        let idx = spans
            .iter()
            .position(|(lo, hi, _)| center >= *lo && center < *hi)
            .unwrap_or(spans.len() - 1);
        buckets[idx].push(word.clone());
    }

    spans
        .iter()
        .zip(buckets)
        .filter(|(_, words)| !words.is_empty())
        .map(|((_, _, speaker), words)| {
            let mut part = Segment::from_words(*speaker, words);
            part.reassign(*speaker);
            part
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxalign_core::Word;
    use voxalign_llm::{LlmError, NoOpinionArbiter, SplitDecision, SplitPart};

    fn rw(text: &str, start: f64, end: f64, speaker: SpeakerId) -> ResolvedWord {
        ResolvedWord {
            word: Word {
                text: text.to_string(),
                start,
                end,
                confidence: 1.0,
                speaker_hint: None,
            },
            speaker,
            corrected: false,
        }
    }

    fn sentence(text: &str, start: f64, speaker: SpeakerId) -> Vec<ResolvedWord> {
        text.split_whitespace()
            .enumerate()
            .map(|(i, w)| {
                rw(w, start + i as f64 * 0.35, start + i as f64 * 0.35 + 0.3, speaker)
            })
            .collect()
    }

    fn seg_from(text: &str, start: f64, speaker: SpeakerId) -> Segment {
        Segment::from_words(speaker, sentence(text, start, speaker))
    }

    /// Arbiter with a scripted split verdict
    struct ScriptedArbiter {
        split: Option<SplitDecision>,
        speaker: Option<SpeakerId>,
        fail: bool,
    }

    impl SpeakerArbiter for ScriptedArbiter {
        async fn split_segment(
            &self,
            _segment: &Segment,
            _context: &[Segment],
        ) -> Result<SplitDecision, LlmError> {
            if self.fail {
                return Err(LlmError::Timeout);
            }
            Ok(self.split.clone().unwrap_or_else(SplitDecision::no_opinion))
        }

        async fn resolve_speaker(
            &self,
            _prev: &Segment,
            _current: &Segment,
            _gap_secs: f64,
            _context: &[Segment],
        ) -> Result<Option<SpeakerId>, LlmError> {
            if self.fail {
                return Err(LlmError::Timeout);
            }
            Ok(self.speaker)
        }

        async fn is_available(&self) -> bool {
            !self.fail
        }

        fn name(&self) -> &'static str {
            "Scripted"
        }

        fn model(&self) -> &str {
            ""
        }
    }

    #[test]
    fn test_group_words_on_speaker_change_and_gap() {
        let mut words = sentence("we should look at it", 0.0, 0);
        words.extend(sentence("sure go ahead", 2.5, 1));
        // Same speaker, but a 2s silence starts a new turn
        words.extend(sentence("starting with the parser", 6.0, 1));

        let segments = group_words(&words, 1.0);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].speaker, 0);
        assert_eq!(segments[1].speaker, 1);
        assert_eq!(segments[2].speaker, 1);
        for seg in &segments {
            assert!(seg.start < seg.end);
            for w in &seg.words {
                assert!(w.word.start < w.word.end);
            }
        }
    }

    #[test]
    fn test_split_mixed_emits_pure_runs_only() {
        let mut words = sentence("how long does it take", 0.0, 1);
        words.extend(sentence("about an hour", 2.0, 0));
        let mixed = Segment::from_words(1, words);

        let segments = split_mixed(vec![mixed]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker, 1);
        assert_eq!(segments[1].speaker, 0);
        assert!(segments.iter().all(|s| s.words.iter().all(|w| w.speaker == s.speaker)));
    }

    #[test]
    fn test_merge_adjacent_same_speaker() {
        let segments = vec![
            seg_from("first part", 0.0, 0),
            seg_from("second part", 1.2, 0),
            seg_from("someone else", 5.0, 1),
        ];
        let merged = merge_adjacent(segments, 1.0);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "first part second part");
        assert_eq!(merged[0].words.len(), 4);
    }

    #[tokio::test]
    async fn test_explicit_question_answer_split() {
        let builder = SegmentBuilder::default();
        // One segment holding both the question and the short answer
        let mut words = sentence("did you see the error?", 10.0, 0);
        words.extend(sentence("well maybe later", 12.0, 0));
        let qa = Segment::from_words(0, words);

        let segments = vec![
            seg_from("let me walk you through the setup today", 0.0, 0),
            qa,
            seg_from("ok", 16.0, 1),
        ];

        let out = builder.split_questions(segments, Some(0), &NoOpinionArbiter).await;
        assert_eq!(out.len(), 4);
        assert!(out[1].text.ends_with('?'));
        assert_eq!(out[1].speaker, 0);
        assert_eq!(out[2].speaker, 1);
        assert_eq!(out[1].word_count() + out[2].word_count(), 8);
    }

    #[tokio::test]
    async fn test_arbiter_split_apportions_by_text_length() {
        let builder = SegmentBuilder::default();
        // The word after the '?' is not a marker, so the explicit split
        // cannot fire and the arbiter decides; "per second" later in the
        // text keeps the segment eligible
        let mut words = sentence("what is the current throughput?", 10.0, 0);
        words.extend(sentence("fifty per second roughly", 12.0, 0));
        let qa = Segment::from_words(0, words);

        let all = vec![
            seg_from("let me check the load numbers", 0.0, 0),
            qa,
            seg_from("noted", 20.0, 1),
        ];

        let arbiter = ScriptedArbiter {
            split: Some(SplitDecision {
                should_split: true,
                parts: vec![
                    SplitPart { text: "what is the current throughput?".into(), speaker: 0 },
                    SplitPart { text: "fifty per second roughly".into(), speaker: 1 },
                ],
            }),
            speaker: None,
            fail: false,
        };

        let out = builder.split_questions(all, Some(0), &arbiter).await;
        let parts: Vec<&Segment> =
            out.iter().filter(|s| s.start >= 10.0 && s.start < 16.0).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].speaker, 0);
        assert_eq!(parts[1].speaker, 1);
        assert_eq!(parts[0].word_count() + parts[1].word_count(), 9);
        // Apportioned boundary must respect time ordering
        assert!(parts[0].end <= parts[1].start + 1e-9);
    }

    #[tokio::test]
    async fn test_arbiter_failure_keeps_segment_unsplit() {
        let builder = SegmentBuilder::default();
        // "maybe" keeps the segment eligible, but the word right after
        // the '?' is not a marker, so only the (failing) arbiter could
        // split this
        let mut words = sentence("why is it failing now again?", 10.0, 0);
        words.extend(sentence("hmm the cache maybe", 13.0, 0));
        let qa = Segment::from_words(0, words);
        let before = qa.clone();

        let segments = vec![qa, seg_from("sure", 20.0, 1)];
        let arbiter = ScriptedArbiter { split: None, speaker: None, fail: true };

        let out = builder.split_questions(segments, Some(0), &arbiter).await;
        assert_eq!(out[0], before);
    }

    #[test]
    fn test_backchannel_between_main_turns() {
        let builder = SegmentBuilder::default();
        let segments = vec![
            seg_from("so the deploy went out this morning", 0.0, 0),
            seg_from("uh-huh", 3.5, 0),
            seg_from("and nothing has paged since then", 5.0, 0),
            seg_from("that is great news for everyone involved", 9.0, 1),
        ];

        let out = builder.reassign_backchannels(segments, 0);
        assert_eq!(out[1].speaker, 1);
        assert!(out[1].words.iter().all(|w| w.speaker == 1));
        assert_eq!(out[0].speaker, 0);
        assert_eq!(out[2].speaker, 0);
    }

    #[tokio::test]
    async fn test_negation_alternation_fallback() {
        let builder = SegmentBuilder::default();
        // main asks, other answers, negation corrects: alternation ends
        // on "other", so the negation goes to main
        let segments = vec![
            seg_from("how many servers does it run on?", 0.0, 0),
            seg_from("it is on five servers", 3.0, 1),
            seg_from("no, only three", 5.0, 1),
        ];

        let out = builder.resolve_negations(segments, 0, &NoOpinionArbiter).await;
        assert_eq!(out[2].speaker, 0);
    }

    #[tokio::test]
    async fn test_negation_arbiter_verdict_wins() {
        let builder = SegmentBuilder::default();
        let segments = vec![
            seg_from("how many servers does it run on?", 0.0, 0),
            seg_from("it is on five servers", 3.0, 1),
            seg_from("no, only three", 5.0, 1),
        ];
        let arbiter = ScriptedArbiter { split: None, speaker: Some(1), fail: false };

        let out = builder.resolve_negations(segments, 0, &arbiter).await;
        assert_eq!(out[2].speaker, 1);
    }

    #[tokio::test]
    async fn test_post_short_reply_question_low_confidence() {
        let builder = SegmentBuilder::default();
        // "yeah" and the follow-up question carry the same label; that is
        // the low-confidence shape, and with no arbiter opinion the
        // question goes to main
        let segments = vec![
            seg_from("the new build is ready for review", 0.0, 0),
            Segment::from_words(1, vec![rw("yeah", 4.0, 4.5, 1)]),
            seg_from("can you open the dashboard", 5.0, 1),
        ];

        let out = builder
            .resolve_post_reply_questions(segments, 0, &NoOpinionArbiter)
            .await;
        assert_eq!(out[2].speaker, 0);
    }

    #[tokio::test]
    async fn test_full_build_orders_and_merges() {
        let builder = SegmentBuilder::default();
        let mut words = sentence("we pushed the release out yesterday evening", 0.0, 0);
        words.extend(sentence("nice work", 4.5, 1));
        words.extend(sentence("thanks for the help with the rollout", 6.5, 0));

        let out = builder.build(words.clone(), &NoOpinionArbiter).await;

        assert!(!out.is_empty());
        for pair in out.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
        for seg in &out {
            assert!(seg.start < seg.end);
            assert_eq!(seg.text, join_words(&seg.words));
        }
        let total: usize = out.iter().map(|s| s.word_count()).sum();
        assert_eq!(total, words.len());
    }

    #[tokio::test]
    async fn test_build_empty_words() {
        let builder = SegmentBuilder::default();
        let out = builder.build(Vec::new(), &NoOpinionArbiter).await;
        assert!(out.is_empty());
    }
}
