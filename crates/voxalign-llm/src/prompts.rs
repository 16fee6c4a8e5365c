//! Prompt templates for speaker arbitration

use voxalign_core::Segment;

/// Render surrounding conversation turns for context
fn render_context(context: &[Segment]) -> String {
    context
        .iter()
        .map(|s| format!("[{:.1}s-{:.1}s] Speaker {}: {}", s.start, s.end, s.speaker, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the question/answer split prompt
pub fn build_split_prompt(segment: &Segment, context: &[Segment]) -> String {
    format!(
        r#"You are analyzing a diarized conversation transcript. One segment may
incorrectly contain both a question from one speaker and the answer from
another, because the diarizer merged them.

## Conversation context
{context}

## Segment under review
Speaker {speaker} [{start:.1}s-{end:.1}s]: {text}

## Task
Decide whether this segment actually contains two speakers (typically a
question immediately followed by its answer). If it does, split the text
into parts and assign each part a speaker id from the conversation.

## Output Format
Return ONLY a JSON object:
```json
{{
  "should_split": true,
  "parts": [
    {{"text": "question text?", "speaker": 1}},
    {{"text": "the answer", "speaker": 0}}
  ]
}}
```

If the segment is a single speaker, return:
```json
{{"should_split": false, "parts": []}}
```"#,
        context = render_context(context),
        speaker = segment.speaker,
        start = segment.start,
        end = segment.end,
        text = segment.text,
    )
}

/// Build the contested-speaker prompt
pub fn build_resolve_prompt(
    prev: &Segment,
    current: &Segment,
    gap_secs: f64,
    context: &[Segment],
) -> String {
    format!(
        r#"You are analyzing a diarized conversation transcript. The speaker label
of one segment is contested; decide who actually said it.

## Conversation context
{context}

## Previous segment
Speaker {prev_speaker}: {prev_text}

## Contested segment ({gap:.1}s after the previous one)
Currently labeled Speaker {cur_speaker}: {cur_text}

## Task
Based on conversational flow (questions get answered by the other party,
corrections follow questions, backchannel replies interleave), decide
which speaker id said the contested segment.

## Output Format
Return ONLY a JSON object. Use null if you cannot tell:
```json
{{"speaker": 1}}
```"#,
        context = render_context(context),
        prev_speaker = prev.speaker,
        prev_text = prev.text,
        gap = gap_secs,
        cur_speaker = current.speaker,
        cur_text = current.text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(speaker: u32, text: &str) -> Segment {
        Segment {
            speaker,
            start: 0.0,
            end: 2.0,
            text: text.to_string(),
            words: vec![],
        }
    }

    #[test]
    fn test_split_prompt_contains_segment() {
        let prompt = build_split_prompt(&segment(1, "how are you? fine thanks"), &[]);
        assert!(prompt.contains("how are you? fine thanks"));
        assert!(prompt.contains("should_split"));
    }

    #[test]
    fn test_resolve_prompt_contains_both_turns() {
        let prompt =
            build_resolve_prompt(&segment(0, "did you run it?"), &segment(1, "no, wait"), 0.8, &[]);
        assert!(prompt.contains("did you run it?"));
        assert!(prompt.contains("no, wait"));
        assert!(prompt.contains("0.8s after"));
    }
}
