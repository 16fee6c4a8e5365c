//! Fusion engine configuration
//!
//! The thresholds below are empirically tuned on real conversations; none
//! of them is load-bearing for correctness, so all are exposed as plain
//! fields rather than constants.

use serde::{Deserialize, Serialize};

/// Tunables for word resolution and segment building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Diarization segments longer than this are "suspicious": likely to
    /// have absorbed another speaker's brief interjection
    pub suspicious_duration_secs: f64,
    /// Max gap for inheriting the previous word's speaker when segment
    /// overlap disagrees
    pub context_inherit_gap_secs: f64,
    /// A silence this long around a word counts as a large pause
    pub large_pause_secs: f64,
    /// Max center distance for preferring a nearby non-suspicious segment
    /// over a suspicious one
    pub nearby_distance_secs: f64,
    /// Center distance under which a candidate counts as tight
    pub tight_center_distance_secs: f64,
    /// Minimum overlap ratio for a candidate to matter
    pub min_overlap_ratio: f64,
    /// A competing segment must be this much closer to win against a
    /// suspicious candidate
    pub competing_distance_margin_secs: f64,
    /// A competing segment with this much more overlap beats a suspicious
    /// candidate
    pub competing_overlap_margin: f64,
    /// Without any overlap, the nearest segment wins only within this
    /// distance
    pub no_overlap_nearest_secs: f64,
    /// Without any overlap, inherit the previous word's speaker within
    /// this gap
    pub no_overlap_inherit_gap_secs: f64,
    /// Words starting earlier than this get the start-of-file treatment
    pub opening_window_secs: f64,
    /// A competing segment must begin within this long after an opening
    /// word
    pub opening_follow_secs: f64,
    /// A competing opening segment must be shorter than this
    pub opening_brief_segment_secs: f64,

    /// Smoothing pass cap (words and segments)
    pub smoothing_passes: usize,
    /// Bidirectional smoothing gap (both sides)
    pub smoothing_gap_secs: f64,
    /// Previous-only smoothing gap for isolated words
    pub forward_gap_secs: f64,
    /// Previous-only smoothing gap at sequence end
    pub tight_gap_secs: f64,

    /// Silence gap that starts a new segment
    pub segment_gap_secs: f64,
    /// Question/answer splitting applies above this word count
    pub qa_min_words: usize,
    /// Backchannel reassignment: max duration
    pub backchannel_max_secs: f64,
    /// Backchannel reassignment: max word count
    pub backchannel_max_words: usize,
    /// A turn shorter than this counts as a short reply
    pub short_turn_secs: f64,
    /// Max gap for the post-short-reply question pattern
    pub question_follow_gap_secs: f64,
    /// Confidence below which the arbiter is consulted
    pub arbiter_confidence_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            suspicious_duration_secs: 10.0,
            context_inherit_gap_secs: 0.4,
            large_pause_secs: 3.0,
            nearby_distance_secs: 1.8,
            tight_center_distance_secs: 0.5,
            min_overlap_ratio: 0.05,
            competing_distance_margin_secs: 0.5,
            competing_overlap_margin: 0.15,
            no_overlap_nearest_secs: 1.0,
            no_overlap_inherit_gap_secs: 0.3,
            opening_window_secs: 3.0,
            opening_follow_secs: 0.5,
            opening_brief_segment_secs: 1.0,

            smoothing_passes: 3,
            smoothing_gap_secs: 2.0,
            forward_gap_secs: 1.0,
            tight_gap_secs: 0.3,

            segment_gap_secs: 1.0,
            qa_min_words: 5,
            backchannel_max_secs: 2.0,
            backchannel_max_words: 3,
            short_turn_secs: 1.0,
            question_follow_gap_secs: 3.0,
            arbiter_confidence_threshold: 0.5,
        }
    }
}
