//! Speaker clustering over windowed embeddings
//!
//! Groups embeddings into speakers, auto-selecting the speaker count with
//! silhouette scoring, and emits per-speaker time segments with
//! cross-speaker overlaps arbitrated away. Failures never propagate: the
//! clusterer logs and returns an empty list, which downstream stages read
//! as "diarization unavailable".

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DiarizationError;
use crate::extractor::Embedding;
use crate::spectral::{agglomerative_ward, silhouette_score, spectral_cluster};
use crate::{cosine_distance, l2_normalize};
use voxalign_core::DiarizationSegment;

/// Clustering configuration.
///
/// The share/distance thresholds are empirically chosen and intentionally
/// tunable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClustererConfig {
    /// Mean pairwise distance below which the recording is treated as
    /// single-speaker, overriding any silhouette winner
    pub single_speaker_distance: f64,
    /// Similarity scale used when distances are nearly uniform
    pub similarity_fallback_scale: f64,
    /// Upper bound of the speaker-count search
    pub max_auto_speakers: usize,
    /// Post-hoc collapse: share the dominant cluster must exceed
    pub collapse_dominant_share: f64,
    /// Post-hoc collapse: share the runner-up must stay under
    pub collapse_minor_share: f64,
    /// Post-hoc collapse: mean distance must exceed this (high intra-speaker
    /// variability rather than genuinely distinct voices)
    pub collapse_min_mean_distance: f64,
    /// Overlap fraction above which a fragment is discarded during
    /// cross-speaker overlap resolution
    pub overlap_discard_ratio: f64,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            single_speaker_distance: 0.18,
            similarity_fallback_scale: 0.5,
            max_auto_speakers: 5,
            collapse_dominant_share: 0.90,
            collapse_minor_share: 0.15,
            collapse_min_mean_distance: 0.40,
            overlap_discard_ratio: 0.50,
        }
    }
}

/// Groups embeddings into per-speaker time segments
pub struct DiarizationClusterer {
    config: ClustererConfig,
}

impl DiarizationClusterer {
    pub fn new(config: ClustererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClustererConfig {
        &self.config
    }

    /// Cluster embeddings into speakers and emit time segments.
    ///
    /// `expected_speakers` skips the speaker-count search but never the
    /// single-speaker distance override. Errors are absorbed here: the
    /// result is empty when clustering is impossible, which downstream
    /// stages read as "diarization unavailable".
    pub fn cluster(
        &self,
        embeddings: &[Embedding],
        expected_speakers: Option<usize>,
    ) -> Vec<DiarizationSegment> {
        match self.try_cluster(embeddings, expected_speakers) {
            Ok(segments) => segments,
            Err(e) => {
                warn!(error = %e, "diarization unavailable");
                Vec::new()
            }
        }
    }

    fn try_cluster(
        &self,
        embeddings: &[Embedding],
        expected_speakers: Option<usize>,
    ) -> Result<Vec<DiarizationSegment>, DiarizationError> {
        let n = embeddings.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        if n == 1 {
            return Ok(vec![DiarizationSegment::new(0, embeddings[0].start, embeddings[0].end)]);
        }

        let dim = embeddings[0].vector.len();
        if dim == 0 || embeddings.iter().any(|e| e.vector.len() != dim) {
            return Err(DiarizationError::InvalidInput(
                "inconsistent embedding dimensions".to_string(),
            ));
        }
        if embeddings.iter().any(|e| e.vector.iter().any(|v| !v.is_finite())) {
            return Err(DiarizationError::EmbeddingFailed(
                "non-finite embedding values".to_string(),
            ));
        }

        let mut vectors: Vec<Vec<f32>> = embeddings.iter().map(|e| e.vector.clone()).collect();
        for v in &mut vectors {
            l2_normalize(v);
        }

        let (distances, mean_distance) = distance_matrix(&vectors);

        let labels = if mean_distance < self.config.single_speaker_distance {
            // Distance beats silhouette: uniform voices mean one speaker
            // no matter what k was requested
            info!(mean_distance, "pairwise distances uniform, single speaker");
            vec![0usize; n]
        } else {
            let labels = self.label_windows(&vectors, &distances, mean_distance, expected_speakers);
            self.maybe_collapse(labels, mean_distance, n)
        };

        let labels = canonicalize(&labels);
        let segments = merge_runs(embeddings, &labels);
        let segments = resolve_overlaps(segments, self.config.overlap_discard_ratio);

        info!(
            speakers = segments.iter().map(|s| s.speaker).max().map(|m| m + 1).unwrap_or(0),
            segments = segments.len(),
            "diarization complete"
        );
        Ok(segments)
    }

    /// Run the speaker-count search (or honor the requested count) and
    /// produce window labels
    fn label_windows(
        &self,
        vectors: &[Vec<f32>],
        distances: &Array2<f64>,
        mean_distance: f64,
        expected_speakers: Option<usize>,
    ) -> Vec<usize> {
        let n = vectors.len();
        let scale = if mean_distance > 1e-6 {
            mean_distance
        } else {
            self.config.similarity_fallback_scale
        };

        let mut similarity = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                similarity[[i, j]] = (-distances[[i, j]] / scale).exp();
            }
        }

        let candidates: Vec<usize> = match expected_speakers {
            Some(k) => vec![k.clamp(1, n)],
            None => {
                let upper = self.config.max_auto_speakers.min((n / 3).max(2)).min(n);
                (2..=upper.max(2).min(n)).collect()
            }
        };

        let mut best: Option<(f64, Vec<usize>)> = None;
        for &k in &candidates {
            if k == 1 {
                return vec![0; n];
            }
            let labels = self.cluster_once(&similarity, vectors, k);
            let score = silhouette_score(distances, &labels);
            debug!(k, score, "speaker-count candidate scored");
            if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, labels));
            }
        }

        best.map(|(_, l)| l).unwrap_or_else(|| vec![0; n])
    }

    /// Spectral attempt with agglomerative second attempt on failure or
    /// label collapse
    fn cluster_once(&self, similarity: &Array2<f64>, vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
        if let Some(labels) = spectral_cluster(similarity, k) {
            let distinct = distinct_count(&labels);
            if distinct == k || k == 1 {
                return labels;
            }
            debug!(k, distinct, "spectral clustering collapsed, trying agglomerative");
        } else {
            warn!(k, "spectral clustering failed, trying agglomerative");
        }
        agglomerative_ward(vectors, k)
    }

    /// Collapse to one speaker when one cluster dominates and the
    /// distances say "one variable voice" rather than "several voices"
    fn maybe_collapse(&self, labels: Vec<usize>, mean_distance: f64, n: usize) -> Vec<usize> {
        let distinct = distinct_count(&labels);
        if distinct < 2 {
            return labels;
        }

        let mut ids = labels.clone();
        ids.sort_unstable();
        ids.dedup();
        let mut counts: Vec<usize> = ids
            .iter()
            .map(|&id| labels.iter().filter(|&&l| l == id).count())
            .collect();
        counts.sort_unstable_by(|a, b| b.cmp(a));

        let dominant = counts[0] as f64 / n as f64;
        let minor = counts[1] as f64 / n as f64;

        if dominant > self.config.collapse_dominant_share
            && minor < self.config.collapse_minor_share
            && mean_distance > self.config.collapse_min_mean_distance
        {
            info!(dominant, minor, mean_distance, "collapsing to single speaker");
            return vec![0; labels.len()];
        }
        labels
    }
}

impl Default for DiarizationClusterer {
    fn default() -> Self {
        Self::new(ClustererConfig::default())
    }
}

/// Pairwise cosine-distance matrix and the mean off-diagonal distance
fn distance_matrix(vectors: &[Vec<f32>]) -> (Array2<f64>, f64) {
    let n = vectors.len();
    let mut distances = Array2::<f64>::zeros((n, n));
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&vectors[i], &vectors[j]);
            distances[[i, j]] = d;
            distances[[j, i]] = d;
            sum += d;
            pairs += 1;
        }
    }
    let mean = if pairs > 0 { sum / pairs as f64 } else { 0.0 };
    (distances, mean)
}

fn distinct_count(labels: &[usize]) -> usize {
    let mut seen = labels.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Relabel so speakers appear in order of first appearance (0, 1, ...)
fn canonicalize(labels: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    labels
        .iter()
        .map(|&l| {
            if let Some(&(_, to)) = mapping.iter().find(|(from, _)| *from == l) {
                to
            } else {
                let to = mapping.len();
                mapping.push((l, to));
                to
            }
        })
        .collect()
}

/// Merge consecutive same-label windows into one segment per run
fn merge_runs(embeddings: &[Embedding], labels: &[usize]) -> Vec<DiarizationSegment> {
    let mut segments: Vec<DiarizationSegment> = Vec::new();
    for (embedding, &label) in embeddings.iter().zip(labels.iter()) {
        match segments.last_mut() {
            Some(last) if last.speaker as usize == label => {
                last.end = last.end.max(embedding.end);
            }
            _ => segments.push(DiarizationSegment::new(
                label as u32,
                embedding.start,
                embedding.end,
            )),
        }
    }
    segments
}

/// Arbitrate temporal overlaps between different speakers.
///
/// Each segment is broken at the boundaries of its overlaps with other
/// speakers' segments; fragments whose overlap with another speaker
/// exceeds `discard_ratio` of their own length are dropped rather than
/// duplicated. Surviving same-speaker fragments that touch are rejoined.
pub fn resolve_overlaps(
    mut segments: Vec<DiarizationSegment>,
    discard_ratio: f64,
) -> Vec<DiarizationSegment> {
    const EPS: f64 = 1e-6;

    segments.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    let originals = segments.clone();

    let mut fragments: Vec<DiarizationSegment> = Vec::new();
    for seg in &segments {
        let mut points = vec![seg.start, seg.end];
        for other in &originals {
            if other.speaker == seg.speaker {
                continue;
            }
            let lo = seg.start.max(other.start);
            let hi = seg.end.min(other.end);
            if hi - lo > EPS {
                points.push(lo);
                points.push(hi);
            }
        }
        points.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        points.dedup_by(|a, b| (*a - *b).abs() < EPS);

        for pair in points.windows(2) {
            if pair[1] - pair[0] > EPS {
                fragments.push(DiarizationSegment::new(seg.speaker, pair[0], pair[1]));
            }
        }
    }

    // Arbitration: the largest single-segment overlap decides
    fragments.retain(|frag| {
        let len = frag.duration();
        let worst = originals
            .iter()
            .filter(|o| o.speaker != frag.speaker)
            .map(|o| o.overlap_with(frag.start, frag.end))
            .fold(0.0f64, f64::max);
        worst / len <= discard_ratio + EPS
    });

    fragments.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.speaker.cmp(&b.speaker))
    });

    // Rejoin touching same-speaker fragments
    let mut merged: Vec<DiarizationSegment> = Vec::new();
    for frag in fragments {
        match merged.last_mut() {
            Some(last) if last.speaker == frag.speaker && frag.start <= last.end + EPS => {
                last.end = last.end.max(frag.end);
            }
            _ => merged.push(frag),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(vector: Vec<f32>, start: f64) -> Embedding {
        Embedding { vector, start, end: start + 2.0 }
    }

    /// Two well-separated voices, windows at 1s stride
    fn two_speaker_embeddings() -> Vec<Embedding> {
        let mut out = Vec::new();
        for i in 0..6 {
            out.push(embedding(vec![1.0, 0.02 * i as f32, 0.0], i as f64));
        }
        for i in 6..12 {
            out.push(embedding(vec![0.0, 0.02 * i as f32, 1.0], i as f64));
        }
        out
    }

    #[test]
    fn test_empty_input() {
        let clusterer = DiarizationClusterer::default();
        assert!(clusterer.cluster(&[], None).is_empty());
    }

    #[test]
    fn test_single_embedding() {
        let clusterer = DiarizationClusterer::default();
        let segments = clusterer.cluster(&[embedding(vec![1.0, 0.0], 0.0)], None);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].speaker, 0);
    }

    #[test]
    fn test_identical_embeddings_single_speaker() {
        let clusterer = DiarizationClusterer::default();
        let embeddings: Vec<Embedding> =
            (0..10).map(|i| embedding(vec![0.5, 0.5, 0.5], i as f64)).collect();

        // Near-zero pairwise distance wins even against a requested k
        let segments = clusterer.cluster(&embeddings, Some(3));
        assert!(!segments.is_empty());
        assert!(segments.iter().all(|s| s.speaker == 0));
    }

    #[test]
    fn test_two_speakers_detected() {
        let clusterer = DiarizationClusterer::default();
        let segments = clusterer.cluster(&two_speaker_embeddings(), None);

        let speakers: std::collections::HashSet<u32> =
            segments.iter().map(|s| s.speaker).collect();
        assert_eq!(speakers.len(), 2);

        // Sorted by start
        for pair in segments.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let clusterer = DiarizationClusterer::default();
        let embeddings = two_speaker_embeddings();
        let a = clusterer.cluster(&embeddings, None);
        let b = clusterer.cluster(&embeddings, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_cross_speaker_duplicate_coverage() {
        let clusterer = DiarizationClusterer::default();
        let segments = clusterer.cluster(&two_speaker_embeddings(), None);

        for (i, a) in segments.iter().enumerate() {
            for b in segments.iter().skip(i + 1) {
                if a.speaker == b.speaker {
                    continue;
                }
                let overlap = a.overlap_with(b.start, b.end);
                let limit = 0.5 * a.duration().min(b.duration());
                assert!(
                    overlap <= limit + 1e-6,
                    "speakers {} and {} share {overlap}s",
                    a.speaker,
                    b.speaker
                );
            }
        }
    }

    #[test]
    fn test_mismatched_dimensions_unavailable() {
        let clusterer = DiarizationClusterer::default();
        let embeddings = vec![
            embedding(vec![1.0, 0.0], 0.0),
            embedding(vec![1.0, 0.0, 0.0], 1.0),
        ];
        assert!(clusterer.cluster(&embeddings, None).is_empty());
    }

    #[test]
    fn test_non_finite_embeddings_unavailable() {
        let clusterer = DiarizationClusterer::default();
        let embeddings = vec![
            embedding(vec![1.0, 0.0], 0.0),
            embedding(vec![f32::NAN, 0.0], 1.0),
        ];
        assert!(clusterer.cluster(&embeddings, None).is_empty());
    }

    #[test]
    fn test_resolve_overlaps_drops_contested_region() {
        let segments = vec![
            DiarizationSegment::new(0, 0.0, 10.0),
            DiarizationSegment::new(1, 8.0, 12.0),
        ];
        let resolved = resolve_overlaps(segments, 0.5);

        // The contested [8, 10] region belongs to at most one speaker now
        for (i, a) in resolved.iter().enumerate() {
            for b in resolved.iter().skip(i + 1) {
                if a.speaker != b.speaker {
                    assert!(a.overlap_with(b.start, b.end) < 1e-6);
                }
            }
        }
        assert!(resolved.iter().any(|s| s.speaker == 0 && (s.end - 8.0).abs() < 1e-6));
        assert!(resolved.iter().any(|s| s.speaker == 1 && (s.start - 10.0).abs() < 1e-6));
    }

    #[test]
    fn test_resolve_overlaps_keeps_disjoint() {
        let segments = vec![
            DiarizationSegment::new(0, 0.0, 5.0),
            DiarizationSegment::new(1, 5.0, 9.0),
        ];
        let resolved = resolve_overlaps(segments.clone(), 0.5);
        assert_eq!(resolved, segments);
    }

    #[test]
    fn test_canonicalize_orders_by_first_appearance() {
        assert_eq!(canonicalize(&[2, 2, 0, 1, 0]), vec![0, 0, 1, 2, 1]);
    }
}
