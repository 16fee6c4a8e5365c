//! Speaker diarization for voxalign
//!
//! This crate turns raw audio into non-overlapping per-speaker time
//! segments by:
//! 1. Sliding a fixed window over the audio and asking the (external)
//!    embedding model for one vector per window
//! 2. Clustering the windows into speakers, auto-selecting the speaker
//!    count when the caller does not supply one

pub mod clusterer;
pub mod error;
pub mod extractor;
pub mod spectral;

pub use clusterer::{ClustererConfig, DiarizationClusterer};
pub use error::DiarizationError;
pub use extractor::{Embedding, EmbeddingExtractor, EmbeddingModel, ExtractorConfig};

// Re-export types from voxalign-core
pub use voxalign_core::DiarizationSegment;

/// L2-normalize a vector in place
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine distance between two L2-normalized vectors
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same length");
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (1.0 - dot as f64).max(0.0)
}
