//! Sliding-window embedding extraction
//!
//! The embedding model itself is an opaque collaborator; this module owns
//! the windowing and degrades to partial results when individual windows
//! fail.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use voxalign_core::AudioData;

/// One embedded audio window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// Feature vector from the embedding model
    pub vector: Vec<f32>,
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds
    pub end: f64,
}

/// Embedding model collaborator contract
///
/// One call per window; the result is an opaque fixed-length vector.
#[trait_variant::make(EmbeddingModel: Send)]
pub trait LocalEmbeddingModel {
    /// Embed one mono audio window
    async fn embed(&self, samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<f32>>;
}

/// Windowing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Window duration in seconds
    pub window_secs: f64,
    /// Overlap fraction between consecutive windows (0.0 - <1.0)
    pub overlap: f64,
    /// Below this total duration, extraction is skipped entirely
    pub min_duration_secs: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_secs: 2.0,
            overlap: 0.5,
            min_duration_secs: 0.5,
        }
    }
}

impl ExtractorConfig {
    /// Window stride in seconds
    pub fn stride_secs(&self) -> f64 {
        self.window_secs * (1.0 - self.overlap.clamp(0.0, 0.95))
    }
}

/// Slides a fixed window over the audio and embeds each window
pub struct EmbeddingExtractor {
    config: ExtractorConfig,
}

impl EmbeddingExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Produce one embedding per window, in time order.
    ///
    /// Audio shorter than one window is embedded as a single whole-clip
    /// window; audio below the minimum floor yields an empty result.
    /// Failures on individual windows are logged and skipped, so the
    /// output may have gaps.
    pub async fn extract<M: EmbeddingModel + Sync>(
        &self,
        model: &M,
        audio: &AudioData,
    ) -> Vec<Embedding> {
        let duration = audio.duration();

        if duration < self.config.min_duration_secs {
            debug!(duration, "audio below extraction floor, skipping");
            return Vec::new();
        }

        let mut embeddings = Vec::new();

        if duration < self.config.window_secs {
            // Whole clip as one window
            match model.embed(&audio.samples, audio.sample_rate).await {
                Ok(vector) => embeddings.push(Embedding {
                    vector,
                    start: 0.0,
                    end: duration,
                }),
                Err(e) => warn!(error = %e, "embedding failed for whole-clip window"),
            }
            return embeddings;
        }

        let stride = self.config.stride_secs();
        let mut start = 0.0f64;

        while start + self.config.window_secs <= duration + 1e-9 {
            let end = start + self.config.window_secs;
            let lo = audio.time_to_sample(start).min(audio.samples.len());
            let hi = audio.time_to_sample(end).min(audio.samples.len());

            match model.embed(&audio.samples[lo..hi], audio.sample_rate).await {
                Ok(vector) => embeddings.push(Embedding { vector, start, end }),
                Err(e) => warn!(start, end, error = %e, "embedding failed for window, skipping"),
            }

            start += stride;
        }

        debug!(count = embeddings.len(), "embedding extraction complete");
        embeddings
    }
}

impl Default for EmbeddingExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}
