//! Transcription service: submission surface and per-job workers
//!
//! `submit` validates input fast, records a `Pending` job under the store
//! lock, then hands the heavy pipeline to a spawned worker task. Workers
//! run the stages strictly in order (extraction, clustering, ASR,
//! resolution, building, main-speaker selection) and report back through
//! the store only. Jobs are independent; nothing orders them across each
//! other.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::job::{Job, SpeakerAirtime, TranscriptOutcome};
use crate::store::JobStore;
use voxalign_asr::{AsrProvider, RetryPolicy, RetryingAsr, TranscriptionOptions};
use voxalign_core::audio::AudioProcessor;
use voxalign_diarization::{
    ClustererConfig, DiarizationClusterer, EmbeddingExtractor, EmbeddingModel, ExtractorConfig,
};
use voxalign_fusion::{select_main_speaker, FusionConfig, SegmentBuilder, WordSpeakerResolver};
use voxalign_llm::SpeakerArbiter;

/// Service configuration
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// Jobs older than this are swept regardless of status
    pub ttl: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
    /// Pipeline sample rate
    pub target_sample_rate: u32,
    /// ASR call-boundary retry policy
    pub retry: RetryPolicy,
    /// Embedding windowing
    pub extractor: ExtractorConfig,
    /// Speaker clustering
    pub clusterer: ClustererConfig,
    /// Fusion engine thresholds
    pub fusion: FusionConfig,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(3600),
            target_sample_rate: 16000,
            retry: RetryPolicy::default(),
            extractor: ExtractorConfig::default(),
            clusterer: ClustererConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

/// Per-submission options
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Language code for the recognizer; None lets it detect
    pub language: Option<String>,
    /// Known speaker count, skipping auto-selection
    pub expected_speakers: Option<usize>,
    /// Delete the input file once the job reaches a terminal state
    pub remove_input: bool,
}

/// Owns the job store and runs the pipeline on worker tasks
pub struct TranscriptionService<M, A, R> {
    store: Arc<JobStore>,
    model: Arc<M>,
    asr: RetryingAsr<A>,
    arbiter: Arc<R>,
    extractor: EmbeddingExtractor,
    resolver: WordSpeakerResolver,
    builder: SegmentBuilder,
    config: JobServiceConfig,
}

impl<M, A, R> TranscriptionService<M, A, R>
where
    M: EmbeddingModel + Send + Sync + 'static,
    A: AsrProvider + Send + Sync + 'static,
    R: SpeakerArbiter + Send + Sync + 'static,
{
    pub fn new(model: M, asr: A, arbiter: R, config: JobServiceConfig) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(JobStore::new()),
            model: Arc::new(model),
            asr: RetryingAsr::new(asr, config.retry.clone()),
            arbiter: Arc::new(arbiter),
            extractor: EmbeddingExtractor::new(config.extractor.clone()),
            resolver: WordSpeakerResolver::new(config.fusion.clone()),
            builder: SegmentBuilder::new(config.fusion.clone()),
            config,
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Submit an audio file for attribution.
    ///
    /// Bad input fails here and never enters the pipeline; a returned id
    /// means a `Pending` job exists and a worker owns it.
    pub fn submit(
        self: &Arc<Self>,
        audio_path: &str,
        options: SubmitOptions,
    ) -> Result<Uuid, JobError> {
        let info = AudioProcessor::new(self.config.target_sample_rate).probe(audio_path)?;
        info!(path = audio_path, duration = info.duration, "job submitted");

        let id = self.store.create();
        let service = Arc::clone(self);
        let path = audio_path.to_string();
        tokio::spawn(async move {
            service.run_job(id, path, options).await;
        });
        Ok(id)
    }

    /// Current snapshot of a job for pollers
    pub fn status(&self, id: Uuid) -> Result<Job, JobError> {
        self.store.snapshot(id).ok_or(JobError::NotFound(id))
    }

    /// Spawn the hourly sweeper that drops abandoned jobs
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.sweep_interval);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                let removed = service
                    .store
                    .sweep_expired(service.config.ttl, chrono::Utc::now());
                if removed > 0 {
                    info!(removed, "expired jobs swept");
                }
            }
        })
    }

    /// Worker entry point: one invocation owns one job
    async fn run_job(&self, id: Uuid, path: String, options: SubmitOptions) {
        self.store.mark_processing(id);

        match self.run_pipeline(id, &path, &options).await {
            Ok(outcome) => {
                info!(%id, segments = outcome.segments.len(), "job completed");
                self.store.complete(id, outcome);
            }
            Err(e) => {
                warn!(%id, error = %e, "job failed");
                self.store.fail(id, e.to_string());
            }
        }

        if options.remove_input {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(%id, error = %e, "could not remove input file");
            }
        }
    }

    /// The pipeline stages, strictly sequential within one job
    async fn run_pipeline(
        &self,
        id: Uuid,
        path: &str,
        options: &SubmitOptions,
    ) -> Result<TranscriptOutcome, JobError> {
        // Stage 1: audio loading (blocking IO + resample)
        let processor = AudioProcessor::new(self.config.target_sample_rate);
        let load_path = path.to_string();
        let audio = tokio::task::spawn_blocking(move || processor.load(&load_path))
            .await
            .map_err(|e| JobError::Worker(e.to_string()))??;
        let audio_duration = audio.duration();

        // Stage 2: embedding extraction (model calls; gaps tolerated)
        let embeddings = self.extractor.extract(&*self.model, &audio).await;

        // Stage 3: speaker clustering (CPU-bound)
        let clusterer = DiarizationClusterer::new(self.config.clusterer.clone());
        let expected = options.expected_speakers;
        let diarization = tokio::task::spawn_blocking(move || {
            clusterer.cluster(&embeddings, expected)
        })
        .await
        .map_err(|e| JobError::Worker(e.to_string()))?;

        // Stage 4: transcription, with transient failures surfaced to
        // pollers through the store
        let store = Arc::clone(&self.store);
        let asr_options = TranscriptionOptions {
            language: options.language.clone(),
            word_timestamps: true,
        };
        let transcript = self
            .asr
            .transcribe_with(path, asr_options, |e| {
                store.record_soft_error(id, e.to_string());
            })
            .await?;

        // Stage 5 + 6: fusion
        let resolved = self.resolver.resolve(&diarization, &transcript.words);
        let segments = self.builder.build(resolved, &*self.arbiter).await;

        // Stage 7: derived metadata
        let main_speaker = select_main_speaker(&segments);
        let speakers = airtime_totals(&segments);

        Ok(TranscriptOutcome {
            speaker_count: speakers.len(),
            segments,
            main_speaker,
            speakers,
            language: transcript.language,
            duration: transcript.duration.max(audio_duration),
        })
    }
}

/// Word-count and airtime totals per speaker, ordered by id
fn airtime_totals(segments: &[voxalign_core::Segment]) -> Vec<SpeakerAirtime> {
    let mut totals: Vec<SpeakerAirtime> = Vec::new();
    for segment in segments {
        match totals.iter_mut().find(|t| t.speaker == segment.speaker) {
            Some(t) => {
                t.words += segment.word_count();
                t.duration += segment.duration();
            }
            None => totals.push(SpeakerAirtime {
                speaker: segment.speaker,
                words: segment.word_count(),
                duration: segment.duration(),
            }),
        }
    }
    totals.sort_by_key(|t| t.speaker);
    totals
}
