//! Audio loading for the attribution pipeline
//!
//! The pipeline operates on mono f32 samples at a fixed rate. Only WAV
//! input is handled here; other containers are an upstream concern and
//! fail fast at submission time.

use std::path::Path;

use hound::WavReader;
use thiserror::Error;

use crate::AudioInfo;

/// Audio loading errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),

    #[error("Resample error: {0}")]
    Resample(String),
}

/// Mono audio samples
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Sample data (mono, f32)
    pub samples: Vec<f32>,
    /// Sample rate
    pub sample_rate: u32,
}

impl AudioData {
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Sample index for a time point
    pub fn time_to_sample(&self, time_sec: f64) -> usize {
        (time_sec * self.sample_rate as f64) as usize
    }
}

/// Loads WAV files as mono f32 at a fixed target rate
pub struct AudioProcessor {
    target_sample_rate: u32,
}

impl AudioProcessor {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Probe a WAV file without decoding samples.
    ///
    /// Used for fail-fast validation at job submission.
    pub fn probe<P: AsRef<Path>>(&self, path: P) -> Result<AudioInfo, AudioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AudioError::FileNotFound(path.display().to_string()));
        }
        Self::require_wav(path)?;

        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let duration = reader.duration() as f64 / spec.sample_rate as f64;

        Ok(AudioInfo {
            path: path.display().to_string(),
            duration,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        })
    }

    /// Load a WAV file, downmix to mono, and resample to the target rate
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<AudioData, AudioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AudioError::FileNotFound(path.display().to_string()));
        }
        Self::require_wav(path)?;

        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        };

        let mono = downmix(&samples, spec.channels);

        let final_samples = if spec.sample_rate != self.target_sample_rate {
            self.resample(&mono, spec.sample_rate, self.target_sample_rate)?
        } else {
            mono
        };

        Ok(AudioData {
            samples: final_samples,
            sample_rate: self.target_sample_rate,
        })
    }

    fn require_wav(path: &Path) -> Result<(), AudioError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("wav") => Ok(()),
            Some(ext) => Err(AudioError::UnsupportedFormat(ext.to_string())),
            None => Err(AudioError::UnsupportedFormat("unknown".to_string())),
        }
    }

    fn resample(
        &self,
        samples: &[f32],
        from_rate: u32,
        to_rate: u32,
    ) -> Result<Vec<f32>, AudioError> {
        use rubato::{FftFixedInOut, Resampler};

        let ratio = to_rate as f64 / from_rate as f64;
        let chunk_size = 1024;

        let mut resampler =
            FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 1)
                .map_err(|e| AudioError::Resample(e.to_string()))?;

        let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize);

        for chunk in samples.chunks(chunk_size) {
            if chunk.len() == chunk_size {
                let input = vec![chunk.to_vec()];
                let result = resampler
                    .process(&input, None)
                    .map_err(|e| AudioError::Resample(e.to_string()))?;
                output.extend_from_slice(&result[0]);
            }
        }

        // Pad and process the tail chunk
        let remaining = samples.len() % chunk_size;
        if remaining > 0 {
            let mut padded = samples[samples.len() - remaining..].to_vec();
            padded.resize(chunk_size, 0.0);
            let input = vec![padded];
            let result = resampler
                .process(&input, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            let output_remaining = (remaining as f64 * ratio) as usize;
            output.extend_from_slice(&result[0][..output_remaining.min(result[0].len())]);
        }

        Ok(output)
    }
}

impl Default for AudioProcessor {
    fn default() -> Self {
        Self::new(16000)
    }
}

fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 | 1 => samples.to_vec(),
        n => samples
            .chunks(n as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_test_wav(path: &Path, sample_rate: u32, channels: u16, secs: f64) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let n = (sample_rate as f64 * secs) as usize * channels as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let sample = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_probe_reports_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 16000, 1, 2.0);

        let info = AudioProcessor::default().probe(&path).unwrap();
        assert_eq!(info.sample_rate, 16000);
        assert_eq!(info.channels, 1);
        assert!((info.duration - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_load_downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_test_wav(&path, 16000, 2, 1.0);

        let audio = AudioProcessor::default().load(&path).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert!((audio.duration() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"not audio").unwrap();

        let err = AudioProcessor::default().probe(&path).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AudioProcessor::default().load("/nonexistent/x.wav").unwrap_err();
        assert!(matches!(err, AudioError::FileNotFound(_)));
    }
}
