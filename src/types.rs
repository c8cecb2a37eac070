use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};

/// Decoded audio as it comes out of the container, interleaved.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Mono analysis signal fed through the separation pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SplitError::InvalidInput("sample rate must be positive".into()));
        }
        if let Some(i) = samples.iter().position(|s| !s.is_finite()) {
            return Err(SplitError::InvalidInput(format!(
                "non-finite sample at index {i}"
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Signal level of each stream before peak normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyReport {
    pub vocal_rms: f32,
    pub instrumental_rms: f32,
}

impl EnergyReport {
    /// Share of the total RMS carried by the vocal stream, in `[0, 1]`.
    pub fn vocal_share(&self) -> f32 {
        let total = self.vocal_rms + self.instrumental_rms;
        if total <= 0.0 {
            0.0
        } else {
            self.vocal_rms / total
        }
    }
}

#[derive(Clone, Debug)]
pub struct StemPair {
    pub vocals: Waveform,
    pub instrumental: Waveform,
    pub report: EnergyReport,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitOptions {
    pub output_dir: String,
    /// Resample the decoded input to this rate before analysis.
    pub target_sample_rate: Option<u32>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            output_dir: ".".into(),
            target_sample_rate: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SplitResult {
    pub vocals_path: String,
    pub instrumental_path: String,
    pub sample_rate: u32,
    pub report: EnergyReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub filename: String,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sources {
    pub vocals: SourceFile,
    pub instrumental: SourceFile,
}

/// Outcome of one upload, serialized as the `/api/separate` response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparationResult {
    pub id: String,
    pub sources: Sources,
    #[serde(rename = "originalName")]
    pub original_name: String,
}
