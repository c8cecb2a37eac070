use ndarray::{Array1, Array2, Axis, Zip};
use num_complex::Complex32;
use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    core::dsp::{frequency_of_bin, num_bins, Spectrogram},
    error::{Result, SplitError},
};

/// Per-bin gains in {0.0, 1.0}, constant across frames.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyMask {
    pub weights: Array1<f32>,
    pub n_fft: usize,
    pub sample_rate: u32,
}

impl FrequencyMask {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Number of bins inside the pass-band.
    pub fn pass_bins(&self) -> usize {
        self.weights.iter().filter(|&&w| w == 1.0).count()
    }

    pub fn complement(&self) -> FrequencyMask {
        FrequencyMask {
            weights: self.weights.mapv(|w| 1.0 - w),
            n_fft: self.n_fft,
            sample_rate: self.sample_rate,
        }
    }
}

/// Binary pass-band mask over bins `0..=n_fft/2`, inclusive on both edges.
pub fn build_mask(n_fft: usize, sample_rate: u32, freq_min: f32, freq_max: f32) -> FrequencyMask {
    let (lo, hi) = (freq_min as f64, freq_max as f64);
    let weights = Array1::from_iter((0..num_bins(n_fft)).map(|b| {
        let f = frequency_of_bin(b, n_fft, sample_rate);
        if lo <= f && f <= hi {
            1.0
        } else {
            0.0
        }
    }));

    FrequencyMask {
        weights,
        n_fft,
        sample_rate,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MaskKey {
    n_fft: usize,
    sample_rate: u32,
    freq_min_bits: u32,
    freq_max_bits: u32,
}

/// Populate-once map of masks keyed by `(n_fft, sample_rate, freq_min, freq_max)`.
#[derive(Default)]
pub struct MaskCache {
    masks: RwLock<HashMap<MaskKey, Arc<FrequencyMask>>>,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        n_fft: usize,
        sample_rate: u32,
        freq_min: f32,
        freq_max: f32,
    ) -> Arc<FrequencyMask> {
        let key = MaskKey {
            n_fft,
            sample_rate,
            freq_min_bits: freq_min.to_bits(),
            freq_max_bits: freq_max.to_bits(),
        };

        if let Some(mask) = self
            .masks
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&key)
        {
            return mask.clone();
        }

        let mut masks = self.masks.write().unwrap_or_else(|p| p.into_inner());
        masks
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(n_fft, sample_rate, freq_min, freq_max, "building band mask");
                Arc::new(build_mask(n_fft, sample_rate, freq_min, freq_max))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.masks.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static MASK_CACHE: Lazy<MaskCache> = Lazy::new(MaskCache::new);

/// Process-wide cached variant of [`build_mask`].
pub fn cached_mask(
    n_fft: usize,
    sample_rate: u32,
    freq_min: f32,
    freq_max: f32,
) -> Arc<FrequencyMask> {
    MASK_CACHE.get(n_fft, sample_rate, freq_min, freq_max)
}

/// Polar decomposition of a spectrogram.
#[derive(Clone, Debug)]
pub struct MagPhase {
    pub magnitude: Array2<f32>,
    pub phase: Array2<f32>,
}

impl MagPhase {
    pub fn from_spectrogram(spec: &Spectrogram) -> Self {
        Self {
            magnitude: spec.data.mapv(|c| c.norm()),
            phase: spec.data.mapv(|c| c.arg()),
        }
    }

    /// Magnitude with row `b` scaled by `mask[b]` in every frame.
    pub fn masked_magnitude(&self, mask: &FrequencyMask) -> Result<Array2<f32>> {
        if mask.len() != self.magnitude.nrows() {
            return Err(SplitError::InvalidConfig(format!(
                "mask has {} bins, spectrogram has {}",
                mask.len(),
                self.magnitude.nrows()
            )));
        }
        let mut out = self.magnitude.clone();
        for (mut row, &w) in out.axis_iter_mut(Axis(0)).zip(mask.weights.iter()) {
            row.mapv_inplace(|m| m * w);
        }
        Ok(out)
    }

    /// Rebuild complex values from `magnitude` and this phase.
    pub fn recombine(&self, magnitude: &Array2<f32>) -> Array2<Complex32> {
        Zip::from(magnitude)
            .and(&self.phase)
            .map_collect(|&m, &p| Complex32::from_polar(m, p))
    }
}

/// Applies `mask` to the magnitude and reuses the original phase.
pub fn apply_mask(spec: &Spectrogram, mask: &FrequencyMask) -> Result<Spectrogram> {
    apply_mask_with(&MagPhase::from_spectrogram(spec), spec, mask)
}

/// Same as [`apply_mask`] with an already decomposed spectrogram.
pub fn apply_mask_with(
    mp: &MagPhase,
    spec: &Spectrogram,
    mask: &FrequencyMask,
) -> Result<Spectrogram> {
    Ok(spec.with_data(mp.recombine(&mp.masked_magnitude(mask)?)))
}
