use ndarray::Array2;
use num_complex::Complex32;
use once_cell::sync::Lazy;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    error::{Result, SplitError},
    types::Waveform,
};

struct FftCache {
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    hann_window: Vec<f32>,
}

static FFT_CACHES: Lazy<Mutex<HashMap<usize, Arc<FftCache>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn fft_cache(n_fft: usize) -> Arc<FftCache> {
    let mut caches = FFT_CACHES.lock().unwrap_or_else(|p| p.into_inner());
    caches
        .entry(n_fft)
        .or_insert_with(|| {
            let mut planner = FftPlanner::new();
            Arc::new(FftCache {
                fft_forward: planner.plan_fft_forward(n_fft),
                fft_inverse: planner.plan_fft_inverse(n_fft),
                hann_window: compute_hann(n_fft),
            })
        })
        .clone()
}

/// Periodic Hann window, so that windows at `n_fft / 4` hops sum to a constant.
fn compute_hann(n_fft: usize) -> Vec<f32> {
    if n_fft <= 1 {
        return vec![1.0];
    }
    let denom = n_fft as f32;
    (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

fn check_params(n_fft: usize, hop: usize) -> Result<()> {
    if n_fft == 0 || hop == 0 {
        return Err(SplitError::InvalidConfig(format!(
            "n_fft and hop must be positive (n_fft={n_fft}, hop={hop})"
        )));
    }
    if hop > n_fft {
        return Err(SplitError::InvalidConfig(format!(
            "hop {hop} exceeds n_fft {n_fft}"
        )));
    }
    Ok(())
}

/// Complex STFT grid of one mono signal, shaped `[bins, frames]`.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    pub data: Array2<Complex32>,
    pub n_fft: usize,
    pub hop: usize,
    pub sample_rate: u32,
    /// Length of the waveform this grid was computed from.
    pub signal_len: usize,
}

impl Spectrogram {
    pub fn bins(&self) -> usize {
        self.data.nrows()
    }

    pub fn frames(&self) -> usize {
        self.data.ncols()
    }

    /// Same layout and provenance, different values.
    pub fn with_data(&self, data: Array2<Complex32>) -> Self {
        debug_assert_eq!(data.dim(), self.data.dim());
        Self {
            data,
            n_fft: self.n_fft,
            hop: self.hop,
            sample_rate: self.sample_rate,
            signal_len: self.signal_len,
        }
    }
}

pub fn num_bins(n_fft: usize) -> usize {
    n_fft / 2 + 1
}

/// Frames produced by centered framing of `len` samples.
pub fn num_frames(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Center frequency in Hz of `bin` for a transform of size `n_fft`.
pub fn frequency_of_bin(bin: usize, n_fft: usize, sample_rate: u32) -> f64 {
    bin as f64 * sample_rate as f64 / n_fft as f64
}

/// Forward STFT with center padding and a Hann window.
/// Bins `0..=n_fft/2` are kept; frames = `1 + len / hop`.
pub fn forward(wave: &Waveform, n_fft: usize, hop: usize) -> Result<Spectrogram> {
    check_params(n_fft, hop)?;
    if wave.samples.is_empty() {
        return Err(SplitError::EmptyInput);
    }

    let t = wave.samples.len();
    let pad = n_fft / 2;
    let frames = num_frames(t, hop);
    let f_bins = num_bins(n_fft);

    let padded_len = ((frames - 1) * hop + n_fft).max(pad + t + pad);
    let mut sig = vec![0.0f32; padded_len];
    sig[pad..pad + t].copy_from_slice(&wave.samples);

    let cache = fft_cache(n_fft);
    let fft = &cache.fft_forward;
    let window = &cache.hann_window;

    let mut out = Array2::<Complex32>::zeros((f_bins, frames));
    let mut buf = vec![Complex32::zero(); n_fft];

    for fr in 0..frames {
        let start = fr * hop;
        let frame = &sig[start..start + n_fft];

        for (slot, (&x, &w)) in buf.iter_mut().zip(frame.iter().zip(window.iter())) {
            *slot = Complex32::new(x * w, 0.0);
        }

        fft.process(&mut buf);

        for fi in 0..f_bins {
            out[[fi, fr]] = buf[fi];
        }
    }

    Ok(Spectrogram {
        data: out,
        n_fft,
        hop,
        sample_rate: wave.sample_rate,
        signal_len: t,
    })
}

/// Inverse STFT by windowed overlap-add, normalized by the summed squared window.
/// The result has exactly `spec.signal_len` samples.
pub fn inverse(spec: &Spectrogram) -> Result<Waveform> {
    let n_fft = spec.n_fft;
    let hop = spec.hop;
    check_params(n_fft, hop)?;

    let f_bins = spec.bins();
    let frames = spec.frames();
    if f_bins != num_bins(n_fft) {
        return Err(SplitError::InvalidConfig(format!(
            "spectrogram has {f_bins} bins, expected {} for n_fft={n_fft}",
            num_bins(n_fft)
        )));
    }

    let cache = fft_cache(n_fft);
    let ifft = &cache.fft_inverse;
    let window = &cache.hann_window;

    let pad = n_fft / 2;
    let target_length = spec.signal_len;
    let padded_length = (frames.saturating_sub(1) * hop + n_fft).max(target_length + 2 * pad);

    let mut out = vec![0.0f32; padded_length];
    let mut window_sum = vec![0.0f32; padded_length];
    let mut buf = vec![Complex32::zero(); n_fft];

    let scale = 1.0 / (n_fft as f32);

    for fr in 0..frames {
        // Positive frequencies [0..f_bins]
        for fi in 0..f_bins {
            buf[fi] = spec.data[[fi, fr]];
        }

        // Negative frequencies (complex conjugate mirror)
        for fi in f_bins..n_fft {
            buf[fi] = buf[n_fft - fi].conj();
        }

        // DC and Nyquist are real
        buf[0].im = 0.0;
        if n_fft % 2 == 0 {
            buf[n_fft / 2].im = 0.0;
        }

        ifft.process(&mut buf);

        let start = fr * hop;
        for i in 0..n_fft {
            let pos = start + i;
            if pos < padded_length {
                let w = window[i];
                out[pos] += buf[i].re * w * scale;
                window_sum[pos] += w * w;
            }
        }
    }

    for (sample, &sum) in out.iter_mut().zip(window_sum.iter()) {
        if sum > 1e-10 {
            *sample /= sum;
        }
    }

    let end = (pad + target_length).min(out.len());
    let mut samples = out[pad.min(end)..end].to_vec();
    samples.resize(target_length, 0.0);

    Ok(Waveform {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Scales to unit peak; all-zero input is returned as-is.
/// Divides by the peak directly, since `1.0 / peak` overflows for subnormal peaks.
pub fn normalize(wave: &Waveform) -> Waveform {
    let peak = wave.peak();
    if peak == 0.0 {
        return wave.clone();
    }
    Waveform {
        samples: wave.samples.iter().map(|&s| s / peak).collect(),
        sample_rate: wave.sample_rate,
    }
}

/// Average interleaved channels down to one.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|chunk| chunk.iter().copied().sum::<f32>() / chunk.len() as f32)
        .collect()
}
