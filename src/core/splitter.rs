use crate::{
    config::SeparationConfig,
    core::{
        audio::{load_waveform, write_waveform_atomic},
        dsp::{self, normalize},
        mask::{apply_mask_with, cached_mask, MagPhase},
    },
    error::{Result, SplitError},
    io::progress::{emit_split_progress, SplitProgress},
    types::{EnergyReport, SplitOptions, SplitResult, StemPair, Waveform},
};

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Band-mask separator: everything inside the pass-band is "vocals",
/// everything outside it is "instrumental".
#[derive(Clone, Debug)]
pub struct Splitter {
    config: SeparationConfig,
    hop: usize,
}

impl Default for Splitter {
    fn default() -> Self {
        let config = SeparationConfig::default();
        let hop = config.hop_length();
        Self { config, hop }
    }
}

impl Splitter {
    pub fn new(config: SeparationConfig) -> Result<Self> {
        config.validate()?;
        let hop = config.hop_length();
        Ok(Self { config, hop })
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    pub fn separate(&self, input: &Waveform) -> Result<StemPair> {
        let n_fft = self.config.n_fft;

        emit_split_progress(SplitProgress::Stage("transform"));
        let spec = dsp::forward(input, n_fft, self.hop)?;

        emit_split_progress(SplitProgress::Stage("mask"));
        let mask = cached_mask(
            n_fft,
            input.sample_rate,
            self.config.vocal_freq_min,
            self.config.vocal_freq_max,
        );
        if mask.pass_bins() == 0 {
            tracing::warn!(
                min = self.config.vocal_freq_min,
                max = self.config.vocal_freq_max,
                sample_rate = input.sample_rate,
                "pass-band covers no bins"
            );
        }
        let complement = mask.complement();

        let mp = MagPhase::from_spectrogram(&spec);
        let vocal_spec = apply_mask_with(&mp, &spec, &mask)?;
        let instrumental_spec = apply_mask_with(&mp, &spec, &complement)?;
        drop(mp);

        emit_split_progress(SplitProgress::Stage("reconstruct"));
        let (vocals, instrumental) = rayon::join(
            || dsp::inverse(&vocal_spec),
            || dsp::inverse(&instrumental_spec),
        );
        let (vocals, instrumental) = (vocals?, instrumental?);

        let report = EnergyReport {
            vocal_rms: vocals.rms(),
            instrumental_rms: instrumental.rms(),
        };
        tracing::debug!(
            vocal_rms = report.vocal_rms,
            instrumental_rms = report.instrumental_rms,
            frames = spec.frames(),
            "reconstructed both streams"
        );

        emit_split_progress(SplitProgress::Stage("normalize"));
        Ok(StemPair {
            vocals: normalize(&vocals),
            instrumental: normalize(&instrumental),
            report,
        })
    }
}

/// Splits a local audio file into `<stem>_vocals.wav` and
/// `<stem>_instrumental.wav` inside `opts.output_dir`.
pub fn split_file(input_path: &str, opts: SplitOptions) -> Result<SplitResult> {
    split_file_with(&Splitter::default(), input_path, opts)
}

pub fn split_file_with(
    splitter: &Splitter,
    input_path: &str,
    opts: SplitOptions,
) -> Result<SplitResult> {
    if !Path::new(input_path).is_file() {
        return Err(SplitError::NotFound(input_path.to_string()));
    }

    emit_split_progress(SplitProgress::Stage("read_audio"));
    let wave = load_waveform(input_path, opts.target_sample_rate)?;
    tracing::info!(
        path = input_path,
        sample_rate = wave.sample_rate,
        seconds = wave.duration_secs(),
        "loaded input"
    );

    let stems = splitter.separate(&wave)?;

    emit_split_progress(SplitProgress::Stage("write_stems"));
    fs::create_dir_all(&opts.output_dir)?;

    let file_stem = Path::new(input_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let base = PathBuf::from(&opts.output_dir).join(file_stem);

    let vocals_out = format!("{}_vocals.wav", base.to_string_lossy());
    let instrumental_out = format!("{}_instrumental.wav", base.to_string_lossy());

    emit_split_progress(SplitProgress::Writing { stem: "vocals" });
    write_waveform_atomic(&vocals_out, &stems.vocals)?;

    emit_split_progress(SplitProgress::Writing {
        stem: "instrumental",
    });
    if let Err(e) = write_waveform_atomic(&instrumental_out, &stems.instrumental) {
        fs::remove_file(&vocals_out).ok();
        return Err(e);
    }

    emit_split_progress(SplitProgress::Finished);

    Ok(SplitResult {
        vocals_path: vocals_out,
        instrumental_path: instrumental_out,
        sample_rate: wave.sample_rate,
        report: stems.report,
    })
}
