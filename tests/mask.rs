use approx::assert_abs_diff_eq;
use instrumentalizer_core::core::{
    dsp::{forward, frequency_of_bin, inverse, normalize},
    mask::{apply_mask, build_mask, MagPhase},
};
use instrumentalizer_core::{SplitError, Waveform};
use std::f32::consts::PI;

fn two_tones(len: usize, sample_rate: u32) -> Waveform {
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.5 * (2.0 * PI * 100.0 * t).sin() + 0.3 * (2.0 * PI * 1000.0 * t).sin()
        })
        .collect();
    Waveform::new(samples, sample_rate).unwrap()
}

#[test]
fn default_band_selects_expected_bins() {
    let mask = build_mask(2048, 44_100, 200.0, 3500.0);
    assert_eq!(mask.len(), 1025);

    for b in 0..mask.len() {
        let f = frequency_of_bin(b, 2048, 44_100);
        let expected = if (200.0..=3500.0).contains(&f) { 1.0 } else { 0.0 };
        assert_eq!(mask.weights[b], expected, "bin {b} at {f} Hz");
    }

    // 215.3 Hz is the first bin inside, 3488.4 Hz the last.
    assert_eq!(mask.weights[9], 0.0);
    assert_eq!(mask.weights[10], 1.0);
    assert_eq!(mask.weights[162], 1.0);
    assert_eq!(mask.weights[163], 0.0);
    assert_eq!(mask.pass_bins(), 153);
}

#[test]
fn band_edges_are_inclusive() {
    // 8000 / 1000 = 8 Hz per bin, so 200 Hz and 400 Hz fall exactly on bins 25 and 50.
    let mask = build_mask(1000, 8_000, 200.0, 400.0);
    assert_eq!(mask.weights[24], 0.0);
    assert_eq!(mask.weights[25], 1.0);
    assert_eq!(mask.weights[50], 1.0);
    assert_eq!(mask.weights[51], 0.0);
}

#[test]
fn mask_and_complement_sum_to_one() {
    let mask = build_mask(2048, 44_100, 200.0, 3500.0);
    let complement = mask.complement();
    for (a, b) in mask.weights.iter().zip(complement.weights.iter()) {
        assert_eq!(a + b, 1.0);
    }
}

#[test]
fn inverted_band_gives_all_zero_mask() {
    let mask = build_mask(2048, 44_100, 3500.0, 200.0);
    assert_eq!(mask.pass_bins(), 0);
    assert!(mask.weights.iter().all(|&w| w == 0.0));
}

#[test]
fn band_above_nyquist_is_clamped_by_bin_range() {
    let mask = build_mask(512, 16_000, 1000.0, 50_000.0);
    assert_eq!(mask.len(), 257);
    // 31.25 Hz per bin: first bin >= 1000 Hz is 32, everything above stays in.
    assert_eq!(mask.weights[31], 0.0);
    assert!(mask.weights.iter().skip(32).all(|&w| w == 1.0));
}

#[test]
fn magnitude_partitions_exactly() {
    let wave = two_tones(8000, 16_000);
    let spec = forward(&wave, 1024, 256).unwrap();
    let mp = MagPhase::from_spectrogram(&spec);

    let mask = build_mask(1024, 16_000, 200.0, 3500.0);
    let vocal = mp.masked_magnitude(&mask).unwrap();
    let instrumental = mp.masked_magnitude(&mask.complement()).unwrap();

    for ((m, v), i) in mp.magnitude.iter().zip(vocal.iter()).zip(instrumental.iter()) {
        assert_eq!(*m, v + i);
    }
}

#[test]
fn applying_mask_keeps_phase_of_pass_bins() {
    let wave = two_tones(4000, 16_000);
    let spec = forward(&wave, 512, 128).unwrap();
    let mask = build_mask(512, 16_000, 200.0, 3500.0);
    let masked = apply_mask(&spec, &mask).unwrap();

    assert_eq!(masked.data.dim(), spec.data.dim());
    for b in 0..spec.bins() {
        for t in 0..spec.frames() {
            let got = masked.data[[b, t]];
            if mask.weights[b] == 1.0 {
                let want = spec.data[[b, t]];
                let tol = 1e-4 * want.norm().max(1.0);
                assert_abs_diff_eq!(got.re, want.re, epsilon = tol);
                assert_abs_diff_eq!(got.im, want.im, epsilon = tol);
            } else {
                assert_eq!(got.norm(), 0.0);
            }
        }
    }
}

#[test]
fn empty_band_gives_silent_vocals_and_full_instrumental() {
    let wave = two_tones(8000, 16_000);
    let spec = forward(&wave, 1024, 256).unwrap();
    let mask = build_mask(1024, 16_000, 5000.0, 100.0);

    let vocals = normalize(&inverse(&apply_mask(&spec, &mask).unwrap()).unwrap());
    let instrumental = normalize(&inverse(&apply_mask(&spec, &mask.complement()).unwrap()).unwrap());
    let unmasked = normalize(&inverse(&spec).unwrap());

    assert!(vocals.samples.iter().all(|&s| s == 0.0));
    assert_eq!(instrumental.len(), unmasked.len());
    for (a, b) in instrumental.samples.iter().zip(unmasked.samples.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
    }
}

#[test]
fn mismatched_mask_is_rejected() {
    let wave = two_tones(4000, 16_000);
    let spec = forward(&wave, 512, 128).unwrap();
    let mask = build_mask(1024, 16_000, 200.0, 3500.0);

    assert!(matches!(
        apply_mask(&spec, &mask),
        Err(SplitError::InvalidConfig(_))
    ));
}
