use std::{
    fs::{self, File},
    io::{BufWriter, Cursor},
    path::Path,
};

use hound::WavWriter;
use rubato::{FftFixedIn, Resampler};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tempfile::NamedTempFile;

use crate::{
    core::dsp::downmix_to_mono,
    error::{Result, SplitError},
    types::{AudioData, Waveform},
};

const RESAMPLE_CHUNK: usize = 1024;
const RESAMPLE_SUB_CHUNKS: usize = 2;

pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path: &Path = path.as_ref();

    let file: File = File::open(path)?;
    let ext = path.extension().and_then(|e| e.to_str());

    decode_source(Box::new(file), ext)
}

/// Decodes an in-memory payload; `ext` is only a probe hint.
pub fn decode_bytes(bytes: Vec<u8>, ext: Option<&str>) -> Result<AudioData> {
    if bytes.is_empty() {
        return Err(SplitError::Decode("empty payload".into()));
    }
    decode_source(Box::new(Cursor::new(bytes)), ext)
}

fn decode_source(source: Box<dyn MediaSource>, ext: Option<&str>) -> Result<AudioData> {
    let mss: MediaSourceStream = MediaSourceStream::new(source, Default::default());

    let mut hint: Hint = Hint::new();
    if let Some(ext) = ext {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SplitError::Decode(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SplitError::Decode("no audio track found".into()))?;
    let track_id = track.id;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SplitError::Decode(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: u16 = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(SplitError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frames are skipped, the rest of the stream is still usable.
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::warn!(%msg, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(SplitError::Decode(e.to_string())),
        };
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        samples.extend_from_slice(buffer.samples());
    }

    if sample_rate == 0 || channels == 0 {
        return Err(SplitError::Decode("stream has no sample rate or channels".into()));
    }

    tracing::debug!(sample_rate, channels, samples = samples.len(), "decoded audio");

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

/// Downmixes decoded audio into the mono analysis signal.
pub fn to_waveform(audio: &AudioData) -> Result<Waveform> {
    let mono = downmix_to_mono(&audio.samples, audio.channels);
    Waveform::new(mono, audio.sample_rate).map_err(|e| SplitError::Decode(e.to_string()))
}

/// Output-side latency of an `FftFixedIn` built with these parameters.
/// Its sinc filter is centered half an FFT block in, so the first
/// `fft_size_out / 2` output frames lead the signal.
fn fft_fixed_in_delay(rate_in: usize, rate_out: usize, chunk: usize, sub_chunks: usize) -> usize {
    let gcd = gcd(rate_in, rate_out);
    let min_chunk_in = rate_in / gcd;
    let fft_chunks = ((chunk / sub_chunks) as f32 / min_chunk_in as f32).ceil() as usize;
    fft_chunks * (rate_out / gcd) / 2
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Resamples a mono waveform; the output length is `len * target / source`
/// and the resampler's latency is removed, so output frame 0 lines up with
/// input frame 0.
pub fn resample(wave: &Waveform, target_rate: u32) -> Result<Waveform> {
    if target_rate == 0 {
        return Err(SplitError::InvalidConfig("target sample rate must be positive".into()));
    }
    if wave.sample_rate == target_rate || wave.samples.is_empty() {
        return Ok(Waveform {
            samples: wave.samples.clone(),
            sample_rate: target_rate,
        });
    }

    let (rate_in, rate_out) = (wave.sample_rate as usize, target_rate as usize);
    let mut resampler =
        FftFixedIn::<f32>::new(rate_in, rate_out, RESAMPLE_CHUNK, RESAMPLE_SUB_CHUNKS, 1)
            .map_err(|e| SplitError::InvalidConfig(e.to_string()))?;
    let delay = fft_fixed_in_delay(rate_in, rate_out, RESAMPLE_CHUNK, RESAMPLE_SUB_CHUNKS);

    let n = wave.samples.len();
    let expected = (n as u64 * target_rate as u64 / wave.sample_rate as u64) as usize;
    let wanted = expected + delay;
    let mut out: Vec<f32> = Vec::with_capacity(wanted + RESAMPLE_CHUNK);
    let mut chunk: Vec<f32> = Vec::with_capacity(RESAMPLE_CHUNK);

    let mut pos = 0usize;
    // Zero-fed chunks after the input ends flush the delayed tail.
    while pos < n || out.len() < wanted {
        let need = resampler.input_frames_next();
        chunk.clear();
        if pos < n {
            let end = (pos + need).min(n);
            chunk.extend_from_slice(&wave.samples[pos..end]);
        }
        chunk.resize(need, 0.0);
        pos += need;

        let frames = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| SplitError::Pipeline(format!("resampling failed: {e}")))?;
        if frames[0].is_empty() && pos >= n {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }
    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);

    Ok(Waveform {
        samples: out,
        sample_rate: target_rate,
    })
}

/// Reads a file into the analysis waveform, resampling when asked to.
pub fn load_waveform<P: AsRef<Path>>(path: P, target_rate: Option<u32>) -> Result<Waveform> {
    let audio = read_audio(path)?;
    prepare(&audio, target_rate)
}

pub fn prepare(audio: &AudioData, target_rate: Option<u32>) -> Result<Waveform> {
    let wave = to_waveform(audio)?;
    match target_rate {
        Some(rate) if rate != wave.sample_rate => resample(&wave, rate),
        _ => Ok(wave),
    }
}

fn wav_spec(audio: &AudioData) -> hound::WavSpec {
    hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_samples<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    samples: &[f32],
) -> Result<()> {
    for sample in samples {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }
    Ok(())
}

pub fn write_audio<P: AsRef<Path>>(path: P, audio: &AudioData) -> Result<()> {
    let mut writer = WavWriter::create(path, wav_spec(audio))?;
    write_samples(&mut writer, &audio.samples)?;
    writer.finalize()?;
    Ok(())
}

/// Writes a mono waveform as 16-bit WAV. The file only appears at `path`
/// once it is complete; on error nothing is left behind.
pub fn write_waveform_atomic<P: AsRef<Path>>(path: P, wave: &Waveform) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let audio = AudioData {
        samples: wave.samples.clone(),
        sample_rate: wave.sample_rate,
        channels: 1,
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = WavWriter::new(BufWriter::new(tmp.as_file_mut()), wav_spec(&audio))?;
        write_samples(&mut writer, &audio.samples)?;
        writer.finalize()?;
    }
    tmp.persist(path).map_err(|e| SplitError::Io(e.error))?;
    Ok(())
}
