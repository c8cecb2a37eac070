use std::{f32::consts::PI, fs, path::Path};
use tempfile::{tempdir, TempDir};

use instrumentalizer_core::{
    io::storage::ResultStore, types::EnergyReport, write_audio, AudioData, SeparationService,
    ServerConfig, SplitError, StemPair, Waveform,
};

fn service_in(tmp: &TempDir) -> SeparationService {
    let cfg = ServerConfig {
        upload_dir: tmp.path().join("uploads"),
        processed_dir: tmp.path().join("processed"),
        ..Default::default()
    };
    SeparationService::new(cfg).unwrap()
}

fn tone_wav_bytes(tmp: &TempDir) -> Vec<u8> {
    let sr = 16_000u32;
    let samples = (0..8_000)
        .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin() * 0.5)
        .collect();
    let path = tmp.path().join("source.wav");
    write_audio(
        &path,
        &AudioData {
            samples,
            sample_rate: sr,
            channels: 1,
        },
    )
    .unwrap();
    fs::read(path).unwrap()
}

/// A valid WAV header with no sample frames.
fn header_only_wav_bytes(tmp: &TempDir) -> Vec<u8> {
    let path = tmp.path().join("empty.wav");
    write_audio(
        &path,
        &AudioData {
            samples: Vec::new(),
            sample_rate: 16_000,
            channels: 1,
        },
    )
    .unwrap();
    fs::read(path).unwrap()
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn new_service_creates_directories() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);
    assert!(svc.store().upload_dir().is_dir());
    assert!(svc.store().processed_dir().is_dir());
}

#[test]
fn empty_payload_is_missing_file() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);

    assert!(matches!(
        svc.process_upload("song.mp3", &[]),
        Err(SplitError::MissingFile)
    ));
    assert!(matches!(
        svc.process_upload("", b"RIFF"),
        Err(SplitError::MissingFile)
    ));
    assert_eq!(count_files(svc.store().upload_dir()), 0);
}

#[test]
fn disallowed_extension_is_invalid_input() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);

    let err = svc.process_upload("notes.txt", b"hello").unwrap_err();
    assert!(matches!(err, SplitError::InvalidInput(_)));
    assert_eq!(err.to_string(), "Invalid file format");
    assert_eq!(count_files(svc.store().upload_dir()), 0);
}

#[test]
fn undecodable_upload_is_cleaned_up() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);

    let err = svc
        .process_upload("broken.mp3", b"this is not an mp3 at all")
        .unwrap_err();
    assert!(matches!(err, SplitError::Decode(_)), "got {err:?}");
    assert_eq!(count_files(svc.store().upload_dir()), 0);
    assert_eq!(count_files(svc.store().processed_dir()), 0);
}

#[test]
fn upload_produces_two_downloadable_outputs() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);
    let bytes = tone_wav_bytes(&tmp);

    let res = svc.process_upload("My Song.wav", &bytes).unwrap();

    assert_eq!(res.original_name, "My_Song.wav");
    assert_eq!(
        res.sources.vocals.filename,
        format!("My_Song_vocals_{}.wav", res.id)
    );
    assert_eq!(
        res.sources.instrumental.filename,
        format!("My_Song_instrumental_{}.wav", res.id)
    );
    assert!(Path::new(&res.sources.vocals.path).is_file());
    assert!(Path::new(&res.sources.instrumental.path).is_file());

    // the raw upload is kept next to the outputs
    assert!(svc
        .store()
        .upload_dir()
        .join(format!("My_Song_{}.wav", res.id))
        .is_file());

    let file = svc.fetch(&res.sources.vocals.filename).unwrap();
    assert_eq!(file.filename, res.sources.vocals.filename);
    assert_eq!(file.content_type(), "audio/wav");
    assert_eq!(&file.bytes[..4], b"RIFF");

    let r = hound::WavReader::new(std::io::Cursor::new(file.bytes)).unwrap();
    assert_eq!(r.spec().sample_rate, 16_000);
    assert_eq!(r.spec().channels, 1);
    assert_eq!(r.len(), 8_000);
}

#[test]
fn response_serializes_with_original_name_key() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);
    let bytes = tone_wav_bytes(&tmp);

    let res = svc.process_upload("take1.wav", &bytes).unwrap();
    let json = serde_json::to_value(&res).unwrap();

    assert_eq!(json["id"], res.id.as_str());
    assert_eq!(json["originalName"], "take1.wav");
    assert!(json["sources"]["vocals"]["filename"].is_string());
    assert!(json["sources"]["instrumental"]["path"].is_string());
}

#[test]
fn unknown_key_is_not_found() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);

    assert!(matches!(
        svc.fetch("never_produced.wav"),
        Err(SplitError::NotFound(_))
    ));
    assert!(matches!(
        svc.fetch("../../etc/passwd"),
        Err(SplitError::NotFound(_))
    ));
    assert!(matches!(svc.fetch("..."), Err(SplitError::NotFound(_))));
}

#[test]
fn pipeline_failure_is_wrapped_and_cleaned_up() {
    let tmp = tempdir().unwrap();
    let svc = service_in(&tmp);

    let err = svc
        .process_upload("silence.wav", &header_only_wav_bytes(&tmp))
        .unwrap_err();
    assert!(matches!(err, SplitError::Pipeline(_)), "got {err:?}");
    assert!(!err.is_client_error());
    assert_eq!(
        err.to_string(),
        "Separation failed: Input waveform has no samples"
    );
    assert_eq!(count_files(svc.store().upload_dir()), 0);
    assert_eq!(count_files(svc.store().processed_dir()), 0);
}

#[test]
fn failed_second_output_removes_the_first() {
    let tmp = tempdir().unwrap();
    let store = ResultStore::new(tmp.path().join("up"), tmp.path().join("out")).unwrap();

    let wave = Waveform::new(vec![0.0, 0.5, -0.5, 0.25], 8_000).unwrap();
    let stems = StemPair {
        vocals: wave.clone(),
        instrumental: wave,
        report: EnergyReport::default(),
    };

    // a directory in place of the instrumental output makes its rename fail
    let blocked = ResultStore::output_filename("take", "instrumental", "fixed-id");
    fs::create_dir(store.processed_dir().join(&blocked)).unwrap();

    assert!(store.write_stems("take", "fixed-id", &stems).is_err());
    let vocals = ResultStore::output_filename("take", "vocals", "fixed-id");
    assert!(!store.processed_dir().join(vocals).exists());
    assert_eq!(count_files(store.processed_dir()), 1);

    fs::remove_dir(store.processed_dir().join(&blocked)).unwrap();
    let sources = store.write_stems("take", "fixed-id", &stems).unwrap();
    assert!(Path::new(&sources.vocals.path).is_file());
    assert!(Path::new(&sources.instrumental.path).is_file());
}
