use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    core::audio::write_waveform_atomic,
    error::{Result, SplitError},
    io::intake::{secure_filename, UploadName},
    types::{SourceFile, Sources, StemPair, Waveform},
};

/// Bytes of a stored artifact plus the name it should be downloaded as.
#[derive(Clone, Debug)]
pub struct StoredFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl StoredFile {
    pub fn content_type(&self) -> &'static str {
        match Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("ogg") => "audio/ogg",
            Some("flac") => "audio/flac",
            Some("aac") => "audio/aac",
            Some("m4a") => "audio/mp4",
            _ => "application/octet-stream",
        }
    }
}

/// Upload and output directories for the HTTP service.
#[derive(Clone, Debug)]
pub struct ResultStore {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
}

impl ResultStore {
    /// Creates both directories if they do not exist yet.
    pub fn new(upload_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            upload_dir: upload_dir.into(),
            processed_dir: processed_dir.into(),
        };
        fs::create_dir_all(&store.upload_dir)?;
        fs::create_dir_all(&store.processed_dir)?;
        Ok(store)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Saves the raw upload as `<base>_<id>.<ext>`.
    pub fn save_upload(&self, name: &UploadName, id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self
            .upload_dir
            .join(format!("{}_{}.{}", name.base, id, name.extension));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn output_filename(base: &str, stem: &str, id: &str) -> String {
        format!("{base}_{stem}_{id}.wav")
    }

    /// Persists one output stream as WAV under the processed directory.
    pub fn write_output(
        &self,
        base: &str,
        stem: &str,
        id: &str,
        wave: &Waveform,
    ) -> Result<SourceFile> {
        let filename = Self::output_filename(base, stem, id);
        let path = self.processed_dir.join(&filename);
        write_waveform_atomic(&path, wave)?;
        Ok(SourceFile {
            filename,
            path: path.to_string_lossy().into_owned(),
        })
    }

    /// Writes both outputs of one request. If the second write fails the
    /// first output is removed again.
    pub fn write_stems(&self, base: &str, id: &str, stems: &StemPair) -> Result<Sources> {
        let vocals = self.write_output(base, "vocals", id, &stems.vocals)?;
        let instrumental = match self.write_output(base, "instrumental", id, &stems.instrumental)
        {
            Ok(file) => file,
            Err(e) => {
                self.discard(&[&vocals.path]);
                return Err(e);
            }
        };
        Ok(Sources {
            vocals,
            instrumental,
        })
    }

    /// Looks up a previously written output by its file key.
    pub fn open(&self, key: &str) -> Result<StoredFile> {
        let filename = secure_filename(key);
        if filename.is_empty() {
            return Err(SplitError::NotFound(key.to_string()));
        }
        let path = self.processed_dir.join(&filename);
        if !path.is_file() {
            return Err(SplitError::NotFound(filename));
        }
        match fs::read(&path) {
            Ok(bytes) => Ok(StoredFile { filename, bytes }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SplitError::NotFound(filename))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of artifacts left by a failed request.
    pub fn discard<P: AsRef<Path>>(&self, paths: &[P]) {
        for p in paths {
            let p = p.as_ref();
            if let Err(e) = fs::remove_file(p) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %p.display(), error = %e, "failed to remove artifact");
                }
            }
        }
    }
}
