use uuid::Uuid;

use crate::{
    config::ServerConfig,
    core::{
        audio::{decode_bytes, prepare},
        splitter::Splitter,
    },
    error::{Result, SplitError},
    io::{
        intake::{validate_upload, UploadName},
        storage::{ResultStore, StoredFile},
    },
    types::{SeparationResult, Sources},
};

/// Request-level operations behind the HTTP routes.
pub struct SeparationService {
    config: ServerConfig,
    store: ResultStore,
    splitter: Splitter,
}

impl SeparationService {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let store = ResultStore::new(&config.upload_dir, &config.processed_dir)?;
        let splitter = Splitter::new(config.separation.clone())?;
        Ok(Self {
            config,
            store,
            splitter,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Validates, stores, decodes and separates one upload.
    ///
    /// On any failure after the upload was saved, the upload and any partial
    /// outputs are removed before the error is returned.
    pub fn process_upload(&self, original_name: &str, bytes: &[u8]) -> Result<SeparationResult> {
        if original_name.trim().is_empty() || bytes.is_empty() {
            return Err(SplitError::MissingFile);
        }
        let name = validate_upload(original_name, &self.config.allowed_extensions)?;
        let id = Uuid::new_v4().to_string();

        let upload_path = self.store.save_upload(&name, &id, bytes)?;
        tracing::info!(
            %id,
            file = %name.sanitized,
            bytes = bytes.len(),
            "accepted upload"
        );

        match self.run(&name, &id, bytes) {
            Ok(sources) => {
                tracing::info!(%id, "separation finished");
                Ok(SeparationResult {
                    id,
                    sources,
                    original_name: name.sanitized,
                })
            }
            Err(e) => {
                tracing::error!(%id, error = %e, "separation failed, cleaning up");
                self.store.discard(&[&upload_path]);
                if e.is_client_error() {
                    Err(e)
                } else {
                    Err(SplitError::pipeline(e))
                }
            }
        }
    }

    fn run(&self, name: &UploadName, id: &str, bytes: &[u8]) -> Result<Sources> {
        let audio = decode_bytes(bytes.to_vec(), Some(&name.extension))?;
        let wave = prepare(&audio, self.config.target_sample_rate)?;

        let stems = self.splitter.separate(&wave)?;
        self.store.write_stems(&name.base, id, &stems)
    }

    pub fn fetch(&self, key: &str) -> Result<StoredFile> {
        self.store.open(key)
    }
}
