use std::{
    collections::BTreeSet,
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};

pub const DEFAULT_N_FFT: usize = 2048;
pub const DEFAULT_VOCAL_FREQ_MIN: f32 = 200.0;
pub const DEFAULT_VOCAL_FREQ_MAX: f32 = 3500.0;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 6] = ["mp3", "wav", "ogg", "flac", "aac", "m4a"];

/// Transform and pass-band parameters for one separation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub n_fft: usize,
    /// Defaults to `n_fft / 4` when unset.
    pub hop: Option<usize>,
    pub vocal_freq_min: f32,
    pub vocal_freq_max: f32,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            n_fft: DEFAULT_N_FFT,
            hop: None,
            vocal_freq_min: DEFAULT_VOCAL_FREQ_MIN,
            vocal_freq_max: DEFAULT_VOCAL_FREQ_MAX,
        }
    }
}

impl SeparationConfig {
    pub fn hop_length(&self) -> usize {
        self.hop.unwrap_or(self.n_fft / 4)
    }

    pub fn validate(&self) -> Result<()> {
        let hop = self.hop_length();
        if self.n_fft == 0 {
            return Err(SplitError::InvalidConfig("n_fft must be positive".into()));
        }
        if hop == 0 {
            return Err(SplitError::InvalidConfig("hop must be positive".into()));
        }
        if hop > self.n_fft {
            return Err(SplitError::InvalidConfig(format!(
                "hop {hop} exceeds n_fft {}",
                self.n_fft
            )));
        }
        if !self.vocal_freq_min.is_finite() || !self.vocal_freq_max.is_finite() {
            return Err(SplitError::InvalidConfig(
                "pass-band edges must be finite".into(),
            ));
        }
        if self.vocal_freq_min > self.vocal_freq_max {
            tracing::warn!(
                min = self.vocal_freq_min,
                max = self.vocal_freq_max,
                "vocal pass-band is empty, vocal output will be silent"
            );
        }
        Ok(())
    }
}

/// Everything the HTTP service needs, passed in at construction time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub allowed_extensions: BTreeSet<String>,
    pub max_upload_bytes: usize,
    /// Resample decoded uploads to this rate; native rate when unset.
    pub target_sample_rate: Option<u32>,
    pub separation: SeparationConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".into(),
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed"),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_upload_bytes: 100 * 1024 * 1024,
            target_sample_rate: None,
            separation: SeparationConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then the optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let raw = fs::read_to_string(p).map_err(|e| {
                    SplitError::InvalidConfig(format!("cannot read {}: {e}", p.display()))
                })?;
                serde_json::from_str::<ServerConfig>(&raw)?
            }
            None => ServerConfig::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = env::var("INSTRUMENTALIZER_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(dir) = env::var("INSTRUMENTALIZER_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("INSTRUMENTALIZER_PROCESSED_DIR") {
            self.processed_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.allowed_extensions.is_empty() {
            return Err(SplitError::InvalidConfig(
                "allowed_extensions must not be empty".into(),
            ));
        }
        if self.target_sample_rate == Some(0) {
            return Err(SplitError::InvalidConfig(
                "target_sample_rate must be positive".into(),
            ));
        }
        self.separation.validate()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            SplitError::InvalidConfig(format!("invalid listen_addr {}: {e}", self.listen_addr))
        })
    }
}
