use thiserror::Error;

/// Central error type for the instrumentalizer-core crate.
#[derive(Debug, Error)]
pub enum SplitError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Intake
    #[error("No file provided")]
    MissingFile,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Could not decode audio: {0}")]
    Decode(String),

    // Pipeline
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input waveform has no samples")]
    EmptyInput,

    #[error("Separation failed: {0}")]
    Pipeline(String),

    // Retrieval
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SplitError {
    /// Wraps any failure raised after intake into the caller-facing pipeline error.
    pub fn pipeline(cause: SplitError) -> Self {
        match cause {
            e @ SplitError::Pipeline(_) => e,
            other => SplitError::Pipeline(other.to_string()),
        }
    }

    /// True for errors caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SplitError::MissingFile | SplitError::InvalidInput(_) | SplitError::Decode(_)
        )
    }
}

// --- Implement From conversions for common errors ---
impl From<hound::Error> for SplitError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => SplitError::Io(io),
            other => SplitError::Anyhow(other.into()),
        }
    }
}

impl From<serde_json::Error> for SplitError {
    fn from(e: serde_json::Error) -> Self {
        SplitError::InvalidConfig(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;
