use thiserror::Error;

/// Codec-level failures. Fatal to a single record's pipeline run.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to decode source image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Unsupported target format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid quality {0}: expected a value between 0 and 1")]
    InvalidQuality(f32),
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("A batch is already in progress")]
    BatchInProgress,

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;
