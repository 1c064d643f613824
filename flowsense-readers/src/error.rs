//! Error types for shard readers and payload parsers

use flowsense_core::error::Error as CoreError;
use thiserror::Error;

/// Error type for shard readers and payload parsers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV format error
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON format error
    #[cfg(feature = "json")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload shape error
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Convert into a core error attributed to `shard`.
    ///
    /// Core errors pass through unchanged and I/O errors stay I/O errors;
    /// everything else becomes a source error for that shard.
    pub fn into_core(self, shard: &str) -> CoreError {
        match self {
            Error::Core(err) => err,
            Error::Io(err) => CoreError::Io(err),
            Error::InvalidArgument(msg) => CoreError::InvalidArgument(msg),
            other => CoreError::Source {
                shard: shard.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result type for shard readers and payload parsers
pub type Result<T> = std::result::Result<T, Error>;
