//! Error types for the flow classification pipeline

use std::io;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// One or more required columns are absent from a chunk or batch
    #[error("Schema error: missing required columns {missing:?}")]
    Schema {
        /// Names of the absent columns
        missing: Vec<String>,
    },

    /// Labels were found that the label vocabulary does not contain
    #[error("Unseen labels {labels:?}; re-run metadata collection over the training corpus")]
    UnseenLabel {
        /// The normalized labels that are not in the vocabulary
        labels: Vec<String>,
    },

    /// A persisted artifact is missing, corrupt, partial or inconsistent
    #[error("Artifact load error: {0}")]
    ArtifactLoad(String),

    /// A single input row could not be interpreted
    #[error("Malformed input at row {row}: {reason}")]
    MalformedInput {
        /// Row index within the batch
        row: usize,
        /// Why the row was rejected
        reason: String,
    },

    /// Two artifacts that must agree do not
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Shard could not be read
    #[error("Source error in shard '{shard}': {reason}")]
    Source {
        /// Shard name
        shard: String,
        /// Underlying failure
        reason: String,
    },
}

impl Error {
    /// Build a schema error from a list of missing column names
    pub fn missing_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Error::Schema {
            missing: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this error must abort the surrounding run.
    ///
    /// Schema and malformed-input conditions are recovered at chunk or row
    /// scope; label-vocabulary and artifact conditions never are.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Schema { .. } | Error::MalformedInput { .. })
    }
}
