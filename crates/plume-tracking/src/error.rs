//! Error types for run tracking.

use plume_model::ModelError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for tracking operations.
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Errors raised by the configuration document, the experiment log and the
/// tracker.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// SQLite error from the experiment log
    #[error("Experiment log error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// YAML error reading or writing the configuration document
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error encoding a stored value
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error rendering a run listing
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration key is missing or holds an unusable value.
    #[error("Configuration error in '{key}': {reason}")]
    Config {
        /// Offending key
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// Configuration file could not be read.
    #[error("Cannot read configuration {}: {source}", path.display())]
    ConfigRead {
        /// Configuration path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// No run with this id in the log.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// A run with this id was already recorded.
    #[error("Run {0} is already recorded")]
    DuplicateRun(String),

    /// A stored row could not be decoded.
    #[error("Corrupt experiment log entry for run {run_id}: {reason}")]
    CorruptEntry {
        /// Run the row belongs to
        run_id: String,
        /// What failed to decode
        reason: String,
    },

    /// Hyperparameter validation failed.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl TrackingError {
    /// Shorthand for a [`TrackingError::Config`].
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
