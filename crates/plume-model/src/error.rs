//! Model errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by the scaler, forest, pipeline and artifact store.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Prediction or persistence requested before fitting
    #[error("Pipeline is not fitted")]
    NotFitted,

    /// Second call to fit
    #[error("Pipeline is already fitted; create a new one to retrain")]
    AlreadyFitted,

    /// Shapes of inputs disagree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid hyperparameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Fit called with no rows
    #[error("Cannot fit on an empty training set")]
    EmptyTrainingSet,

    /// Artifact file does not hold a fitted pipeline
    #[error("Corrupt artifact at {}: {reason}", path.display())]
    CorruptArtifact {
        /// Artifact path
        path: PathBuf,
        /// What failed to validate
        reason: String,
    },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding error while writing an artifact
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl ModelError {
    /// Shorthand for [`ModelError::CorruptArtifact`].
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
