//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while loading or validating records.
#[derive(Debug, Error)]
pub enum DataError {
    /// A required column is missing or holds malformed values.
    #[error("Schema error in column '{column}': {reason}")]
    Schema {
        /// Column that failed validation
        column: String,
        /// What was wrong with it
        reason: String,
    },

    /// A dataset with no records was supplied where rows are required.
    #[error("Dataset is empty: {0}")]
    Empty(String),

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Shorthand for a [`DataError::Schema`].
    pub fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            reason: reason.into(),
        }
    }
}
