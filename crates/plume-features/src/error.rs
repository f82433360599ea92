//! Error types for feature engineering.

use plume_data::DataError;
use polars::prelude::PolarsError;
use std::fmt;
use thiserror::Error;

/// Result type for feature operations.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// Side of a temporal split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Rows before the cutoff year
    Train,
    /// Rows at or after the cutoff year
    Test,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Errors raised while building features.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// A column is missing, has the wrong type, or would be overwritten.
    #[error("Schema error in column '{column}': {reason}")]
    Schema {
        /// Offending column
        column: String,
        /// What was wrong with it
        reason: String,
    },

    /// Dropping rows without enough history left nothing to train on.
    #[error("Insufficient history: all {rows} rows lack {n_lags} prior periods or a tracked value")]
    InsufficientHistory {
        /// Rows before dropping
        rows: usize,
        /// Lags requested
        n_lags: usize,
    },

    /// A partition that must hold rows is empty.
    #[error(
        "The {partition} partition is empty for cutoff year {cutoff_year} (earliest year in data: {})",
        describe_year(.earliest_year)
    )]
    EmptyPartition {
        /// Which side of the split is empty
        partition: Partition,
        /// Cutoff year used for the split
        cutoff_year: i32,
        /// Earliest reporting year present, if any rows exist
        earliest_year: Option<i32>,
    },

    /// Invalid encoder or assembler parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Record boundary error
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

impl FeatureError {
    /// Shorthand for a [`FeatureError::Schema`].
    pub fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

fn describe_year(year: &Option<i32>) -> String {
    year.map_or_else(|| "none".to_string(), |y| y.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_partition_message_names_years() {
        let err = FeatureError::EmptyPartition {
            partition: Partition::Train,
            cutoff_year: 2010,
            earliest_year: Some(2015),
        };
        let msg = err.to_string();
        assert!(msg.contains("train partition"));
        assert!(msg.contains("2010"));
        assert!(msg.contains("2015"));
    }

    #[test]
    fn test_data_schema_error_converts() {
        let err: FeatureError = DataError::schema("Population", "not present in any record").into();
        assert!(err.to_string().contains("Population"));
    }
}
