//! Feature matrix extraction.

use crate::error::{FeatureError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Numeric feature table with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Column names, in matrix column order
    pub columns: Vec<String>,
    /// Row-major values, one row per frame row
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of feature columns.
    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.nrows() == 0
    }

    /// Values of row `i`.
    pub fn row(&self, i: usize) -> Option<Vec<f64>> {
        (i < self.nrows()).then(|| self.values.row(i).to_vec())
    }
}

/// Extract the feature matrix and label vector from a frame.
///
/// Rows stay in frame order so `values.row(i)` and `labels[i]` describe the
/// same record.
///
/// # Errors
///
/// [`FeatureError::Schema`] if a column is missing, not numeric, or holds
/// a null.
pub fn extract_matrix(
    frame: &DataFrame,
    features: &[String],
    target: &str,
) -> Result<(FeatureMatrix, Array1<f64>)> {
    let n = frame.height();

    let mut data = Vec::with_capacity(features.len());
    for name in features {
        data.push(numeric_values(frame, name)?);
    }
    let values = Array2::from_shape_fn((n, features.len()), |(i, j)| data[j][i]);
    let labels = Array1::from_vec(numeric_values(frame, target)?);

    Ok((
        FeatureMatrix {
            columns: features.to_vec(),
            values,
        },
        labels,
    ))
}

fn numeric_values(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = frame
        .column(name)
        .map_err(|_| FeatureError::schema(name, "column not found"))?
        .cast(&DataType::Float64)
        .map_err(|_| FeatureError::schema(name, "expected a numeric column"))?;
    if column.null_count() > 0 {
        return Err(FeatureError::schema(
            name,
            format!("{} missing values", column.null_count()),
        ));
    }
    Ok(column.f64()?.into_no_null_iter().collect())
}
