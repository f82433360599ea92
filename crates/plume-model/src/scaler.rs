//! Standard scaling
//!
//! z = (x - mean) / std, per column, with the population standard deviation.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardisation learned from a training matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Learn column means and standard deviations.
    ///
    /// A column with zero variance keeps a scale of 1.0 so it maps to 0.0
    /// rather than NaN.
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    /// Number of columns the scaler was fitted on.
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Column means.
    pub const fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Column scales.
    pub const fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Standardise a matrix with the fitted statistics.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::DimensionMismatch(format!(
                "scaler fitted on {} columns, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        Ok((x - &self.mean) / &self.scale)
    }
}
