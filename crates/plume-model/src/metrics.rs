//! Regression metrics

use crate::error::{ModelError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Accuracy of predictions on a partition.
///
/// A metric is `None` when it is undefined for the input: all of them on an
/// empty partition, and `r2` with fewer than two rows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Root mean squared error
    pub rmse: Option<f64>,
    /// Mean absolute error
    pub mae: Option<f64>,
    /// Coefficient of determination
    pub r2: Option<f64>,
    /// Rows evaluated
    pub n_samples: usize,
}

impl Metrics {
    /// Metrics of an empty partition.
    pub const fn not_available() -> Self {
        Self {
            rmse: None,
            mae: None,
            r2: None,
            n_samples: 0,
        }
    }

    /// Name and value of each metric, in display order.
    pub const fn to_pairs(&self) -> [(&'static str, Option<f64>); 3] {
        [("rmse", self.rmse), ("mae", self.mae), ("r2", self.r2)]
    }
}

/// Render a metric, `N/A` when undefined.
pub fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RMSE: {}, MAE: {}, R2: {}",
            format_metric(self.rmse),
            format_metric(self.mae),
            format_metric(self.r2)
        )
    }
}

/// Computes [`Metrics`] from ground truth and predictions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEvaluator;

impl MetricsEvaluator {
    /// Evaluate predictions.
    ///
    /// Constant ground truth has no variance to explain, so `r2` is 1.0 for
    /// a perfect fit and 0.0 otherwise.
    ///
    /// # Errors
    ///
    /// [`ModelError::DimensionMismatch`] if the lengths differ.
    pub fn evaluate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Metrics> {
        if y_true.len() != y_pred.len() {
            return Err(ModelError::DimensionMismatch(format!(
                "{} labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }

        let n = y_true.len();
        if n == 0 {
            return Ok(Metrics::not_available());
        }

        let residuals = y_true - y_pred;
        let sse = residuals.mapv(|r| r * r).sum();
        let rmse = (sse / n as f64).sqrt();
        let mae = residuals.mapv(f64::abs).sum() / n as f64;

        let r2 = (n >= 2).then(|| {
            let mean = y_true.sum() / n as f64;
            let sst = y_true.mapv(|v| (v - mean).powi(2)).sum();
            if sst > 0.0 {
                1.0 - sse / sst
            } else if sse == 0.0 {
                1.0
            } else {
                0.0
            }
        });

        Ok(Metrics {
            rmse: Some(rmse),
            mae: Some(mae),
            r2,
            n_samples: n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rstest::rstest;

    #[test]
    fn test_known_values() {
        let m = MetricsEvaluator::evaluate(&array![1.0, 2.0, 3.0, 4.0], &array![1.0, 2.0, 3.0, 6.0]).unwrap();
        assert_relative_eq!(m.rmse.unwrap(), 1.0);
        assert_relative_eq!(m.mae.unwrap(), 0.5);
        // sst = 5, sse = 4
        assert_relative_eq!(m.r2.unwrap(), 0.2, epsilon = 1e-12);
        assert_eq!(m.n_samples, 4);
    }

    #[test]
    fn test_empty_partition_is_not_available() {
        let m = MetricsEvaluator::evaluate(&Array1::zeros(0), &Array1::zeros(0)).unwrap();
        assert_eq!(m, Metrics::not_available());
        assert_eq!(m.to_string(), "RMSE: N/A, MAE: N/A, R2: N/A");
    }

    #[test]
    fn test_single_row_has_no_r2() {
        let m = MetricsEvaluator::evaluate(&array![3.0], &array![1.0]).unwrap();
        assert_relative_eq!(m.rmse.unwrap(), 2.0);
        assert!(m.r2.is_none());
    }

    #[rstest]
    #[case(array![2.0, 2.0], 1.0)]
    #[case(array![2.0, 3.0], 0.0)]
    fn test_constant_truth(#[case] pred: Array1<f64>, #[case] expected: f64) {
        let m = MetricsEvaluator::evaluate(&array![2.0, 2.0], &pred).unwrap();
        assert_relative_eq!(m.r2.unwrap(), expected);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            MetricsEvaluator::evaluate(&array![1.0], &array![1.0, 2.0]),
            Err(ModelError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_r2_never_exceeds_one() {
        let m = MetricsEvaluator::evaluate(&array![1.0, 5.0, 9.0], &array![9.0, 1.0, 5.0]).unwrap();
        assert!(m.r2.unwrap() <= 1.0);
        assert!(m.rmse.unwrap() >= 0.0);
    }
}
