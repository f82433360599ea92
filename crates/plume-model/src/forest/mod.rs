//! Random forest regression
//!
//! Each tree is grown on a bootstrap sample of the training rows drawn from
//! its own seeded generator, and every feature is considered at every split.
//! The forest predicts the mean of its trees.

mod tree;

pub use tree::{RegressionTree, TreeLimits, TreeNode};

use crate::error::{ModelError, Result};
use crate::pipeline::ModelParams;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForestRegressor {
    /// Fit a forest. Identical inputs and `random_state` give identical trees.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &ModelParams) -> Result<Self> {
        params.validate()?;

        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(ModelError::DimensionMismatch(format!(
                "{} feature rows but {} labels",
                n_samples,
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let limits = TreeLimits {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
        };

        let mut seeds = StdRng::seed_from_u64(params.random_state);
        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(seeds.r#gen());
                let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                RegressionTree::grow(x, y, &sample, &limits)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            trees = trees.len(),
            rows = n_samples,
            features = x.ncols(),
            "random forest fitted"
        );

        Ok(Self {
            trees,
            n_features: x.ncols(),
        })
    }

    /// Mean prediction of all trees.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(ModelError::DimensionMismatch(format!(
                "forest fitted on {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }

        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    /// Fitted trees.
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Number of input features.
    pub const fn n_features(&self) -> usize {
        self.n_features
    }
}
