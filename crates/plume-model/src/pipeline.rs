//! Trainable pipeline
//!
//! Standard scaling followed by a random forest, fitted exactly once.

use crate::error::{ModelError, Result};
use crate::forest::RandomForestRegressor;
use crate::scaler::StandardScaler;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth; unlimited when `None`
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs to be split
    pub min_samples_split: usize,
    /// Minimum samples in each leaf
    pub min_samples_leaf: usize,
    /// Seed of the bootstrap sampling
    pub random_state: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: 42,
        }
    }
}

impl ModelParams {
    /// Check every hyperparameter.
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidParameter`] naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ModelError::InvalidParameter(
                "max_depth must be at least 1 when set".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ModelError::InvalidParameter(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(ModelError::InvalidParameter(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Name and rendered value of every hyperparameter, for run logs.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("n_estimators", self.n_estimators.to_string()),
            (
                "max_depth",
                self.max_depth
                    .map_or_else(|| "None".to_string(), |d| d.to_string()),
            ),
            ("min_samples_split", self.min_samples_split.to_string()),
            ("min_samples_leaf", self.min_samples_leaf.to_string()),
            ("random_state", self.random_state.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    scaler: StandardScaler,
    forest: RandomForestRegressor,
}

/// Scaler and regressor behind a fit-once, predict-many contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainablePipeline {
    params: ModelParams,
    feature_names: Vec<String>,
    fitted: Option<Fitted>,
}

impl TrainablePipeline {
    /// Create an unfitted pipeline.
    pub fn new(params: ModelParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            feature_names: Vec::new(),
            fitted: None,
        })
    }

    /// Record the names of the feature columns, in matrix order.
    #[must_use]
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    /// Hyperparameters.
    pub const fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Feature column names, empty if never set.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Whether [`fit`](Self::fit) has succeeded.
    pub const fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Number of features the pipeline was fitted on.
    pub fn n_features(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.scaler.n_features())
    }

    /// Fit the scaler on `x`, then the forest on the scaled rows.
    ///
    /// # Errors
    ///
    /// - [`ModelError::AlreadyFitted`] on a second call
    /// - [`ModelError::EmptyTrainingSet`] for zero rows
    /// - [`ModelError::DimensionMismatch`] if `x` and `y` disagree in length
    ///   or `x` disagrees with the recorded feature names
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if self.fitted.is_some() {
            return Err(ModelError::AlreadyFitted);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::DimensionMismatch(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != x.ncols() {
            return Err(ModelError::DimensionMismatch(format!(
                "{} feature names but {} columns",
                self.feature_names.len(),
                x.ncols()
            )));
        }
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let scaler = StandardScaler::fit(x)?;
        let scaled = scaler.transform(x)?;
        let forest = RandomForestRegressor::fit(&scaled, y, &self.params)?;

        tracing::info!(
            rows = x.nrows(),
            features = x.ncols(),
            n_estimators = self.params.n_estimators,
            "pipeline fitted"
        );

        self.fitted = Some(Fitted { scaler, forest });
        Ok(())
    }

    /// Predict labels for `x`.
    ///
    /// # Errors
    ///
    /// [`ModelError::NotFitted`] before [`fit`](Self::fit),
    /// [`ModelError::DimensionMismatch`] for a wrong column count.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        let scaled = fitted.scaler.transform(x)?;
        fitted.forest.predict(&scaled)
    }
}
