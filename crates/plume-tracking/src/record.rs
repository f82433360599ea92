//! Run records.

use chrono::{DateTime, Utc};
use plume_model::{Metrics, ModelParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Opaque identifier of one training run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Identifier as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the persisted pipeline of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Artifact file path
    pub path: PathBuf,
    /// Hex SHA-256 digest of the file
    pub sha256: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Feature names, in the order the pipeline expects them
    pub signature: Vec<String>,
    /// One training row, aligned with `signature`
    pub input_example: Option<Vec<f64>>,
}

/// Everything recorded about a finished run.
///
/// Built once when the run finishes and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier
    pub run_id: RunId,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run was recorded
    pub finished_at: DateTime<Utc>,
    /// First year of the test partition
    pub cutoff_year: i32,
    /// Lags per tracked field
    pub n_lags: usize,
    /// Predicted field
    pub target: String,
    /// Hyperparameters of the fitted pipeline
    pub model_params: ModelParams,
    /// Every logged parameter, rendered as text
    pub params: BTreeMap<String, String>,
    /// Logged metrics; `None` is N/A
    pub metrics: BTreeMap<String, Option<f64>>,
    /// Persisted pipeline, if one was logged
    pub artifact: Option<ArtifactRecord>,
}

impl RunRecord {
    /// The run's RMSE, MAE and R2 as a [`Metrics`] value.
    ///
    /// `n_samples` comes from the `n_test_samples` metric when present.
    pub fn metrics(&self) -> Metrics {
        let get = |name: &str| self.metrics.get(name).copied().flatten();
        Metrics {
            rmse: get("rmse"),
            mae: get("mae"),
            r2: get("r2"),
            n_samples: get("n_test_samples").map_or(0, |n| n as usize),
        }
    }
}
