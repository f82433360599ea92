#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/plume-forecast/plume/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod artifact;
pub mod error;
pub mod forest;
pub mod metrics;
pub mod pipeline;
pub mod scaler;

// Re-export main types
pub use artifact::{
    ARTIFACT_FILE_NAME, ArtifactEnvelope, InstalledArtifact, ModelArtifactStore, StagedArtifact,
};
pub use error::{ModelError, Result};
pub use forest::{RandomForestRegressor, RegressionTree};
pub use metrics::{Metrics, MetricsEvaluator, format_metric};
pub use pipeline::{ModelParams, TrainablePipeline};
pub use scaler::StandardScaler;
