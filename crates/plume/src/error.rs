//! Pipeline errors.

use crate::runner::RunStage;
use plume_data::DataError;
use plume_features::FeatureError;
use plume_model::ModelError;
use plume_tracking::TrackingError;
use thiserror::Error;

/// Result type for pipeline runs.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while driving a training run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Loading or validating records failed
    #[error(transparent)]
    Data(#[from] DataError),

    /// Feature assembly or splitting failed
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Fitting, evaluating or persisting the pipeline failed
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Configuration or experiment log failure
    #[error(transparent)]
    Tracking(#[from] TrackingError),

    /// A stage was requested out of order.
    #[error("Cannot move a run from '{from}' to '{to}'")]
    InvalidTransition {
        /// Current stage
        from: RunStage,
        /// Requested stage
        to: RunStage,
    },

    /// A stage of this run already failed.
    #[error("Run was aborted after reaching '{stage}'")]
    Aborted {
        /// Last stage completed
        stage: RunStage,
    },

    /// A stage found the output of an earlier stage missing.
    #[error("Run state is missing its {0}")]
    MissingState(String),
}
