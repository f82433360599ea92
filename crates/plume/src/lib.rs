#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/plume-forecast/plume/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod runner;

// Re-export main types from sub-crates
pub use plume_data as data;
pub use plume_features as features;
pub use plume_model as model;
pub use plume_tracking as tracking;

pub use error::{PipelineError, Result};
pub use runner::{RunStage, TrainingRun, load_dataset};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
