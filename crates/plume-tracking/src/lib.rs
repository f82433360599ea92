#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/plume-forecast/plume/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod log;
pub mod record;
pub mod summary;
pub mod tracker;

pub use config::{ConfigDocument, RECORDED_KEYS, RunConfig, RunOverrides, default_experiment_log};
pub use error::{Result, TrackingError};
pub use log::ExperimentLog;
pub use record::{ArtifactRecord, RunId, RunRecord};
pub use summary::{ReportFormat, render_run, render_runs};
pub use tracker::{ActiveRun, ExperimentTracker};
