//! Experiment tracking.
//!
//! A tracker owns the experiment log. Each run is an explicit [`ActiveRun`]
//! value that buffers parameters, metrics and the artifact reference; nothing
//! reaches the log until [`ExperimentTracker::finish`] writes the whole run in
//! one transaction and then rewrites the configuration document.

use crate::config::{ConfigDocument, RunConfig};
use crate::error::Result;
use crate::log::ExperimentLog;
use crate::record::{ArtifactRecord, RunId, RunRecord};
use chrono::{DateTime, Utc};
use plume_model::{Metrics, ModelError, ModelParams, TrainablePipeline};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Records runs into an [`ExperimentLog`].
#[derive(Debug)]
pub struct ExperimentTracker {
    log: ExperimentLog,
}

/// A run in progress.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    run_id: RunId,
    started_at: DateTime<Utc>,
    cutoff_year: i32,
    n_lags: usize,
    target: String,
    model_params: ModelParams,
    params: BTreeMap<String, String>,
    metrics: BTreeMap<String, Option<f64>>,
    artifact: Option<ArtifactRecord>,
}

impl ExperimentTracker {
    /// Tracker writing to `log`.
    pub const fn new(log: ExperimentLog) -> Self {
        Self { log }
    }

    /// Underlying log.
    pub const fn log(&self) -> &ExperimentLog {
        &self.log
    }

    /// Start a run for `config` under a fresh id.
    pub fn start_run(&self, config: &RunConfig) -> ActiveRun {
        let run = ActiveRun {
            run_id: RunId::generate(),
            started_at: Utc::now(),
            cutoff_year: config.start_year,
            n_lags: config.n_lags,
            target: config.target.clone(),
            model_params: config.model_params.clone(),
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifact: None,
        };
        tracing::info!(run_id = %run.run_id, "run started");
        run
    }

    /// Record `run` and point the configuration document at it.
    ///
    /// The run's rows are inserted in one transaction. If the configuration
    /// rewrite then fails, the run is removed from the log again so no record
    /// of an incomplete run remains.
    ///
    /// # Errors
    ///
    /// Any log or configuration error. On error neither the log nor the
    /// configuration file holds the run.
    pub fn finish(&self, run: ActiveRun, config: &mut ConfigDocument) -> Result<RunRecord> {
        let record = RunRecord {
            run_id: run.run_id,
            started_at: run.started_at,
            finished_at: Utc::now(),
            cutoff_year: run.cutoff_year,
            n_lags: run.n_lags,
            target: run.target,
            model_params: run.model_params,
            params: run.params,
            metrics: run.metrics,
            artifact: run.artifact,
        };

        self.log.insert_run(&record)?;

        if let Err(err) = config.record_run(&record) {
            if let Err(cleanup) = self.log.delete_run(&record.run_id) {
                tracing::error!(run_id = %record.run_id, error = %cleanup, "failed to remove incomplete run");
            }
            return Err(err);
        }

        tracing::info!(
            run_id = %record.run_id,
            params = record.params.len(),
            metrics = record.metrics.len(),
            "run recorded"
        );
        Ok(record)
    }
}

impl ActiveRun {
    /// Identifier of this run.
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Buffered parameters.
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Buffered metrics.
    pub const fn metrics(&self) -> &BTreeMap<String, Option<f64>> {
        &self.metrics
    }

    /// Log one parameter; a repeated key keeps the latest value.
    pub fn log_param(&mut self, key: impl Into<String>, value: impl ToString) {
        self.params.insert(key.into(), value.to_string());
    }

    /// Log several parameters.
    pub fn log_params<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (key, value) in params {
            self.log_param(key, value);
        }
    }

    /// Log one metric; `None` is recorded as N/A.
    pub fn log_metric(&mut self, key: impl Into<String>, value: Option<f64>) {
        self.metrics.insert(key.into(), value);
    }

    /// Log the evaluation metrics and the number of rows they cover.
    pub fn log_metrics(&mut self, metrics: &Metrics) {
        for (key, value) in metrics.to_pairs() {
            self.log_metric(key, value);
        }
        self.log_metric("n_test_samples", Some(metrics.n_samples as f64));
    }

    /// Reference the persisted pipeline at `path`.
    ///
    /// The file is hashed now, so the record pins the exact bytes that were
    /// written. The signature is the pipeline's feature names.
    ///
    /// # Errors
    ///
    /// [`ModelError::NotFitted`] for an unfitted pipeline,
    /// [`ModelError::DimensionMismatch`] if the input example does not match
    /// the signature, and [`TrackingError::Io`](crate::TrackingError::Io) if
    /// the file cannot be read.
    pub fn log_artifact(
        &mut self,
        pipeline: &TrainablePipeline,
        path: &Path,
        input_example: Option<Vec<f64>>,
    ) -> Result<()> {
        self.log_staged_artifact(pipeline, path, path, input_example)
    }

    /// Reference an artifact that is still staged at `staged`.
    ///
    /// The staged bytes are hashed; the record points at `destination`, where
    /// they will be installed.
    ///
    /// # Errors
    ///
    /// Same as [`ActiveRun::log_artifact`].
    pub fn log_staged_artifact(
        &mut self,
        pipeline: &TrainablePipeline,
        staged: &Path,
        destination: &Path,
        input_example: Option<Vec<f64>>,
    ) -> Result<()> {
        if !pipeline.is_fitted() {
            return Err(ModelError::NotFitted.into());
        }
        let signature = pipeline.feature_names().to_vec();
        if let Some(example) = &input_example {
            if !signature.is_empty() && example.len() != signature.len() {
                return Err(ModelError::DimensionMismatch(format!(
                    "input example has {} values for {} features",
                    example.len(),
                    signature.len()
                ))
                .into());
            }
        }

        let mut file = File::open(staged)?;
        let mut hasher = Sha256::new();
        let size_bytes = io::copy(&mut file, &mut hasher)?;
        let sha256 = hex::encode(hasher.finalize());

        tracing::debug!(path = %destination.display(), %sha256, size_bytes, "artifact logged");
        self.artifact = Some(ArtifactRecord {
            path: destination.to_path_buf(),
            sha256,
            size_bytes,
            signature,
            input_example,
        });
        Ok(())
    }
}
