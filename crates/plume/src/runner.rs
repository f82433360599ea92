//! Training run orchestration.
//!
//! A [`TrainingRun`] moves through
//! `Configured → Assembled → Split → Trained → Evaluated → Persisted → Tracked`
//! one stage at a time. A stage can only be entered from the one before it,
//! and a failed stage aborts the run: every later call is rejected. The
//! artifact is only staged when persisted; tracking installs it and puts the
//! previous artifact back if the run cannot be recorded.

use crate::error::{PipelineError, Result};
use plume_data::{Dataset, loader};
use plume_features::{
    AssembledDataset, AssemblerConfig, DatasetAssembler, TemporalSplit, TemporalSplitter,
    default_additional_features, extract_matrix,
};
use plume_model::{Metrics, MetricsEvaluator, ModelArtifactStore, StagedArtifact, TrainablePipeline};
use plume_tracking::{ActiveRun, ConfigDocument, ExperimentTracker, RunConfig, RunId, RunRecord};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stage of a [`TrainingRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunStage {
    /// Inputs loaded, nothing computed
    Configured,
    /// Features built
    Assembled,
    /// Rows divided at the cutoff year
    Split,
    /// Pipeline fitted on the train partition
    Trained,
    /// Metrics computed on the test partition
    Evaluated,
    /// Artifact staged
    Persisted,
    /// Run recorded and configuration rewritten
    Tracked,
}

impl RunStage {
    /// Stage that may follow this one.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Configured => Some(Self::Assembled),
            Self::Assembled => Some(Self::Split),
            Self::Split => Some(Self::Trained),
            Self::Trained => Some(Self::Evaluated),
            Self::Evaluated => Some(Self::Persisted),
            Self::Persisted => Some(Self::Tracked),
            Self::Tracked => None,
        }
    }

    /// Lowercase stage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Assembled => "assembled",
            Self::Split => "split",
            Self::Trained => "trained",
            Self::Evaluated => "evaluated",
            Self::Persisted => "persisted",
            Self::Tracked => "tracked",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read both partitions named by `config` and combine them, raw rows first.
///
/// When `combined_data_path` is set the combined dataset is also written
/// there as CSV.
pub fn load_dataset(config: &RunConfig) -> Result<Dataset> {
    let raw = loader::read_partition(&config.train_path)?;
    let held_out = loader::read_partition(&config.test_path)?;
    tracing::info!(
        raw = raw.len(),
        held_out = held_out.len(),
        "partitions loaded"
    );

    let dataset = Dataset::combine(raw, held_out);
    if let Some(path) = &config.combined_data_path {
        loader::write_dataset(&dataset, path)?;
        tracing::info!(path = %path.display(), rows = dataset.len(), "combined dataset written");
    }
    Ok(dataset)
}

/// One execution of the training pipeline.
#[derive(Debug)]
pub struct TrainingRun<'a> {
    config: RunConfig,
    dataset: Dataset,
    tracker: &'a ExperimentTracker,
    stage: RunStage,
    aborted: bool,
    run: Option<ActiveRun>,
    assembled: Option<AssembledDataset>,
    split: Option<TemporalSplit>,
    pipeline: Option<TrainablePipeline>,
    input_example: Option<Vec<f64>>,
    metrics: Option<Metrics>,
    artifact_path: Option<PathBuf>,
    staged: Option<StagedArtifact>,
    record: Option<RunRecord>,
}

impl<'a> TrainingRun<'a> {
    /// Configure a run over `dataset`. Nothing is recorded until
    /// [`track`](Self::track) succeeds.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Tracking`] if `config` does not validate.
    pub fn new(config: RunConfig, dataset: Dataset, tracker: &'a ExperimentTracker) -> Result<Self> {
        config.validate()?;

        let mut run = tracker.start_run(&config);
        run.log_params(config.model_params.to_pairs());
        run.log_param("cutoff_year", config.start_year);
        run.log_param("n_lags", config.n_lags);
        run.log_param("target", &config.target);
        run.log_param("target_encoding_scope", config.target_encoding_scope);

        Ok(Self {
            config,
            dataset,
            tracker,
            stage: RunStage::Configured,
            aborted: false,
            run: Some(run),
            assembled: None,
            split: None,
            pipeline: None,
            input_example: None,
            metrics: None,
            artifact_path: None,
            staged: None,
            record: None,
        })
    }

    /// Current stage.
    pub const fn stage(&self) -> RunStage {
        self.stage
    }

    /// Whether a stage has failed.
    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Identifier the run will be recorded under.
    pub fn run_id(&self) -> Option<&RunId> {
        self.run
            .as_ref()
            .map(ActiveRun::run_id)
            .or_else(|| self.record.as_ref().map(|r| &r.run_id))
    }

    /// Run inputs.
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Assembled features, once [`RunStage::Assembled`] is reached.
    pub const fn assembled(&self) -> Option<&AssembledDataset> {
        self.assembled.as_ref()
    }

    /// Train and test partitions, once [`RunStage::Split`] is reached.
    pub const fn partitions(&self) -> Option<&TemporalSplit> {
        self.split.as_ref()
    }

    /// Fitted pipeline, once [`RunStage::Trained`] is reached.
    pub const fn pipeline(&self) -> Option<&TrainablePipeline> {
        self.pipeline.as_ref()
    }

    /// Test metrics, once [`RunStage::Evaluated`] is reached.
    pub const fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Path the artifact is installed at, once [`RunStage::Persisted`] is
    /// reached. The file only exists there after tracking succeeds.
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    /// Recorded run, once [`RunStage::Tracked`] is reached.
    pub const fn record(&self) -> Option<&RunRecord> {
        self.record.as_ref()
    }

    /// Build lagged, encoded features from the dataset.
    pub fn assemble(&mut self) -> Result<()> {
        self.step(RunStage::Assembled, |this| {
            let additional = this
                .config
                .additional_features
                .clone()
                .unwrap_or_else(default_additional_features);
            let assembler_config =
                AssemblerConfig::new(&this.config.target, this.config.n_lags, this.config.start_year)
                    .with_additional_fields(additional.clone())
                    .with_encoding_scope(this.config.target_encoding_scope);

            let assembled = DatasetAssembler::new(assembler_config).assemble(&this.dataset)?;
            this.active_run()?.log_params([
                ("additional_features", additional.join(",")),
                ("rows_dropped", assembled.rows_dropped.to_string()),
                ("n_features", assembled.feature_columns.len().to_string()),
            ]);
            this.assembled = Some(assembled);
            Ok(())
        })
    }

    /// Divide the assembled rows at the cutoff year.
    ///
    /// An empty test partition only logs a warning; its metrics will be N/A.
    pub fn split(&mut self) -> Result<()> {
        self.step(RunStage::Split, |this| {
            let assembled = this.assembled.as_ref().ok_or_else(|| missing("assembled dataset"))?;
            let split = TemporalSplitter::default().split(&assembled.frame, this.config.start_year)?;
            split.ensure_trainable()?;
            if !split.has_test() {
                tracing::warn!(
                    cutoff_year = split.cutoff_year,
                    "test partition is empty; metrics will be N/A"
                );
            }

            let (train_rows, test_rows) = (split.train.height(), split.test.height());
            this.active_run()?.log_params([
                ("train_rows", train_rows.to_string()),
                ("test_rows", test_rows.to_string()),
            ]);
            this.split = Some(split);
            Ok(())
        })
    }

    /// Fit a fresh pipeline on the train partition.
    pub fn train(&mut self) -> Result<()> {
        self.step(RunStage::Trained, |this| {
            let assembled = this.assembled.as_ref().ok_or_else(|| missing("assembled dataset"))?;
            let split = this.split.as_ref().ok_or_else(|| missing("partitions"))?;

            let (x, y) = extract_matrix(&split.train, &assembled.feature_columns, &assembled.target)?;
            let mut pipeline = TrainablePipeline::new(this.config.model_params.clone())?
                .with_feature_names(assembled.feature_columns.clone());
            pipeline.fit(&x.values, &y)?;

            this.input_example = x.row(0);
            this.pipeline = Some(pipeline);
            Ok(())
        })
    }

    /// Score the pipeline on the test partition.
    pub fn evaluate(&mut self) -> Result<()> {
        self.step(RunStage::Evaluated, |this| {
            let assembled = this.assembled.as_ref().ok_or_else(|| missing("assembled dataset"))?;
            let split = this.split.as_ref().ok_or_else(|| missing("partitions"))?;
            let pipeline = this.pipeline.as_ref().ok_or_else(|| missing("fitted pipeline"))?;

            let metrics = if split.has_test() {
                let (x, y) = extract_matrix(&split.test, &assembled.feature_columns, &assembled.target)?;
                let predictions = pipeline.predict(&x.values)?;
                MetricsEvaluator::evaluate(&y, &predictions)?
            } else {
                Metrics::not_available()
            };

            tracing::info!(%metrics, rows = metrics.n_samples, "pipeline evaluated");
            this.active_run()?.log_metrics(&metrics);
            this.metrics = Some(metrics);
            Ok(())
        })
    }

    /// Stage the fitted pipeline in the model directory and reference it in
    /// the run.
    ///
    /// The current artifact stays in place; a staged file that cannot be
    /// referenced is removed again.
    pub fn persist(&mut self) -> Result<()> {
        self.step(RunStage::Persisted, |this| {
            let pipeline = this.pipeline.as_ref().ok_or_else(|| missing("fitted pipeline"))?;
            let staged = ModelArtifactStore::stage(pipeline, &this.config.model_directory)?;

            let example = this.input_example.clone();
            let run = this.run.as_mut().ok_or_else(|| missing("active run"))?;
            run.log_staged_artifact(pipeline, staged.path(), staged.destination(), example)?;

            this.artifact_path = Some(staged.destination().to_path_buf());
            this.staged = Some(staged);
            Ok(())
        })
    }

    /// Install the staged artifact, record the run and rewrite the
    /// configuration document.
    ///
    /// If the run cannot be recorded the previous artifact is restored, so
    /// the model directory always matches the latest recorded run.
    pub fn track(&mut self, document: &mut ConfigDocument) -> Result<()> {
        self.step(RunStage::Tracked, |this| {
            let run = this.run.take().ok_or_else(|| missing("active run"))?;
            let staged = this.staged.take().ok_or_else(|| missing("staged artifact"))?;
            let installed = staged.install()?;

            match this.tracker.finish(run, document) {
                Ok(record) => {
                    installed.keep();
                    this.record = Some(record);
                    Ok(())
                }
                Err(err) => {
                    let path = installed.path().to_path_buf();
                    if let Err(restore) = installed.rollback() {
                        tracing::error!(path = %path.display(), error = %restore, "failed to restore previous artifact");
                    }
                    this.artifact_path = None;
                    Err(err.into())
                }
            }
        })
    }

    /// Drive every remaining stage and return the recorded run.
    pub fn execute(mut self, document: &mut ConfigDocument) -> Result<RunRecord> {
        while let Some(next) = self.stage.next() {
            match next {
                RunStage::Configured => {}
                RunStage::Assembled => self.assemble()?,
                RunStage::Split => self.split()?,
                RunStage::Trained => self.train()?,
                RunStage::Evaluated => self.evaluate()?,
                RunStage::Persisted => self.persist()?,
                RunStage::Tracked => self.track(document)?,
            }
        }
        self.record.ok_or_else(|| missing("run record"))
    }

    fn active_run(&mut self) -> Result<&mut ActiveRun> {
        self.run.as_mut().ok_or_else(|| missing("active run"))
    }

    fn step(&mut self, to: RunStage, body: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.aborted {
            return Err(PipelineError::Aborted { stage: self.stage });
        }
        if self.stage.next() != Some(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to,
            });
        }

        match body(self) {
            Ok(()) => {
                tracing::info!(from = %self.stage, to = %to, "stage complete");
                self.stage = to;
                Ok(())
            }
            Err(err) => {
                self.aborted = true;
                tracing::error!(stage = %to, error = %err, "stage failed; run aborted");
                Err(err)
            }
        }
    }
}

fn missing(what: &str) -> PipelineError {
    PipelineError::MissingState(what.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_data::Record;
    use plume_model::ModelParams;
    use plume_tracking::ExperimentLog;
    use rstest::rstest;
    use std::fs;

    fn dataset() -> Dataset {
        (2018..=2023)
            .flat_map(|year| {
                [("A", "ON", "M"), ("B", "QC", "E"), ("C", "AB", "M")]
                    .into_iter()
                    .enumerate()
                    .map(move |(i, (facility, province, method))| {
                        Record::new("City", facility, "Co", "325110", "Chemicals", province, year, method)
                            .with_measurement("Total_Emissions", Some(10.0 * (i + 1) as f64 + f64::from(year - 2018)))
                    })
            })
            .collect()
    }

    fn config(dir: &Path, start_year: i32) -> RunConfig {
        RunConfig {
            model_directory: dir.join("models"),
            train_path: dir.join("train.csv"),
            test_path: dir.join("test.csv"),
            combined_data_path: None,
            start_year,
            n_lags: 1,
            target: "Total_Emissions".to_string(),
            model_params: ModelParams {
                n_estimators: 5,
                ..ModelParams::default()
            },
            additional_features: Some(Vec::new()),
            target_encoding_scope: Default::default(),
            experiment_log: None,
            run_id: None,
        }
    }

    #[rstest]
    #[case(RunStage::Configured, Some(RunStage::Assembled))]
    #[case(RunStage::Persisted, Some(RunStage::Tracked))]
    #[case(RunStage::Tracked, None)]
    fn test_stage_order(#[case] stage: RunStage, #[case] next: Option<RunStage>) {
        assert_eq!(stage.next(), next);
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(ExperimentLog::in_memory().unwrap());
        let mut run = TrainingRun::new(config(dir.path(), 2022), dataset(), &tracker).unwrap();

        let err = run.train().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                from: RunStage::Configured,
                to: RunStage::Trained
            }
        ));
        assert!(!run.is_aborted());

        run.assemble().unwrap();
        assert!(matches!(
            run.assemble(),
            Err(PipelineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_failure_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(ExperimentLog::in_memory().unwrap());
        let mut run = TrainingRun::new(config(dir.path(), 2010), dataset(), &tracker).unwrap();

        let err = run.assemble().unwrap_err();
        assert!(err.to_string().contains("2010"), "{err}");
        assert!(run.is_aborted());
        assert_eq!(run.stage(), RunStage::Configured);
        assert!(matches!(run.assemble(), Err(PipelineError::Aborted { .. })));
        assert_eq!(tracker.log().run_count().unwrap(), 0);
    }

    #[test]
    fn test_empty_test_partition_gives_not_available_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        fs::write(&config_path, "notes: scratch\n").unwrap();
        let mut document = ConfigDocument::load(&config_path).unwrap();
        let tracker = ExperimentTracker::new(ExperimentLog::in_memory().unwrap());

        let record = TrainingRun::new(config(dir.path(), 2030), dataset(), &tracker)
            .unwrap()
            .execute(&mut document)
            .unwrap();
        assert_eq!(record.metrics(), Metrics::not_available());
        assert_eq!(record.params["test_rows"], "0");
    }

    #[test]
    fn test_tracking_failure_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("conf");
        fs::create_dir(&config_dir).unwrap();
        let config_path = config_dir.join("config.yaml");
        fs::write(&config_path, "notes: scratch\n").unwrap();
        let mut document = ConfigDocument::load(&config_path).unwrap();
        let tracker = ExperimentTracker::new(ExperimentLog::in_memory().unwrap());

        let mut run = TrainingRun::new(config(dir.path(), 2022), dataset(), &tracker).unwrap();
        for _ in 0..5 {
            match run.stage().next() {
                Some(RunStage::Assembled) => run.assemble().unwrap(),
                Some(RunStage::Split) => run.split().unwrap(),
                Some(RunStage::Trained) => run.train().unwrap(),
                Some(RunStage::Evaluated) => run.evaluate().unwrap(),
                Some(RunStage::Persisted) => run.persist().unwrap(),
                other => panic!("unexpected stage {other:?}"),
            }
        }
        let artifact = run.artifact_path().unwrap().to_path_buf();
        // Staged next to the destination, not installed yet.
        assert!(!artifact.exists());
        assert_eq!(fs::read_dir(dir.path().join("models")).unwrap().count(), 1);

        // The configuration can no longer be rewritten.
        fs::remove_dir_all(&config_dir).unwrap();
        assert!(run.track(&mut document).is_err());
        assert!(!artifact.exists());
        assert_eq!(fs::read_dir(dir.path().join("models")).unwrap().count(), 0);
        assert_eq!(tracker.log().run_count().unwrap(), 0);
        assert!(run.record().is_none());
    }

    #[test]
    fn test_dropped_run_keeps_current_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        fs::write(&config_path, "notes: scratch\n").unwrap();
        let mut document = ConfigDocument::load(&config_path).unwrap();
        let tracker = ExperimentTracker::new(ExperimentLog::in_memory().unwrap());

        let first = TrainingRun::new(config(dir.path(), 2022), dataset(), &tracker)
            .unwrap()
            .execute(&mut document)
            .unwrap();
        let path = first.artifact.as_ref().unwrap().path.clone();
        let before = fs::read(&path).unwrap();

        let mut second = TrainingRun::new(config(dir.path(), 2021), dataset(), &tracker).unwrap();
        second.assemble().unwrap();
        second.split().unwrap();
        second.train().unwrap();
        second.evaluate().unwrap();
        second.persist().unwrap();
        drop(second);

        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path().join("models")).unwrap().count(), 1);
    }
}
