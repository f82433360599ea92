//! Experiment log persistence across connections.

use plume_model::Metrics;
use plume_tracking::{ConfigDocument, ExperimentLog, ExperimentTracker, ReportFormat, render_runs};
use std::fs;

const CONFIG: &str = "model_directory: models
train_path: train.csv
test_path: test.csv
start_year: 2021
n_lags: 1
target: Total_Emissions
model_params:
  n_estimators: 50
  max_depth: 5
experiment_log: runs/experiments.db
";

#[test]
fn test_runs_survive_reopening_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, CONFIG).unwrap();

    let mut doc = ConfigDocument::load(&config_path).unwrap();
    let config = doc.run_config().unwrap();
    let log_path = config.experiment_log_path().unwrap();
    assert_eq!(log_path, dir.path().join("runs").join("experiments.db"));

    let first = {
        let tracker = ExperimentTracker::new(ExperimentLog::open(&log_path).unwrap());
        let mut run = tracker.start_run(&config);
        run.log_params(config.model_params.to_pairs());
        run.log_metrics(&Metrics::not_available());
        tracker.finish(run, &mut doc).unwrap()
    };

    let log = ExperimentLog::open(&log_path).unwrap();
    assert_eq!(log.run_count().unwrap(), 1);
    let stored = log.get_run(first.run_id.as_str()).unwrap().unwrap();
    assert_eq!(stored.metrics["rmse"], None);
    assert_eq!(stored.params["max_depth"], "5");

    // The next run defaults to what the previous one recorded.
    let doc = ConfigDocument::load(&config_path).unwrap();
    let config = doc.run_config().unwrap();
    assert_eq!(config.run_id.as_deref(), Some(first.run_id.as_str()));
    assert_eq!(config.model_params.n_estimators, 50);
    assert_eq!(config.model_params.max_depth, Some(5));
    assert_eq!(config.start_year, 2021);
}

#[test]
fn test_listing_after_several_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, CONFIG).unwrap();
    let mut doc = ConfigDocument::load(&config_path).unwrap();
    let config = doc.run_config().unwrap();
    let tracker = ExperimentTracker::new(ExperimentLog::in_memory().unwrap());

    let mut ids = Vec::new();
    for _ in 0..3 {
        let run = tracker.start_run(&config);
        ids.push(tracker.finish(run, &mut doc).unwrap().run_id);
    }

    let runs = tracker.log().list_runs(None).unwrap();
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].run_id, ids[2]);
    assert_eq!(tracker.log().latest_run().unwrap().unwrap().run_id, ids[2]);

    let text = render_runs(&runs, ReportFormat::Text).unwrap();
    for id in &ids {
        assert!(text.contains(id.as_str()));
    }
}
