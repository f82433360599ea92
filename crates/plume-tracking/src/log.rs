//! SQLite experiment log.
//!
//! Append-only: runs are inserted whole, in one transaction, and read back
//! as [`RunRecord`]s. Metrics that are not available are stored as `NULL`.

use crate::error::{Result, TrackingError};
use crate::record::{ArtifactRecord, RunId, RunRecord};
use chrono::{DateTime, Utc};
use plume_model::ModelParams;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Experiment log backed by SQLite.
#[derive(Debug)]
pub struct ExperimentLog {
    conn: Connection,
}

type RunRow = (String, String, String, i32, i64, String, String);

impl ExperimentLog {
    /// Open or create the log at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        let log = Self { conn };
        log.initialize_schema()?;
        tracing::debug!(path = %path.display(), "experiment log opened");
        Ok(log)
    }

    /// Create an in-memory log (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let log = Self { conn };
        log.initialize_schema()?;
        Ok(log)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL UNIQUE,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                cutoff_year INTEGER NOT NULL,
                n_lags INTEGER NOT NULL,
                target TEXT NOT NULL,
                model_params TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS params (
                run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (run_id, key)
            );

            CREATE TABLE IF NOT EXISTS metrics (
                run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value REAL,
                PRIMARY KEY (run_id, key)
            );

            CREATE TABLE IF NOT EXISTS artifacts (
                run_id TEXT PRIMARY KEY REFERENCES runs(run_id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                signature TEXT NOT NULL,
                input_example TEXT
            );",
        )?;
        Ok(())
    }

    /// Record a finished run.
    ///
    /// # Errors
    ///
    /// [`TrackingError::DuplicateRun`] if the id is already recorded. Nothing
    /// is written on error.
    pub fn insert_run(&self, record: &RunRecord) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM runs WHERE run_id = ?1",
            params![record.run_id.as_str()],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Err(TrackingError::DuplicateRun(record.run_id.to_string()));
        }

        tx.execute(
            "INSERT INTO runs
             (run_id, started_at, finished_at, cutoff_year, n_lags, target, model_params)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.run_id.as_str(),
                record.started_at.to_rfc3339(),
                record.finished_at.to_rfc3339(),
                record.cutoff_year,
                record.n_lags as i64,
                record.target,
                serde_json::to_string(&record.model_params)?,
            ],
        )?;

        for (key, value) in &record.params {
            tx.execute(
                "INSERT INTO params (run_id, key, value) VALUES (?1, ?2, ?3)",
                params![record.run_id.as_str(), key, value],
            )?;
        }

        for (key, value) in &record.metrics {
            tx.execute(
                "INSERT INTO metrics (run_id, key, value) VALUES (?1, ?2, ?3)",
                params![record.run_id.as_str(), key, value],
            )?;
        }

        if let Some(artifact) = &record.artifact {
            let input_example = artifact
                .input_example
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "INSERT INTO artifacts
                 (run_id, path, sha256, size_bytes, signature, input_example)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.run_id.as_str(),
                    artifact.path.to_string_lossy().into_owned(),
                    artifact.sha256,
                    artifact.size_bytes as i64,
                    serde_json::to_string(&artifact.signature)?,
                    input_example,
                ],
            )?;
        }

        tx.commit()?;
        tracing::debug!(run_id = %record.run_id, "run inserted into experiment log");
        Ok(())
    }

    /// Remove a run that was inserted but could not be completed.
    pub(crate) fn delete_run(&self, run_id: &RunId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM runs WHERE run_id = ?1", params![run_id.as_str()])?;
        Ok(deleted > 0)
    }

    /// Look up a run by id.
    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT run_id, started_at, finished_at, cutoff_year, n_lags, target, model_params
                 FROM runs WHERE run_id = ?1",
                params![run_id],
                read_run_row,
            )
            .optional()?;
        row.map(|row| self.hydrate(row)).transpose()
    }

    /// Look up a run that must exist.
    ///
    /// # Errors
    ///
    /// [`TrackingError::RunNotFound`] if there is no such run.
    pub fn require_run(&self, run_id: &str) -> Result<RunRecord> {
        self.get_run(run_id)?
            .ok_or_else(|| TrackingError::RunNotFound(run_id.to_string()))
    }

    /// Recorded runs, newest first, at most `limit` of them.
    pub fn list_runs(&self, limit: Option<usize>) -> Result<Vec<RunRecord>> {
        let limit = limit.map_or(-1, |n| n as i64);
        let mut stmt = self.conn.prepare(
            "SELECT run_id, started_at, finished_at, cutoff_year, n_lags, target, model_params
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], read_run_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|row| self.hydrate(row)).collect()
    }

    /// Most recently recorded run.
    pub fn latest_run(&self) -> Result<Option<RunRecord>> {
        Ok(self.list_runs(Some(1))?.into_iter().next())
    }

    /// Number of recorded runs.
    pub fn run_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn hydrate(&self, row: RunRow) -> Result<RunRecord> {
        let (run_id, started_at, finished_at, cutoff_year, n_lags, target, model_params) = row;
        let corrupt = |reason: String| TrackingError::CorruptEntry {
            run_id: run_id.clone(),
            reason,
        };

        let model_params: ModelParams = serde_json::from_str(&model_params)
            .map_err(|e| corrupt(format!("model_params: {e}")))?;

        let mut params_out = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM params WHERE run_id = ?1")?;
        for row in stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })? {
            let (key, value) = row?;
            params_out.insert(key, value);
        }

        let mut metrics = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM metrics WHERE run_id = ?1")?;
        for row in stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
        })? {
            let (key, value) = row?;
            metrics.insert(key, value);
        }

        let artifact = self
            .conn
            .query_row(
                "SELECT path, sha256, size_bytes, signature, input_example
                 FROM artifacts WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?
            .map(|(path, sha256, size_bytes, signature, input_example)| {
                Ok::<_, TrackingError>(ArtifactRecord {
                    path: PathBuf::from(path),
                    sha256,
                    size_bytes: size_bytes as u64,
                    signature: serde_json::from_str(&signature)
                        .map_err(|e| corrupt(format!("signature: {e}")))?,
                    input_example: input_example
                        .map(|json| serde_json::from_str(&json))
                        .transpose()
                        .map_err(|e| corrupt(format!("input_example: {e}")))?,
                })
            })
            .transpose()?;

        Ok(RunRecord {
            started_at: parse_timestamp(&started_at).map_err(&corrupt)?,
            finished_at: parse_timestamp(&finished_at).map_err(&corrupt)?,
            run_id: RunId::from(run_id),
            cutoff_year,
            n_lags: n_lags as usize,
            target,
            model_params,
            params: params_out,
            metrics,
            artifact,
        })
    }
}

fn read_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("timestamp '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, rmse: Option<f64>) -> RunRecord {
        let now = Utc::now();
        let mut metrics = BTreeMap::new();
        metrics.insert("rmse".to_string(), rmse);
        let mut params = BTreeMap::new();
        params.insert("n_estimators".to_string(), "100".to_string());
        RunRecord {
            run_id: RunId::from(id),
            started_at: now,
            finished_at: now,
            cutoff_year: 2022,
            n_lags: 2,
            target: "Total_Emissions".to_string(),
            model_params: ModelParams::default(),
            params,
            metrics,
            artifact: None,
        }
    }

    #[test]
    fn test_log_initialization() {
        let log = ExperimentLog::in_memory().unwrap();
        assert_eq!(log.run_count().unwrap(), 0);
        assert!(log.latest_run().unwrap().is_none());
    }

    #[test]
    fn test_insert_and_get() {
        let log = ExperimentLog::in_memory().unwrap();
        let run = record("run-1", Some(1.25));
        log.insert_run(&run).unwrap();

        let loaded = log.get_run("run-1").unwrap().unwrap();
        assert_eq!(loaded, run);
        assert!(log.get_run("missing").unwrap().is_none());
    }

    #[test]
    fn test_not_available_metric_is_null() {
        let log = ExperimentLog::in_memory().unwrap();
        log.insert_run(&record("run-1", None)).unwrap();
        let stored: Option<f64> = log
            .conn
            .query_row("SELECT value FROM metrics WHERE key = 'rmse'", [], |row| row.get(0))
            .unwrap();
        assert!(stored.is_none());
        assert_eq!(log.get_run("run-1").unwrap().unwrap().metrics["rmse"], None);
    }

    #[test]
    fn test_duplicate_run_is_rejected() {
        let log = ExperimentLog::in_memory().unwrap();
        log.insert_run(&record("run-1", Some(1.0))).unwrap();
        let err = log.insert_run(&record("run-1", Some(2.0))).unwrap_err();
        assert!(matches!(err, TrackingError::DuplicateRun(_)));
        assert_eq!(log.get_run("run-1").unwrap().unwrap().metrics["rmse"], Some(1.0));
    }

    #[test]
    fn test_list_runs_newest_first() {
        let log = ExperimentLog::in_memory().unwrap();
        for id in ["a", "b", "c"] {
            log.insert_run(&record(id, Some(1.0))).unwrap();
        }
        let ids: Vec<_> = log
            .list_runs(None)
            .unwrap()
            .into_iter()
            .map(|r| r.run_id.to_string())
            .collect();
        assert_eq!(ids, ["c", "b", "a"]);
        assert_eq!(log.list_runs(Some(2)).unwrap().len(), 2);
        assert_eq!(log.latest_run().unwrap().unwrap().run_id.as_str(), "c");
    }

    #[test]
    fn test_delete_cascades() {
        let log = ExperimentLog::in_memory().unwrap();
        let mut run = record("run-1", Some(1.0));
        run.artifact = Some(ArtifactRecord {
            path: PathBuf::from("/models/random_forest_model.bin"),
            sha256: "00".repeat(32),
            size_bytes: 10,
            signature: vec!["a".to_string()],
            input_example: Some(vec![1.0]),
        });
        log.insert_run(&run).unwrap();
        assert!(log.delete_run(&run.run_id).unwrap());
        let leftover: i64 = log
            .conn
            .query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(leftover, 0);
        assert!(matches!(
            log.require_run("run-1"),
            Err(TrackingError::RunNotFound(_))
        ));
    }
}
