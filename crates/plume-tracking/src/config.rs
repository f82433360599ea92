//! Run configuration.
//!
//! The configuration file is a YAML mapping. [`ConfigDocument`] keeps the
//! whole mapping so keys this crate does not know about survive a rewrite,
//! and hands out an immutable, typed [`RunConfig`] view of it. Relative paths
//! in the file are resolved against the directory the file lives in.

use crate::error::{Result, TrackingError};
use crate::record::RunRecord;
use plume_features::TargetEncodingScope;
use plume_model::ModelParams;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Keys rewritten after a successful run.
pub const RECORDED_KEYS: [&str; 5] = ["run_id", "start_year", "n_lags", "target", "model_params"];

/// Default location of the experiment log.
pub fn default_experiment_log() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("plume").join("experiments.db"))
}

/// Typed inputs of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory the fitted pipeline is written to
    pub model_directory: PathBuf,
    /// Raw partition CSV
    pub train_path: PathBuf,
    /// Held-out partition CSV
    pub test_path: PathBuf,
    /// Where the combined dataset is written, if anywhere
    #[serde(default)]
    pub combined_data_path: Option<PathBuf>,
    /// Cutoff year; rows from this year on are test rows
    pub start_year: i32,
    /// Lags per tracked field
    pub n_lags: usize,
    /// Predicted field
    pub target: String,
    /// Hyperparameters
    #[serde(default)]
    pub model_params: ModelParams,
    /// Fields lagged alongside the target; the registry default when absent
    #[serde(default)]
    pub additional_features: Option<Vec<String>>,
    /// Fit rows of the target encoder
    #[serde(default)]
    pub target_encoding_scope: TargetEncodingScope,
    /// Experiment log database
    #[serde(default)]
    pub experiment_log: Option<PathBuf>,
    /// Id of the run that last rewrote this configuration
    #[serde(default)]
    pub run_id: Option<String>,
}

/// Values that replace configuration entries for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    /// Cutoff year
    pub start_year: Option<i32>,
    /// Lags per tracked field
    pub n_lags: Option<usize>,
    /// Predicted field
    pub target: Option<String>,
    /// Number of trees
    pub n_estimators: Option<usize>,
    /// Maximum tree depth
    pub max_depth: Option<usize>,
}

impl RunOverrides {
    /// Whether no value is overridden.
    pub const fn is_empty(&self) -> bool {
        self.start_year.is_none()
            && self.n_lags.is_none()
            && self.target.is_none()
            && self.n_estimators.is_none()
            && self.max_depth.is_none()
    }
}

impl RunConfig {
    /// Copy of this configuration with `overrides` applied.
    #[must_use]
    pub fn with_overrides(&self, overrides: &RunOverrides) -> Self {
        let mut config = self.clone();
        if let Some(year) = overrides.start_year {
            config.start_year = year;
        }
        if let Some(n) = overrides.n_lags {
            config.n_lags = n;
        }
        if let Some(target) = &overrides.target {
            config.target.clone_from(target);
        }
        if let Some(n) = overrides.n_estimators {
            config.model_params.n_estimators = n;
        }
        if overrides.max_depth.is_some() {
            config.model_params.max_depth = overrides.max_depth;
        }
        config
    }

    /// Check values that cannot be caught by the YAML schema.
    ///
    /// # Errors
    ///
    /// [`TrackingError::Config`] for an empty target or additional field that
    /// repeats the target, [`TrackingError::Model`] for invalid
    /// hyperparameters.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(TrackingError::config("target", "must not be empty"));
        }
        if let Some(fields) = &self.additional_features {
            if fields.iter().any(|f| f == &self.target) {
                return Err(TrackingError::config(
                    "additional_features",
                    format!("repeats the target '{}'", self.target),
                ));
            }
        }
        self.model_params.validate()?;
        Ok(())
    }

    /// Experiment log path, falling back to [`default_experiment_log`].
    ///
    /// # Errors
    ///
    /// [`TrackingError::Config`] when no path is configured and the platform
    /// has no data directory.
    pub fn experiment_log_path(&self) -> Result<PathBuf> {
        self.experiment_log
            .clone()
            .or_else(default_experiment_log)
            .ok_or_else(|| {
                TrackingError::config("experiment_log", "not set and no platform data directory")
            })
    }

    fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.model_directory);
        resolve(&mut self.train_path);
        resolve(&mut self.test_path);
        if let Some(p) = self.combined_data_path.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.experiment_log.as_mut() {
            resolve(p);
        }
        self
    }
}

/// A configuration file and its parsed contents.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    document: Mapping,
}

impl ConfigDocument {
    /// Read a configuration file. An empty file is an empty mapping.
    ///
    /// # Errors
    ///
    /// [`TrackingError::ConfigRead`] if the file cannot be read,
    /// [`TrackingError::Yaml`] if it is not YAML and
    /// [`TrackingError::Config`] if the top level is not a mapping.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TrackingError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut document = Self::parse(&text)?;
        document.path = path.to_path_buf();
        Ok(document)
    }

    /// Parse YAML text into a document not yet bound to a file.
    pub fn parse(text: &str) -> Result<Self> {
        let document = match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            _ => return Err(TrackingError::config("<root>", "expected a mapping")),
        };
        Ok(Self {
            path: PathBuf::new(),
            document,
        })
    }

    /// File this document is read from and written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value of a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    /// Typed view of the document, with relative paths resolved.
    ///
    /// # Errors
    ///
    /// [`TrackingError::Yaml`] naming the first missing or mistyped key.
    pub fn run_config(&self) -> Result<RunConfig> {
        let config: RunConfig = serde_yaml::from_value(Value::Mapping(self.document.clone()))?;
        Ok(config.resolve_paths(self.base_dir()))
    }

    /// Rewrite the file with the identity of `record`, so the next run
    /// defaults to this run's configuration.
    ///
    /// The document in memory only changes once the file was written.
    ///
    /// # Errors
    ///
    /// [`TrackingError::Io`] or [`TrackingError::Yaml`] if writing fails; the
    /// file on disk is then unchanged.
    pub fn record_run(&mut self, record: &RunRecord) -> Result<()> {
        let mut document = self.document.clone();
        let [run_id, start_year, n_lags, target, model_params] = RECORDED_KEYS;
        document.insert(run_id.into(), Value::String(record.run_id.to_string()));
        document.insert(start_year.into(), Value::Number(record.cutoff_year.into()));
        document.insert(n_lags.into(), Value::Number((record.n_lags as u64).into()));
        document.insert(target.into(), Value::String(record.target.clone()));
        document.insert(model_params.into(), serde_yaml::to_value(&record.model_params)?);

        write_atomic(&self.path, &serde_yaml::to_string(&document)?)?;
        self.document = document;

        tracing::info!(path = %self.path.display(), run_id = %record.run_id, "configuration updated");
        Ok(())
    }

    fn base_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TrackingError::Io(e.error))?;
    Ok(())
}
