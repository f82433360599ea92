//! Pipeline artifact persistence
//!
//! An artifact is the 8-byte magic `PLUMEPL1` followed by the bincode
//! encoding of an [`ArtifactEnvelope`]. Saving writes a temporary file in the
//! target directory and renames it over the fixed artifact name, so a reader
//! never sees a half-written file.
//!
//! Saving can also be split in two: [`ModelArtifactStore::stage`] writes the
//! temporary file only, and [`StagedArtifact::install`] later moves it into
//! place while holding the replaced artifact aside. An [`InstalledArtifact`]
//! is then either kept or rolled back to the previous file.

use crate::error::{ModelError, Result};
use crate::pipeline::TrainablePipeline;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// File name of the artifact inside the model directory.
pub const ARTIFACT_FILE_NAME: &str = "random_forest_model.bin";

const MAGIC: &[u8; 8] = b"PLUMEPL1";
const FORMAT_VERSION: u32 = 1;

/// Versioned wrapper stored after the magic bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    /// Layout version of the envelope
    pub format_version: u32,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    /// Crate version that wrote the artifact
    pub writer_version: String,
    /// The fitted pipeline
    pub pipeline: TrainablePipeline,
}

/// Saves and loads fitted pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelArtifactStore;

impl ModelArtifactStore {
    /// Path the artifact of `directory` lives at.
    pub fn artifact_path(directory: impl AsRef<Path>) -> PathBuf {
        directory.as_ref().join(ARTIFACT_FILE_NAME)
    }

    /// Write a fitted pipeline to `directory`, replacing any previous artifact.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// [`ModelError::NotFitted`] for an unfitted pipeline, [`ModelError::Io`]
    /// or [`ModelError::Serialization`] if writing fails. On error the
    /// previous artifact, if any, is left untouched.
    pub fn save(pipeline: &TrainablePipeline, directory: impl AsRef<Path>) -> Result<PathBuf> {
        Self::stage(pipeline, directory)?.commit()
    }

    /// Write a fitted pipeline next to the artifact of `directory` without
    /// replacing it.
    ///
    /// The staged file is removed when the returned value is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`ModelArtifactStore::save`].
    pub fn stage(
        pipeline: &TrainablePipeline,
        directory: impl AsRef<Path>,
    ) -> Result<StagedArtifact> {
        if !pipeline.is_fitted() {
            return Err(ModelError::NotFitted);
        }

        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        let envelope = ArtifactEnvelope {
            format_version: FORMAT_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            writer_version: env!("CARGO_PKG_VERSION").to_string(),
            pipeline: pipeline.clone(),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".plume-staged-")
            .tempfile_in(directory)?;
        tmp.write_all(MAGIC)?;
        bincode::serialize_into(&mut tmp, &envelope)?;
        tmp.as_file().sync_all()?;

        let staged = StagedArtifact {
            file: tmp.into_temp_path(),
            destination: Self::artifact_path(directory),
        };
        tracing::debug!(path = %staged.path().display(), "model artifact staged");
        Ok(staged)
    }

    /// Read a pipeline back from an artifact file.
    ///
    /// # Errors
    ///
    /// [`ModelError::Io`] if the file cannot be read and
    /// [`ModelError::CorruptArtifact`] if its magic, version or payload is
    /// wrong, or it holds an unfitted pipeline.
    pub fn load(path: impl AsRef<Path>) -> Result<TrainablePipeline> {
        Self::load_envelope(path).map(|envelope| envelope.pipeline)
    }

    /// Read the full envelope of an artifact file.
    pub fn load_envelope(path: impl AsRef<Path>) -> Result<ArtifactEnvelope> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;

        let payload = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| ModelError::corrupt(path, "missing artifact header"))?;

        let envelope: ArtifactEnvelope = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(payload.len() as u64)
            .deserialize(payload)
            .map_err(|e| ModelError::corrupt(path, format!("undecodable payload: {e}")))?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(ModelError::corrupt(
                path,
                format!(
                    "unsupported format version {} (expected {FORMAT_VERSION})",
                    envelope.format_version
                ),
            ));
        }
        if !envelope.pipeline.is_fitted() {
            return Err(ModelError::corrupt(path, "pipeline is not fitted"));
        }

        tracing::debug!(path = %path.display(), created_at = %envelope.created_at, "model artifact loaded");
        Ok(envelope)
    }

    /// Remove an artifact. A missing file is not an error.
    pub fn discard(path: impl AsRef<Path>) -> Result<()> {
        match fs::remove_file(path.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A fully written artifact that has not replaced the current one yet.
#[derive(Debug)]
pub struct StagedArtifact {
    file: TempPath,
    destination: PathBuf,
}

impl StagedArtifact {
    /// Where the staged bytes currently live.
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Where the artifact lands once installed.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Install the artifact and drop the replaced one.
    pub fn commit(self) -> Result<PathBuf> {
        self.install().map(InstalledArtifact::keep)
    }

    /// Move the staged file over the destination.
    ///
    /// An existing artifact is renamed aside first and restored if the move
    /// fails.
    ///
    /// # Errors
    ///
    /// [`ModelError::Io`] if either rename fails. The destination then still
    /// holds the previous artifact.
    pub fn install(self) -> Result<InstalledArtifact> {
        let Self { file, destination } = self;
        let directory = destination.parent().unwrap_or_else(|| Path::new("."));

        let backup = if destination.exists() {
            let backup = tempfile::Builder::new()
                .prefix(".plume-previous-")
                .tempfile_in(directory)?
                .into_temp_path();
            fs::rename(&destination, &backup)?;
            Some(backup)
        } else {
            None
        };

        if let Err(err) = file.persist(&destination) {
            if let Some(backup) = backup {
                if let Err(restore) = backup.persist(&destination) {
                    tracing::error!(
                        path = %destination.display(),
                        error = %restore.error,
                        "failed to restore previous model artifact"
                    );
                }
            }
            return Err(ModelError::Io(err.error));
        }

        tracing::info!(path = %destination.display(), "model artifact saved");
        Ok(InstalledArtifact {
            path: destination,
            backup,
        })
    }
}

/// An artifact in place whose predecessor can still be restored.
#[derive(Debug)]
pub struct InstalledArtifact {
    path: PathBuf,
    backup: Option<TempPath>,
}

impl InstalledArtifact {
    /// Installed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept the new artifact; the previous one is deleted.
    pub fn keep(self) -> PathBuf {
        self.path
    }

    /// Put the previous artifact back, or remove the new one if there was
    /// none.
    ///
    /// # Errors
    ///
    /// [`ModelError::Io`] if the previous file cannot be moved back.
    pub fn rollback(self) -> Result<()> {
        match self.backup {
            Some(backup) => backup.persist(&self.path).map_err(|e| ModelError::Io(e.error))?,
            None => ModelArtifactStore::discard(&self.path)?,
        }
        tracing::info!(path = %self.path.display(), "model artifact rolled back");
        Ok(())
    }
}
