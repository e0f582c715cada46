use crate::utils::{write_atomic, BatchTranslatorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk form: `{ "last_processed_index": n }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_processed_index: usize,
}

impl Checkpoint {
    pub fn resume_index(&self) -> usize {
        self.last_processed_index + 1
    }
}

/// Index of the last flushed item, persisted as a single JSON file.
///
/// Only the pipeline's flush path writes here. Writes go to a sibling temp
/// file that is synced and renamed over the target, so a crash leaves either
/// the old or the new value, never a torn file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no checkpoint has been written yet.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data).map(Some).map_err(|e| {
            BatchTranslatorError::CheckpointError(format!(
                "{} is not a valid checkpoint: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// First stream index that still needs processing.
    pub fn resume_index(&self) -> Result<usize> {
        Ok(self.load()?.map(|c| c.resume_index()).unwrap_or(0))
    }

    pub fn save(&self, last_processed_index: usize) -> Result<()> {
        let checkpoint = Checkpoint {
            last_processed_index,
        };
        let data = serde_json::to_vec(&checkpoint)?;
        write_atomic(&self.path, &data)?;
        tracing::debug!(
            path = %self.path.display(),
            last_processed_index = last_processed_index,
            "Checkpoint saved"
        );
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
