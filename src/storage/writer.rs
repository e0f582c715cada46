use crate::translation::WorkItem;
use crate::utils::{write_atomic, BatchTranslatorError, Result};
use std::path::{Path, PathBuf};

/// A single JSON array file holding every flushed item of every run.
///
/// Appends merge with what is already on disk and replace the file
/// atomically. Files written by older tooling as several concatenated
/// arrays are read as one list.
#[derive(Debug, Clone)]
pub struct DurableStore {
    path: PathBuf,
}

impl DurableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<WorkItem>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        for chunk in serde_json::Deserializer::from_slice(&data).into_iter::<Vec<WorkItem>>() {
            let chunk = chunk.map_err(|e| {
                BatchTranslatorError::ValidationError(format!(
                    "{} is not a JSON array of items: {}",
                    self.path.display(),
                    e
                ))
            })?;
            items.extend(chunk);
        }
        Ok(items)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Appends `batch` after the existing entries and returns the new total.
    pub fn append(&self, batch: &[WorkItem]) -> Result<usize> {
        let mut items = self.load()?;
        items.extend_from_slice(batch);
        let data = serde_json::to_vec_pretty(&items)?;
        write_atomic(&self.path, &data)?;
        Ok(items.len())
    }

    /// Removes the file. A store that was never written is already clear.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Drops every entry past the first `len`.
    pub fn truncate(&self, len: usize) -> Result<()> {
        let mut items = self.load()?;
        if items.len() <= len {
            return Ok(());
        }
        items.truncate(len);
        let data = serde_json::to_vec_pretty(&items)?;
        write_atomic(&self.path, &data)
    }
}
