use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchTranslatorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Cannot decode item {index}: {reason}")]
    DecodeError { index: usize, reason: String },

    #[error("Translation failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("Fatal engine failure: {0}")]
    Fatal(String),

    #[error("Remote store error: {0}")]
    RemoteStoreError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl BatchTranslatorError {
    /// Errors that concern a single item and may be skipped under
    /// [`ItemFailurePolicy::Skip`]. Everything else aborts the run.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            BatchTranslatorError::RetryExhausted { .. } | BatchTranslatorError::DecodeError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BatchTranslatorError>;

/// What to do with a field whose invocation ran out of retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFailurePolicy {
    /// Write the empty sentinel into the target field and keep the item.
    #[default]
    EmptyValue,
    /// Fail the whole item.
    FailItem,
}

/// What to do with an item that failed at item level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailurePolicy {
    #[default]
    Abort,
    Skip,
}
