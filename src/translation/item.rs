use crate::translation::cache::TranslationMemo;
use crate::translation::chunker::TextChunker;
use crate::translation::retry::{InvokeOutcome, RetryingInvoker};
use crate::utils::{BatchTranslatorError, FieldFailurePolicy, Result};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One record of the input stream. Unknown fields are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(pub Map<String, Value>);

impl WorkItem {
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn set_str(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), Value::String(value.into()));
    }
}

impl From<Map<String, Value>> for WorkItem {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub index: usize,
    pub item: WorkItem,
    /// Fields whose target holds the empty sentinel instead of a translation.
    pub degraded_fields: Vec<String>,
}

struct FieldResult {
    text: String,
    degraded: bool,
}

pub struct ItemTranslator {
    invoker: RetryingInvoker,
    chunker: TextChunker,
    memo: TranslationMemo,
    source_fields: Vec<String>,
    target_prefix: String,
    field_policy: FieldFailurePolicy,
}

impl ItemTranslator {
    pub fn new(
        invoker: RetryingInvoker,
        chunker: TextChunker,
        memo: TranslationMemo,
        source_fields: Vec<String>,
        target_prefix: impl Into<String>,
        field_policy: FieldFailurePolicy,
    ) -> Self {
        Self {
            invoker,
            chunker,
            memo,
            source_fields,
            target_prefix: target_prefix.into(),
            field_policy,
        }
    }

    pub fn target_field(&self, source: &str) -> String {
        format!("{}{}", self.target_prefix, source)
    }

    /// Fails with `DecodeError` when a configured source field is absent or not text.
    pub fn check_fields(&self, index: usize, item: &WorkItem) -> Result<()> {
        for field in &self.source_fields {
            match item.0.get(field) {
                Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(BatchTranslatorError::DecodeError {
                        index,
                        reason: format!("field {:?} is not text: {}", field, other),
                    })
                }
                None => {
                    return Err(BatchTranslatorError::DecodeError {
                        index,
                        reason: format!("missing field {:?}", field),
                    })
                }
            }
        }
        Ok(())
    }

    pub async fn translate(&self, index: usize, mut item: WorkItem) -> Result<ItemReport> {
        self.check_fields(index, &item)?;

        let results = {
            let jobs = self.source_fields.iter().map(|field| {
                let text = item.get_str(field).unwrap_or_default();
                self.translate_field(index, field, text)
            });
            try_join_all(jobs).await?
        };

        let mut degraded_fields = Vec::new();
        for (field, result) in self.source_fields.iter().zip(results) {
            if result.degraded {
                degraded_fields.push(field.clone());
            }
            item.set_str(self.target_field(field), result.text);
        }

        Ok(ItemReport {
            index,
            item,
            degraded_fields,
        })
    }

    async fn translate_field(&self, index: usize, field: &str, text: &str) -> Result<FieldResult> {
        if text.trim().is_empty() {
            return Ok(FieldResult {
                text: String::new(),
                degraded: false,
            });
        }

        if let Some(hit) = self.memo.get(text).await {
            debug!(index = index, field = field, "Reusing memoized translation");
            return Ok(FieldResult {
                text: hit,
                degraded: false,
            });
        }

        let pieces: Vec<String> = if self.chunker.needs_chunking(text) {
            let chunks = self.chunker.split(text);
            debug!(index = index, field = field, chunks = chunks.len(), "Chunked long field");
            for chunk in chunks.iter().filter(|c| c.oversized) {
                warn!(
                    index = index,
                    field = field,
                    chars = chunk.len(),
                    max_len = self.chunker.max_len(),
                    "Single sentence exceeds chunk limit, sending whole"
                );
            }
            chunks.into_iter().map(|c| c.text).collect()
        } else {
            vec![text.to_string()]
        };

        let mut translated = Vec::with_capacity(pieces.len());
        let mut degraded = false;

        for piece in &pieces {
            match self.invoker.invoke(piece).await {
                Ok(InvokeOutcome::Translated(out)) => translated.push(out),
                Ok(InvokeOutcome::Degraded { attempts }) => {
                    warn!(
                        index = index,
                        field = field,
                        attempts = attempts,
                        "Engine returned no result, using empty value"
                    );
                    degraded = true;
                    translated.push(String::new());
                }
                Err(BatchTranslatorError::RetryExhausted {
                    attempts,
                    last_error,
                }) if self.field_policy == FieldFailurePolicy::EmptyValue => {
                    warn!(
                        index = index,
                        field = field,
                        attempts = attempts,
                        error = %last_error,
                        "Retries exhausted, using empty value"
                    );
                    degraded = true;
                    translated.push(String::new());
                }
                Err(e) => {
                    warn!(index = index, field = field, error = %e, "Field translation failed");
                    return Err(e);
                }
            }
        }

        if degraded {
            // Degraded fields hold the empty sentinel, never a partial join.
            return Ok(FieldResult {
                text: String::new(),
                degraded: true,
            });
        }

        let joined = self.chunker.join(&translated);
        self.memo.insert(text.to_string(), joined.clone()).await;
        Ok(FieldResult {
            text: joined,
            degraded: false,
        })
    }
}
