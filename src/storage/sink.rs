use crate::state::CheckpointStore;
use crate::storage::remote::{upload_with_provisioning, ObjectStore};
use crate::storage::writer::DurableStore;
use crate::translation::WorkItem;
use crate::utils::{sequence_key, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub struct RemoteMirror {
    pub store: Arc<dyn ObjectStore>,
    pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub global_index: usize,
    pub items: usize,
    pub total_persisted: Option<usize>,
    pub remote_key: Option<String>,
}

/// Accumulates translated items and persists them in flush order.
///
/// A flush writes the durable store, then the remote mirror, then the
/// checkpoint. A failure at any step leaves the checkpoint untouched, and a
/// failed upload also takes the batch back out of the durable store.
pub struct BatchSink {
    batch: Vec<WorkItem>,
    batch_size: usize,
    store: DurableStore,
    checkpoint: CheckpointStore,
    remote: Option<RemoteMirror>,
    /// Consumed past the last checkpoint without anything left to write (skipped items).
    advanced: bool,
}

impl BatchSink {
    pub fn new(
        batch_size: usize,
        store: DurableStore,
        checkpoint: CheckpointStore,
        remote: Option<RemoteMirror>,
    ) -> Self {
        Self {
            batch: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            store,
            checkpoint,
            remote,
            advanced: false,
        }
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    pub fn add(&mut self, item: WorkItem) {
        self.batch.push(item);
        self.advanced = true;
    }

    /// Records that an item was consumed without producing output.
    pub fn note_skipped(&mut self) {
        self.advanced = true;
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn should_flush(&self, stream_exhausted: bool) -> bool {
        self.batch.len() >= self.batch_size || (stream_exhausted && self.advanced)
    }

    pub async fn flush(&mut self, global_index: usize) -> Result<FlushReport> {
        let items = self.batch.len();
        let mut total_persisted = None;
        let mut remote_key = None;

        if items > 0 {
            let total = self.store.append(&self.batch)?;
            total_persisted = Some(total);

            if let Some(remote) = &self.remote {
                let key = sequence_key(&remote.key_prefix, global_index);
                let body = serde_json::to_vec_pretty(&self.batch)?;
                if let Err(e) = upload_with_provisioning(remote.store.as_ref(), &key, body).await {
                    // The checkpoint stays behind this batch, so it must leave the store too.
                    warn!(key = %key, error = %e, "Mirror upload failed, rolling back durable append");
                    self.store.truncate(total - items)?;
                    return Err(e);
                }
                remote_key = Some(key);
            }
        }

        self.checkpoint.save(global_index)?;
        self.batch.clear();
        self.advanced = false;

        info!(
            global_index = global_index,
            items = items,
            total_persisted = ?total_persisted,
            remote_key = ?remote_key,
            "Batch flushed"
        );

        Ok(FlushReport {
            global_index,
            items,
            total_persisted,
            remote_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::remote::MemoryObjectStore;
    use crate::utils::BatchTranslatorError;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;

    struct DeniedStore;

    #[async_trait]
    impl ObjectStore for DeniedStore {
        async fn put_object(&self, _key: &str, _body: Vec<u8>) -> Result<()> {
            Err(BatchTranslatorError::RemoteStoreError("denied".into()))
        }

        async fn create_bucket(&self) -> Result<()> {
            Err(BatchTranslatorError::RemoteStoreError("denied".into()))
        }
    }

    fn item(n: usize) -> WorkItem {
        serde_json::from_value(json!({ "instruction": n.to_string() })).unwrap()
    }

    fn sink(dir: &std::path::Path, batch_size: usize, remote: Option<RemoteMirror>) -> BatchSink {
        BatchSink::new(
            batch_size,
            DurableStore::new(dir.join("trans.json")),
            CheckpointStore::new(dir.join("checkpoint.json")),
            remote,
        )
    }

    #[tokio::test]
    async fn flush_threshold() {
        let dir = tempdir().unwrap();
        let mut sink = sink(dir.path(), 2, None);
        assert!(!sink.should_flush(true));
        sink.add(item(0));
        assert!(!sink.should_flush(false));
        assert!(sink.should_flush(true));
        sink.add(item(1));
        assert!(sink.should_flush(false));
    }

    #[tokio::test]
    async fn flush_persists_then_checkpoints() {
        let dir = tempdir().unwrap();
        let mut sink = sink(dir.path(), 2, None);
        sink.add(item(0));
        sink.add(item(1));
        let report = sink.flush(1).await.unwrap();

        assert_eq!(report.items, 2);
        assert_eq!(report.total_persisted, Some(2));
        assert!(sink.is_empty());
        assert_eq!(sink.store().len().unwrap(), 2);
        assert_eq!(sink.checkpoint().resume_index().unwrap(), 2);
    }

    #[tokio::test]
    async fn mirrors_batch_to_remote_under_indexed_key() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MemoryObjectStore::new());
        let mut sink = sink(
            dir.path(),
            10,
            Some(RemoteMirror {
                store: remote.clone(),
                key_prefix: "batch_".into(),
            }),
        );
        sink.add(item(0));
        let report = sink.flush(0).await.unwrap();

        assert_eq!(report.remote_key.as_deref(), Some("batch_00000.json"));
        assert_eq!(remote.bucket_creations(), 1);
        let body: serde_json::Value =
            serde_json::from_slice(&remote.get("batch_00000.json").unwrap()).unwrap();
        assert_eq!(body, json!([{ "instruction": "0" }]));
    }

    #[tokio::test]
    async fn remote_failure_keeps_checkpoint_and_batch() {
        let dir = tempdir().unwrap();
        let mut sink = sink(
            dir.path(),
            10,
            Some(RemoteMirror {
                store: Arc::new(DeniedStore),
                key_prefix: "batch_".into(),
            }),
        );
        sink.add(item(0));
        assert!(sink.flush(0).await.is_err());
        assert_eq!(sink.checkpoint().load().unwrap(), None);
        assert_eq!(sink.len(), 1);
        assert!(sink.store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn skipped_only_flush_advances_checkpoint() {
        let dir = tempdir().unwrap();
        let mut sink = sink(dir.path(), 10, None);
        sink.note_skipped();
        assert!(sink.should_flush(true));
        let report = sink.flush(4).await.unwrap();
        assert_eq!(report.items, 0);
        assert!(sink.store().is_empty().unwrap());
        assert_eq!(sink.checkpoint().resume_index().unwrap(), 5);
    }
}
