//! Checkpointed batch pipeline.
//!
//! Items are read from the last checkpoint onward, translated in groups of
//! `concurrency` tasks, put back into input order, and handed to the
//! [`BatchSink`]. Every flush persists the batch before the checkpoint moves,
//! so a crash at any point resumes from the last completed flush.

pub mod resequencer;

pub use resequencer::Resequencer;

use crate::state::{CheckpointStore, RunProgress};
use crate::storage::{BatchSink, DurableStore, ItemReader, ObjectStore, RemoteMirror};
use crate::translation::{
    ItemReport, ItemTranslator, RateLimiter, RetryPolicy, RetryingInvoker, TextChunker,
    TranslationEngine, TranslationMemo,
};
use crate::utils::{AppConfig, BatchTranslatorError, ItemFailurePolicy, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Streaming,
    Flushing,
    Done,
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Streaming => write!(f, "streaming"),
            PipelineState::Flushing => write!(f, "flushing"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency: usize,
    /// Exclusive upper bound on stream indices to process.
    pub total_items: Option<usize>,
    pub item_policy: ItemFailurePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub start_index: usize,
    pub processed: usize,
    /// Checkpoint value written by each flush, in order.
    pub flushes: Vec<usize>,
    pub skipped: Vec<usize>,
    pub degraded_fields: usize,
    pub last_checkpoint: Option<usize>,
    pub cancelled: bool,
}

pub struct Pipeline {
    translator: Arc<ItemTranslator>,
    reader: ItemReader,
    sink: BatchSink,
    options: PipelineOptions,
    stop: Option<watch::Receiver<bool>>,
    state: PipelineState,
    run_id: String,
}

impl Pipeline {
    pub fn new(
        translator: ItemTranslator,
        reader: ItemReader,
        sink: BatchSink,
        options: PipelineOptions,
    ) -> Self {
        Self {
            translator: Arc::new(translator),
            reader,
            sink,
            options: PipelineOptions {
                concurrency: options.concurrency.max(1),
                ..options
            },
            stop: None,
            state: PipelineState::Idle,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Wires every component from configuration around `engine`.
    pub fn from_config(
        config: &AppConfig,
        engine: Arc<dyn TranslationEngine>,
        remote: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(config.rate_limit.min_interval_ms),
            Duration::from_millis(config.rate_limit.max_interval_ms),
        ));
        let invoker = RetryingInvoker::new(
            engine,
            limiter,
            RetryPolicy::from_config(&config.retry),
            config.call_timeout(),
        );
        let translator = ItemTranslator::new(
            invoker,
            TextChunker::new(config.chunking.max_chunk_len),
            TranslationMemo::new(config.items.memo_capacity),
            config.items.source_fields.clone(),
            config.items.target_prefix.clone(),
            config.pipeline.field_failure_policy,
        );
        let sink = BatchSink::new(
            config.pipeline.batch_size,
            DurableStore::new(&config.pipeline.output_file),
            CheckpointStore::new(&config.pipeline.checkpoint_file),
            remote.map(|store| RemoteMirror {
                store,
                key_prefix: config.remote.key_prefix.clone(),
            }),
        );

        Self::new(
            translator,
            ItemReader::new(&config.pipeline.input_file),
            sink,
            PipelineOptions {
                concurrency: config.concurrency(),
                total_items: config.pipeline.total_items,
                item_policy: config.pipeline.item_failure_policy,
            },
        )
    }

    /// Forgets all progress: the checkpoint goes first, then the output file.
    pub fn reset(config: &AppConfig) -> Result<()> {
        CheckpointStore::new(&config.pipeline.checkpoint_file).clear()?;
        DurableStore::new(&config.pipeline.output_file).clear()
    }

    /// Checked before each group of items starts; in-flight calls finish.
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        match self.stream().await {
            Ok(summary) => {
                self.transition(PipelineState::Done);
                info!(
                    run_id = %self.run_id,
                    processed = summary.processed,
                    flushes = summary.flushes.len(),
                    skipped = summary.skipped.len(),
                    last_checkpoint = ?summary.last_checkpoint,
                    cancelled = summary.cancelled,
                    "Run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(PipelineState::Aborted);
                error!(
                    run_id = %self.run_id,
                    error = %e,
                    "Run aborted, checkpoint left at last successful flush"
                );
                Err(e)
            }
        }
    }

    async fn stream(&mut self) -> Result<RunSummary> {
        let start = self.sink.checkpoint().resume_index()?;
        let end = self.options.total_items.unwrap_or(usize::MAX);
        let total = match self.options.total_items {
            Some(total) => Some(total),
            None => self.reader.count_items().ok(),
        };

        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            start_index: start,
            processed: 0,
            flushes: Vec::new(),
            skipped: Vec::new(),
            degraded_fields: 0,
            last_checkpoint: None,
            cancelled: false,
        };
        let mut progress = RunProgress::new(start, total);

        self.transition(PipelineState::Streaming);
        info!(run_id = %self.run_id, start_index = start, total = ?total, "Resuming stream");

        let mut items = self.reader.iter_from(start)?;
        let mut reseq: Resequencer<Result<ItemReport>> = Resequencer::new(start);
        let mut next_index = start;
        let mut last_consumed = None;
        let mut exhausted = false;

        while !exhausted {
            if self.stop_requested() {
                info!(run_id = %self.run_id, next_index = next_index, "Stop requested");
                summary.cancelled = true;
                break;
            }

            let mut tasks = JoinSet::new();
            let mut group_error = None;
            let mut group_len = 0;
            while group_len < self.options.concurrency {
                if next_index >= end {
                    exhausted = true;
                    break;
                }
                match items.next() {
                    None => {
                        exhausted = true;
                        break;
                    }
                    Some(Ok((index, item))) => {
                        let translator = self.translator.clone();
                        tasks.spawn(async move { (index, translator.translate(index, item).await) });
                    }
                    Some(Err(e)) if e.is_item_level() => reseq.push(next_index, Err(e)),
                    Some(Err(e)) => {
                        group_error = Some(e);
                        break;
                    }
                }
                next_index += 1;
                group_len += 1;
            }

            // Started calls run to completion even when the group is already lost.
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result)) => reseq.push(index, result),
                    Err(e) => {
                        group_error.get_or_insert_with(|| {
                            BatchTranslatorError::Fatal(format!("translation task failed: {}", e))
                        });
                    }
                }
            }
            if let Some(e) = group_error {
                return Err(e);
            }

            while let Some((index, result)) = reseq.pop_ready() {
                last_consumed = Some(index);
                match result {
                    Ok(report) => {
                        if !report.degraded_fields.is_empty() {
                            progress.degraded_fields += report.degraded_fields.len();
                            summary.degraded_fields += report.degraded_fields.len();
                        }
                        self.sink.add(report.item);
                        progress.processed += 1;
                    }
                    Err(e) if e.is_item_level() && self.options.item_policy == ItemFailurePolicy::Skip => {
                        error!(run_id = %self.run_id, index = index, error = %e, "Skipping item");
                        summary.skipped.push(index);
                        self.sink.note_skipped();
                        progress.skipped += 1;
                    }
                    Err(e) => {
                        error!(run_id = %self.run_id, index = index, error = %e, "Item failed");
                        return Err(e);
                    }
                }

                if self.sink.should_flush(false) {
                    self.flush(index, &mut summary, &mut progress).await?;
                }
            }
        }

        if let Some(index) = last_consumed {
            if self.sink.should_flush(true) {
                self.flush(index, &mut summary, &mut progress).await?;
            }
        }

        summary.processed = progress.processed;
        summary.last_checkpoint = self
            .sink
            .checkpoint()
            .load()?
            .map(|c| c.last_processed_index);
        Ok(summary)
    }

    async fn flush(
        &mut self,
        global_index: usize,
        summary: &mut RunSummary,
        progress: &mut RunProgress,
    ) -> Result<()> {
        self.transition(PipelineState::Flushing);
        self.sink.flush(global_index).await?;
        summary.flushes.push(global_index);
        progress.flushes += 1;
        progress.log();
        self.transition(PipelineState::Streaming);
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(run_id = %self.run_id, from = %self.state, to = %next, "Pipeline state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::EngineOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct EchoEngine;

    #[async_trait]
    impl TranslationEngine for EchoEngine {
        async fn submit(&self, text: &str) -> EngineOutcome {
            EngineOutcome::Translated(format!("<{}>", text))
        }
    }

    fn config(dir: &std::path::Path, lines: usize) -> AppConfig {
        let input = dir.join("data.jsonl");
        let body: String = (0..lines)
            .map(|i| {
                format!(
                    "{{\"instruction\": \"q{}\", \"context\": \"\", \"response\": \"a{}\"}}\n",
                    i, i
                )
            })
            .collect();
        std::fs::write(&input, body).unwrap();

        let mut config = AppConfig::default();
        config.pipeline.input_file = input;
        config.pipeline.output_file = dir.join("trans.json");
        config.pipeline.checkpoint_file = dir.join("checkpoint.json");
        config.pipeline.batch_size = 4;
        config.rate_limit.min_interval_ms = 0;
        config.rate_limit.max_interval_ms = 0;
        config
    }

    /// Panics on `q3`; every other call sleeps briefly and is counted.
    #[derive(Default)]
    struct PanickyEngine {
        completed: AtomicUsize,
    }

    #[async_trait]
    impl TranslationEngine for PanickyEngine {
        async fn submit(&self, text: &str) -> EngineOutcome {
            if text == "q3" {
                panic!("engine crashed on {}", text);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            EngineOutcome::Translated(text.to_string())
        }
    }

    #[tokio::test]
    async fn failed_task_lets_rest_of_group_finish() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), 6);
        config.pipeline.concurrency = Some(6);
        let engine = Arc::new(PanickyEngine::default());
        let mut pipeline = Pipeline::from_config(&config, engine.clone(), None);

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, BatchTranslatorError::Fatal(_)));
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        // Five surviving items, two non-empty fields each.
        assert_eq!(engine.completed.load(Ordering::SeqCst), 10);
        let checkpoint = CheckpointStore::new(&config.pipeline.checkpoint_file);
        assert_eq!(checkpoint.load().unwrap(), None);
    }

    #[tokio::test]
    async fn stop_before_start_processes_nothing() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), 6);
        let (tx, rx) = watch::channel(true);
        let mut pipeline =
            Pipeline::from_config(&config, Arc::new(EchoEngine), None).with_stop_signal(rx);

        let summary = pipeline.run().await.unwrap();
        drop(tx);
        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.last_checkpoint, None);
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn total_items_bounds_the_run() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), 10);
        config.pipeline.total_items = Some(6);
        let mut pipeline = Pipeline::from_config(&config, Arc::new(EchoEngine), None);

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.processed, 6);
        assert_eq!(summary.flushes, vec![3, 5]);
        assert_eq!(summary.last_checkpoint, Some(5));
    }

    #[tokio::test]
    async fn small_concurrency_keeps_order() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), 7);
        config.pipeline.concurrency = Some(3);
        let mut pipeline = Pipeline::from_config(&config, Arc::new(EchoEngine), None);
        pipeline.run().await.unwrap();

        let stored = DurableStore::new(&config.pipeline.output_file).load().unwrap();
        let answers: Vec<_> = stored
            .iter()
            .map(|i| i.get_str("sh_response").unwrap().to_string())
            .collect();
        let expected: Vec<_> = (0..7).map(|i| format!("<a{}>", i)).collect();
        assert_eq!(answers, expected);
    }
}
