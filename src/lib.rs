pub mod pipeline;
pub mod state;
pub mod storage;
pub mod translation;
pub mod utils;

pub use pipeline::{Pipeline, PipelineOptions, PipelineState, RunSummary};
pub use state::{Checkpoint, CheckpointStore, RunProgress};
pub use storage::{BatchSink, DurableStore, ItemReader, ObjectStore, RemoteMirror};
pub use translation::{
    HttpTranslationEngine, ItemTranslator, RateLimiter, RetryingInvoker, TextChunker,
    TranslationEngine, WorkItem,
};
pub use utils::{AppConfig, BatchTranslatorError, Result};
