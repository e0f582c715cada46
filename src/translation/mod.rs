pub mod cache;
pub mod chunker;
pub mod engine;
pub mod item;
pub mod rate_limiter;
pub mod retry;

pub use cache::TranslationMemo;
pub use chunker::{Chunk, TextChunker};
pub use engine::{EngineError, EngineOutcome, HttpTranslationEngine, TranslationEngine};
pub use item::{ItemReport, ItemTranslator, WorkItem};
pub use rate_limiter::RateLimiter;
pub use retry::{InvokeOutcome, RetryPolicy, RetryingInvoker};
