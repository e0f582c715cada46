pub mod checkpoint;
pub mod progress;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use progress::RunProgress;
