pub mod reader;
pub mod remote;
pub mod sink;
pub mod writer;

pub use reader::{InputFormat, ItemIterator, ItemReader};
pub use remote::{upload_with_provisioning, HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use sink::{BatchSink, FlushReport, RemoteMirror};
pub use writer::DurableStore;
