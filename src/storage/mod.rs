//! Storage Engine
//!
//! In-memory document store and the deletion surface the TTL reaper drives.

mod collection;
mod engine;
mod error;
mod value;

pub use collection::{
    CollectionId, CollectionInfo, CollectionOptions, Document, IndexInfo, Namespace, ID_FIELD,
};
pub use engine::{DeletionExecutor, MemoryEngine, RangeDelete, ScanTarget, DEFAULT_LOCK_TIMEOUT};
pub use error::{EngineError, ExecutorError};
pub use value::{ObjectId, Value};
