//! TTL Reaper - Background document expiration for a document store
//!
//! Periodically deletes expired documents from collections carrying TTL
//! rules, either through a secondary date index or through a bounded scan
//! over a clustered collection's key.

pub mod catalog;
pub mod clock;
pub mod metrics;
pub mod monitor;
pub mod storage;

pub use catalog::{BoundKind, ExpirationCatalog, TtlCollectionCache, TtlSpec, TtlStrategy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics::TtlMetrics;
pub use monitor::{
    shutdown_ttl_monitor, start_ttl_monitor, MonitorConfig, MonitorDeps, MonitorState,
    ReaperError, ServiceContext, TtlMonitor,
};
pub use storage::{CollectionId, DeletionExecutor, Document, MemoryEngine, Namespace, Value};
