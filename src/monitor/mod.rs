//! TTL Monitor
//!
//! Background reaper that periodically deletes expired documents from every
//! collection registered in the expiration catalog.

mod collscan_delete;
mod config;
mod error;
mod index_delete;
mod lifecycle;
mod pass;
mod service;

pub use collscan_delete::{delete_expired_with_collscan, expired_key_range};
pub use config::{Exclusion, ExclusionFn, MonitorConfig, DEFAULT_PASS_INTERVAL};
pub use error::ReaperError;
pub use index_delete::delete_expired_with_index;
pub use lifecycle::{MonitorState, TtlMonitor};
pub use pass::{MonitorDeps, PassReport, SkipReason, SpecOutcome, TtlPass};
pub use service::{shutdown_ttl_monitor, start_ttl_monitor, ServiceContext};
