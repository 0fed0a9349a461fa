//! Service Context
//!
//! Process-level owner of the TTL monitor. Handed explicitly to whatever
//! needs to start, stop or inspect the monitor.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use super::config::MonitorConfig;
use super::error::ReaperError;
use super::lifecycle::{MonitorState, TtlMonitor};
use super::pass::MonitorDeps;

/// Holds the process's monitor instance
#[derive(Debug, Default)]
pub struct ServiceContext {
    ttl_monitor: Mutex<Option<Arc<TtlMonitor>>>,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TtlMonitor {
    /// Monitor registered on `ctx`, if any
    pub fn get(ctx: &ServiceContext) -> Option<Arc<TtlMonitor>> {
        ctx.ttl_monitor.lock().clone()
    }

    /// Replace the registered monitor. The caller shuts down any previous
    /// instance first.
    pub fn set(ctx: &ServiceContext, monitor: Option<Arc<TtlMonitor>>) {
        *ctx.ttl_monitor.lock() = monitor;
    }
}

/// Start the TTL monitor on `ctx`, creating and registering one if needed.
/// Safe to call again after [`shutdown_ttl_monitor`]; a running monitor is
/// left as is.
pub fn start_ttl_monitor(
    ctx: &ServiceContext,
    config: MonitorConfig,
    deps: MonitorDeps,
) -> Result<Arc<TtlMonitor>, ReaperError> {
    let mut slot = ctx.ttl_monitor.lock();

    if let Some(existing) = slot.as_ref() {
        match existing.state() {
            MonitorState::Running => return Ok(Arc::clone(existing)),
            MonitorState::Idle => {
                existing.start()?;
                return Ok(Arc::clone(existing));
            }
            // The old thread must be gone before a new one starts
            MonitorState::ShuttingDown | MonitorState::Stopped => existing.shutdown(),
        }
    }

    let monitor = Arc::new(TtlMonitor::new(config, deps));
    monitor.start()?;
    info!(interval = ?monitor.pass_interval(), "Registered TTL monitor");
    *slot = Some(Arc::clone(&monitor));
    Ok(monitor)
}

/// Shut down the registered TTL monitor, if any. Safe to call any number
/// of times.
pub fn shutdown_ttl_monitor(ctx: &ServiceContext) {
    if let Some(monitor) = TtlMonitor::get(ctx) {
        monitor.shutdown();
    }
}
