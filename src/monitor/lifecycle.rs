//! TTL Monitor Lifecycle
//!
//! Owns the background thread. The thread runs a pass, then sleeps on a
//! condition variable for the pass interval; only a shutdown request wakes
//! it early. Shutdown waits for an in-flight pass to finish.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::config::MonitorConfig;
use super::error::ReaperError;
use super::pass::{MonitorDeps, PassReport, TtlPass};
use crate::metrics::TtlMetrics;

/// Monitor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed, never started
    Idle,
    Running,
    /// Shutdown requested, thread not yet joined
    ShuttingDown,
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Idle => write!(f, "idle"),
            MonitorState::Running => write!(f, "running"),
            MonitorState::ShuttingDown => write!(f, "shutting-down"),
            MonitorState::Stopped => write!(f, "stopped"),
        }
    }
}

struct StateCell {
    state: MonitorState,
    thread: Option<JoinHandle<()>>,
}

struct Shared {
    // Protects the state and the join handle
    cell: Mutex<StateCell>,
    // Signalled on every state change
    wake: Condvar,
    // Serialises background and on-demand passes
    pass_lock: Mutex<()>,
    pass: TtlPass,
    enabled: AtomicBool,
    interval: Duration,
    metrics: TtlMetrics,
}

impl Shared {
    fn run_loop(&self) {
        info!(interval = ?self.interval, "TTL monitor started");

        loop {
            if self.cell.lock().state != MonitorState::Running {
                break;
            }

            if let Err(e) = self.pass_once() {
                warn!(error = %e, "TTL pass failed");
            }

            let deadline = Instant::now() + self.interval;
            let mut cell = self.cell.lock();
            while cell.state == MonitorState::Running {
                if self.wake.wait_until(&mut cell, deadline).timed_out() {
                    break;
                }
            }
            if cell.state != MonitorState::Running {
                break;
            }
        }

        info!("TTL monitor stopped");
    }

    /// Run one pass unless the monitor is disabled
    fn pass_once(&self) -> Result<Option<PassReport>, ReaperError> {
        if !self.enabled.load(Ordering::Acquire) {
            debug!("TTL monitor disabled, skipping pass");
            return Ok(None);
        }

        let _pass = self.pass_lock.lock();
        match self.pass.run() {
            Ok(report) => {
                self.metrics.record_pass(&report);
                Ok(Some(report))
            }
            Err(e) => {
                self.metrics.record_aborted_pass();
                Err(e)
            }
        }
    }
}

/// Background TTL reaper
pub struct TtlMonitor {
    shared: Arc<Shared>,
}

impl TtlMonitor {
    pub fn new(config: MonitorConfig, deps: MonitorDeps) -> Self {
        let shared = Shared {
            cell: Mutex::new(StateCell {
                state: MonitorState::Idle,
                thread: None,
            }),
            wake: Condvar::new(),
            pass_lock: Mutex::new(()),
            pass: TtlPass::new(deps, config.exclusions),
            enabled: AtomicBool::new(config.enabled),
            interval: config.pass_interval,
            metrics: TtlMetrics::new(),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn name(&self) -> &'static str {
        "TTLMonitor"
    }

    /// Spawn the background thread. Fails if the monitor has already been
    /// started or stopped.
    pub fn start(&self) -> Result<(), ReaperError> {
        let mut cell = self.shared.cell.lock();
        if cell.state != MonitorState::Idle {
            return Err(ReaperError::AlreadyStarted { state: cell.state });
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.name().to_string())
            .spawn(move || shared.run_loop())
            .map_err(ReaperError::Spawn)?;

        cell.state = MonitorState::Running;
        cell.thread = Some(handle);
        Ok(())
    }

    /// Signal the thread to quit and wait until it has. Safe to call any
    /// number of times, from any thread, in any state.
    pub fn shutdown(&self) {
        let handle = {
            let mut cell = self.shared.cell.lock();
            match cell.state {
                MonitorState::Stopped => return,
                MonitorState::Idle => {
                    cell.state = MonitorState::Stopped;
                    self.shared.wake.notify_all();
                    return;
                }
                MonitorState::ShuttingDown => {
                    while cell.state != MonitorState::Stopped {
                        self.shared.wake.wait(&mut cell);
                    }
                    return;
                }
                MonitorState::Running => {
                    info!("Shutting down TTL monitor");
                    cell.state = MonitorState::ShuttingDown;
                    self.shared.wake.notify_all();
                    cell.thread.take()
                }
            }
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("TTL monitor thread panicked");
            }
        }

        let mut cell = self.shared.cell.lock();
        cell.state = MonitorState::Stopped;
        self.shared.wake.notify_all();
    }

    pub fn state(&self) -> MonitorState {
        self.shared.cell.lock().state
    }

    /// Toggle deletion at runtime. A disabled monitor keeps its thread but
    /// every pass is a no-op.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    pub fn pass_interval(&self) -> Duration {
        self.shared.interval
    }

    pub fn metrics(&self) -> &TtlMetrics {
        &self.shared.metrics
    }

    /// Run a pass on the calling thread. Never overlaps a background pass.
    /// Returns `None` when the monitor is disabled.
    pub fn run_pass_now(&self) -> Result<Option<PassReport>, ReaperError> {
        self.shared.pass_once()
    }
}

impl Drop for TtlMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TtlMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlMonitor")
            .field("state", &self.state())
            .field("enabled", &self.is_enabled())
            .field("interval", &self.shared.interval)
            .finish()
    }
}
