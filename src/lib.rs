//! Batched create-instance throughput benchmark.
//!
//! A [`load_generator::LoadGenerator`] fires a fixed batch of requests at a
//! broker once per second for a fixed duration and tallies, per elapsed
//! second, how many of them completed. Runs are driven from the CLI or from
//! the HTTP control API in [`server`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod load_generator;
pub mod metrics;
pub mod middleware;
pub mod redis_client;
pub mod server;
pub mod telemetry;

use dispatch::Target;
use metrics::{FailureFeed, RunMetrics, RunSnapshot};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Broker every run dispatches to
    pub target: Arc<Target>,

    /// The current (or most recent) run.
    pub current_run: parking_lot::Mutex<Option<ActiveRun>>,

    /// Set while a run is issuing; checked by the tick loop at every tick.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned tick loop so we can await clean shutdown.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AppState {
    pub fn new(target: Target) -> Self {
        Self {
            target: Arc::new(target),
            current_run: parking_lot::Mutex::new(None),
            load_running: Arc::new(AtomicBool::new(false)),
            load_handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Snapshot of the current run including its recent failures.
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        let run = self.current_run.lock().clone()?;
        Some(run.snapshot())
    }
}

/// Accounting and failure feed of one HTTP-started run.
///
/// Each run owns its feed: completions of an earlier run that resolve after
/// a new one started still report into the earlier run's feed.
#[derive(Clone)]
pub struct ActiveRun {
    pub metrics: Arc<RunMetrics>,
    pub failures: Arc<FailureFeed>,
}

impl ActiveRun {
    pub fn snapshot(&self) -> RunSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.recent_failures = self.failures.recent();
        snapshot
    }
}

