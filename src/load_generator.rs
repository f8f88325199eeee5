use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BenchmarkConfig;
use crate::dispatch::Dispatch;
use crate::error::{BenchError, DispatchError};
use crate::metrics::{ErrorSink, FailureFeed, PerSecondCounter, RunMetrics};

/// Length of one scheduling interval
const TICK: Duration = Duration::from_secs(1);

// ─── Public entry points ─────────────────────────────────────────

/// Runs a benchmark and returns its per-second counter.
///
/// The counter is returned as soon as the last batch has been issued;
/// requests still in flight keep landing in it afterwards. Failures are
/// logged through a [`FailureFeed`].
pub async fn run<D: Dispatch>(
    duration_secs: u64,
    batch_size: u64,
    dispatch_fn: D,
) -> Result<Arc<PerSecondCounter>, BenchError> {
    let generator = LoadGenerator::new(
        BenchmarkConfig::new(duration_secs, batch_size),
        Arc::new(dispatch_fn),
        Arc::new(FailureFeed::new()),
    )?;
    let metrics = generator.run(Arc::new(AtomicBool::new(true))).await;
    Ok(metrics.counter())
}

/// A validated run: configuration plus its two collaborators.
pub struct LoadGenerator<D, S> {
    config: BenchmarkConfig,
    dispatcher: Arc<D>,
    sink: Arc<S>,
}

impl<D: Dispatch, S: ErrorSink> LoadGenerator<D, S> {
    /// Fails with [`BenchError::InvalidConfig`] before anything is dispatched.
    pub fn new(
        config: BenchmarkConfig,
        dispatcher: Arc<D>,
        sink: Arc<S>,
    ) -> Result<Self, BenchError> {
        config.validate()?;
        Ok(Self {
            config,
            dispatcher,
            sink,
        })
    }

    /// Issues every tick on the current task and returns once the issuing
    /// loop exits. The run clock starts at the call.
    ///
    /// `running` is checked at each tick boundary; clearing it ends the run
    /// early. It is cleared here when issuing ends either way.
    pub async fn run(self, running: Arc<AtomicBool>) -> Arc<RunMetrics> {
        let metrics = Arc::new(RunMetrics::new(self.config, Instant::now()));
        self.issue(&metrics, &running).await;
        metrics
    }

    /// Like [`run`](Self::run) but on a spawned task; the metrics handle is
    /// available immediately.
    pub fn spawn(self, running: Arc<AtomicBool>) -> (Arc<RunMetrics>, JoinHandle<()>) {
        let metrics = Arc::new(RunMetrics::new(self.config, Instant::now()));
        let task_metrics = metrics.clone();
        let handle = tokio::spawn(async move {
            self.issue(&task_metrics, &running).await;
        });
        (metrics, handle)
    }

    // ─── Tick loop ───────────────────────────────────────────────

    async fn issue(&self, metrics: &Arc<RunMetrics>, running: &AtomicBool) {
        let started_at = metrics.started_at();
        let deadline = started_at + Duration::from_secs(self.config.duration_secs);
        let mut tick_start = started_at;

        info!(
            duration_secs = self.config.duration_secs,
            batch_size = self.config.batch_size,
            "benchmark started"
        );

        for tick in 0..self.config.duration_secs as usize {
            if !running.load(Ordering::SeqCst) {
                info!(tick, "benchmark cancelled");
                break;
            }
            if Instant::now() >= deadline {
                break;
            }

            self.issue_batch(tick, metrics);

            // Sleep to the next tick boundary, never past the deadline. A tick
            // that overran starts the next one right away; missed ticks are
            // not made up.
            let next = (tick_start + TICK).min(deadline);
            let now = Instant::now();
            if now < next {
                tokio::time::sleep_until(next).await;
                tick_start = next;
            } else {
                warn!(
                    tick,
                    overrun_ms = (now - next).as_millis() as u64,
                    "issuing took longer than one tick"
                );
                tick_start = now;
            }
        }

        metrics.finish_issuing();
        running.store(false, Ordering::SeqCst);

        let counter = metrics.counter();
        info!(
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            dispatched = counter.total_dispatched(),
            completed = counter.total_completed(),
            failed = counter.total_failed(),
            "issuing finished"
        );
    }

    /// Fires `batch_size` requests back-to-back without awaiting any of them.
    fn issue_batch(&self, tick: usize, metrics: &Arc<RunMetrics>) {
        for _ in 0..self.config.batch_size {
            // latency includes the time spent inside dispatch()
            let issued_at = Instant::now();
            let pending = PendingRequest {
                future: self.dispatcher.dispatch(),
                issued_at,
            };
            metrics.record_dispatched(tick);
            tokio::spawn(pending.resolve(metrics.clone(), self.sink.clone()));
        }
        debug!(tick, batch_size = self.config.batch_size, "batch issued");
    }
}

// ─── Pending request ─────────────────────────────────────────────

/// One dispatched request awaiting its outcome. Consumed by its own
/// completion task.
struct PendingRequest<F> {
    future: F,
    issued_at: Instant,
}

impl<F> PendingRequest<F>
where
    F: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    /// Attributes the outcome to the second in which it *resolved*.
    async fn resolve<S: ErrorSink>(self, metrics: Arc<RunMetrics>, sink: Arc<S>) {
        let outcome = self.future.await;
        let now = Instant::now();

        match outcome {
            Ok(()) => {
                metrics.record_success(now, now - self.issued_at);
            }
            Err(error) => {
                let second = metrics.record_failure(now);
                let elapsed = now.saturating_duration_since(metrics.started_at());
                sink.report(second, elapsed, &error);
            }
        }
    }
}
