pub mod simulated;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use clap::{Args, ValueEnum};
use tracing::info;

use crate::error::{BenchError, DispatchError};
use crate::redis_client::{self, RedisDispatcher};

pub use simulated::SimulatedDispatcher;

/// Boxed completion handle returned by the concrete targets.
pub type DispatchFuture =
    Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'static>>;

// ─── Dispatch collaborator ───────────────────────────────────────

/// Issues one "start work item" request.
///
/// `dispatch` must return immediately; the returned future resolves once the
/// broker has answered. It is called repeatedly while earlier futures are
/// still outstanding.
pub trait Dispatch: Send + Sync + 'static {
    type Future: Future<Output = Result<(), DispatchError>> + Send + 'static;

    fn dispatch(&self) -> Self::Future;
}

impl<F, Fut> Dispatch for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    type Future = Fut;

    fn dispatch(&self) -> Fut {
        self()
    }
}

// ─── Configured target ───────────────────────────────────────────

/// The broker a run is pointed at.
pub enum Target {
    Simulated(SimulatedDispatcher),
    Redis(RedisDispatcher),
}

impl Dispatch for Target {
    type Future = DispatchFuture;

    fn dispatch(&self) -> DispatchFuture {
        match self {
            Self::Simulated(d) => d.dispatch(),
            Self::Redis(d) => d.dispatch(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetKind {
    /// In-process broker with random latency and failures
    Simulated,
    /// Create-instance commands appended to a Redis stream
    Redis,
}

/// Target selection flags shared by `run` and `serve`.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    #[arg(long, env = "INSTANCE_BENCH_TARGET", value_enum, default_value_t = TargetKind::Simulated)]
    pub target: TargetKind,

    #[arg(long, env = "INSTANCE_BENCH_REDIS_URL", default_value = "redis://127.0.0.1:6379/")]
    pub redis_url: String,

    /// Stream receiving create-instance commands
    #[arg(long, env = "INSTANCE_BENCH_STREAM", default_value = "bench:create-instance")]
    pub stream: String,

    /// Process the created instances belong to
    #[arg(long, env = "INSTANCE_BENCH_PROCESS_ID", default_value = "simpleProcess")]
    pub process_id: String,

    #[arg(long, env = "INSTANCE_BENCH_MIN_LATENCY_MS", default_value_t = 5)]
    pub min_latency_ms: u64,

    #[arg(long, env = "INSTANCE_BENCH_MAX_LATENCY_MS", default_value_t = 50)]
    pub max_latency_ms: u64,

    /// Share of simulated requests that fail (0–100)
    #[arg(long, env = "INSTANCE_BENCH_FAILURE_PCT", default_value_t = 0)]
    pub failure_pct: u8,
}

impl TargetArgs {
    pub async fn connect(&self) -> Result<Target, BenchError> {
        match self.target {
            TargetKind::Simulated => {
                if self.failure_pct > 100 {
                    return Err(BenchError::InvalidConfig(
                        "failure_pct must be between 0 and 100".into(),
                    ));
                }
                info!(
                    min_latency_ms = self.min_latency_ms,
                    max_latency_ms = self.max_latency_ms,
                    failure_pct = self.failure_pct,
                    "using simulated broker"
                );
                Ok(Target::Simulated(SimulatedDispatcher::new(
                    Duration::from_millis(self.min_latency_ms),
                    Duration::from_millis(self.max_latency_ms),
                    self.failure_pct,
                )))
            }
            TargetKind::Redis => {
                info!(url = %self.redis_url, stream = %self.stream, "connecting to redis");
                let conn = redis_client::connect(&self.redis_url).await?;
                Ok(Target::Redis(RedisDispatcher::new(
                    conn,
                    &self.stream,
                    &self.process_id,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn closures_are_dispatchers() {
        let calls = Arc::new(AtomicU64::new(0));
        let counted = calls.clone();
        let dispatcher = move || {
            counted.fetch_add(1, Ordering::Relaxed);
            async { Ok::<(), DispatchError>(()) }
        };

        let pending = dispatcher.dispatch();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(pending.await.is_ok());
    }

    #[tokio::test]
    async fn simulated_target_rejects_bad_failure_pct() {
        let args = TargetArgs {
            target: TargetKind::Simulated,
            redis_url: String::new(),
            stream: String::new(),
            process_id: String::new(),
            min_latency_ms: 0,
            max_latency_ms: 0,
            failure_pct: 101,
        };
        assert!(matches!(
            args.connect().await,
            Err(BenchError::InvalidConfig(_))
        ));
    }
}
