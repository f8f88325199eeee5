use std::time::Duration;

use rand::Rng;

use super::{Dispatch, DispatchFuture};
use crate::error::DispatchError;

/// In-process stand-in for a broker.
///
/// Each request resolves after a uniformly random latency and fails with
/// probability `failure_pct / 100`.
#[derive(Debug, Clone)]
pub struct SimulatedDispatcher {
    min_latency: Duration,
    max_latency: Duration,
    failure_pct: u8,
}

impl SimulatedDispatcher {
    pub fn new(min_latency: Duration, max_latency: Duration, failure_pct: u8) -> Self {
        Self {
            min_latency,
            // an inverted range collapses to a fixed latency
            max_latency: max_latency.max(min_latency),
            failure_pct: failure_pct.min(100),
        }
    }

    /// Resolves immediately and always succeeds.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0)
    }
}

impl Dispatch for SimulatedDispatcher {
    type Future = DispatchFuture;

    fn dispatch(&self) -> DispatchFuture {
        let mut rng = rand::thread_rng();
        let latency_us = rng.gen_range(
            self.min_latency.as_micros() as u64..=self.max_latency.as_micros() as u64,
        );
        let fail = rng.gen_range(0u8..100) < self.failure_pct;

        Box::pin(async move {
            if latency_us > 0 {
                tokio::time::sleep(Duration::from_micros(latency_us)).await;
            }
            if fail {
                Err(DispatchError::Rejected("simulated broker failure".into()))
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn latency_stays_within_range() {
        let dispatcher = SimulatedDispatcher::new(
            Duration::from_millis(20),
            Duration::from_millis(40),
            0,
        );
        for _ in 0..20 {
            let t0 = Instant::now();
            dispatcher.dispatch().await.unwrap();
            let took = t0.elapsed();
            assert!(took >= Duration::from_millis(20), "{took:?}");
            assert!(took <= Duration::from_millis(41), "{took:?}");
        }
    }

    #[tokio::test]
    async fn full_failure_rate_always_fails() {
        let dispatcher = SimulatedDispatcher::new(Duration::ZERO, Duration::ZERO, 100);
        for _ in 0..10 {
            assert!(dispatcher.dispatch().await.is_err());
        }
    }

    #[tokio::test]
    async fn inverted_range_is_accepted() {
        let dispatcher = SimulatedDispatcher::new(
            Duration::from_millis(2),
            Duration::from_millis(1),
            0,
        );
        assert!(dispatcher.dispatch().await.is_ok());
    }
}
