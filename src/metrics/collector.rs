use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use super::counter::{PerSecondCounter, SecondRow};
use super::failures::FailureRecord;
use super::percentiles::PercentileSet;
use crate::config::BenchmarkConfig;

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Latency distribution bucket boundaries (μs). Broker round-trips sit
/// in the low milliseconds; the tail goes into the overflow bucket.
const DIST_BOUNDARIES: &[u64] = &[
    500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 250_000,
    500_000, 1_000_000, 5_000_000,
];

// ─── Public types ────────────────────────────────────────────────

/// All accounting for one run. Shared between the tick loop, every
/// completion task, and whoever reads snapshots.
pub struct RunMetrics {
    config: BenchmarkConfig,
    started_wall: DateTime<Utc>,
    counter: Arc<PerSecondCounter>,
    latency: Mutex<Histogram<u64>>,
    issuing: AtomicBool,
    issuing_ended: Mutex<Option<Instant>>,
}

/// A bucket in the latency distribution histogram.
#[derive(Debug, Clone, Serialize)]
pub struct DistBucket {
    pub range_start_us: u64,
    pub range_end_us: u64,
    pub count: u64,
}

/// Serializable view of a run, shipped over HTTP and printed by the CLI.
///
/// Taken while completions may still be arriving: totals only grow.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub config: BenchmarkConfig,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub issuing: bool,
    pub per_second: Vec<SecondRow>,

    pub total_dispatched: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub in_flight: u64,
    /// Successful completions per second over the issuing window
    pub completions_per_sec: f64,

    pub latency: PercentileSet,
    pub distribution: Vec<DistBucket>,
    pub recent_failures: Vec<FailureRecord>,
}

// ─── RunMetrics impl ─────────────────────────────────────────────

impl RunMetrics {
    /// `started_at` anchors bucket 0.
    pub fn new(config: BenchmarkConfig, started_at: Instant) -> Self {
        Self {
            config,
            started_wall: Utc::now(),
            counter: Arc::new(PerSecondCounter::new(config.duration_secs, started_at)),
            latency: Mutex::new(
                Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                    .expect("static histogram bounds are valid"),
            ),
            issuing: AtomicBool::new(true),
            issuing_ended: Mutex::new(None),
        }
    }

    pub fn counter(&self) -> Arc<PerSecondCounter> {
        self.counter.clone()
    }

    pub fn started_at(&self) -> Instant {
        self.counter.started_at()
    }

    pub fn is_issuing(&self) -> bool {
        self.issuing.load(Ordering::Acquire)
    }

    pub(crate) fn record_dispatched(&self, tick: usize) {
        self.counter.record_dispatched(tick);
    }

    /// Returns the bucket the success landed in.
    pub(crate) fn record_success(&self, at: Instant, latency: Duration) -> usize {
        let us = (latency.as_micros() as u64).clamp(HIST_LOW, HIST_HIGH);
        let _ = self.latency.lock().record(us);
        self.counter.record_success(at)
    }

    /// Returns the bucket the failure landed in.
    pub(crate) fn record_failure(&self, at: Instant) -> usize {
        self.counter.record_failure(at)
    }

    pub(crate) fn finish_issuing(&self) {
        *self.issuing_ended.lock() = Some(Instant::now());
        self.issuing.store(false, Ordering::Release);
    }

    /// Build a read-only snapshot. `recent_failures` is left empty; callers
    /// holding the run's failure feed fill it in.
    pub fn snapshot(&self) -> RunSnapshot {
        let elapsed_secs = self.started_at().elapsed().as_secs_f64();

        // Throughput is measured over the issuing window once it has ended,
        // so a long drain doesn't dilute it.
        let window_secs = match *self.issuing_ended.lock() {
            Some(ended) => ended
                .saturating_duration_since(self.started_at())
                .as_secs_f64(),
            None => elapsed_secs,
        };
        let total_completed = self.counter.total_completed();
        let completions_per_sec = if window_secs > 0.0 {
            total_completed as f64 / window_secs
        } else {
            0.0
        };

        let hist = self.latency.lock();

        RunSnapshot {
            config: self.config,
            started_at: self.started_wall,
            elapsed_secs,
            issuing: self.is_issuing(),
            per_second: self.counter.rows(),

            total_dispatched: self.counter.total_dispatched(),
            total_completed,
            total_failed: self.counter.total_failed(),
            in_flight: self.counter.in_flight(),
            completions_per_sec,

            latency: PercentileSet::from_histogram(&hist),
            distribution: compute_distribution(&hist),
            recent_failures: Vec::new(),
        }
    }
}

// ─── Distribution histogram for the bar chart ────────────────────

fn compute_distribution(hist: &Histogram<u64>) -> Vec<DistBucket> {
    if hist.len() == 0 {
        return Vec::new();
    }

    let bounds = DIST_BOUNDARIES;
    // +1 for overflow
    let mut counts = vec![0u64; bounds.len() + 1];

    for iv in hist.iter_recorded() {
        let val = iv.value_iterated_to();
        // first boundary >= val; past the end means overflow
        let idx = bounds.partition_point(|&b| b < val);
        counts[idx] += iv.count_at_value();
    }

    let mut result = Vec::with_capacity(counts.len());
    let mut prev = 0u64;
    for (&boundary, &count) in bounds.iter().zip(&counts) {
        if count > 0 {
            result.push(DistBucket {
                range_start_us: prev,
                range_end_us: boundary,
                count,
            });
        }
        prev = boundary;
    }
    let overflow = counts[bounds.len()];
    if overflow > 0 {
        result.push(DistBucket {
            range_start_us: prev,
            range_end_us: hist.max(),
            count: overflow,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_outcomes() {
        let start = Instant::now();
        let metrics = RunMetrics::new(BenchmarkConfig::new(3, 4), start);
        for _ in 0..4 {
            metrics.record_dispatched(0);
        }
        metrics.record_success(start, Duration::from_millis(3));
        metrics.record_success(start + Duration::from_secs(2), Duration::from_millis(7));
        metrics.record_failure(start + Duration::from_secs(1));

        let snap = metrics.snapshot();
        assert!(snap.issuing);
        assert_eq!(snap.total_dispatched, 4);
        assert_eq!(snap.total_completed, 2);
        assert_eq!(snap.total_failed, 1);
        assert_eq!(snap.in_flight, 1);
        assert_eq!(
            snap.per_second.iter().map(|r| r.completed).collect::<Vec<_>>(),
            vec![1, 0, 1]
        );
        assert_eq!(snap.latency.count, 2);
        assert_eq!(snap.distribution.iter().map(|b| b.count).sum::<u64>(), 2);
    }

    #[test]
    fn finish_issuing_flips_flag() {
        let metrics = RunMetrics::new(BenchmarkConfig::new(1, 1), Instant::now());
        metrics.finish_issuing();
        assert!(!metrics.is_issuing());
        assert!(!metrics.snapshot().issuing);
    }

    #[test]
    fn distribution_places_values_by_boundary() {
        let mut hist =
            Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG).unwrap();
        hist.record(400).unwrap();
        hist.record(1_000).unwrap();
        hist.record(30_000_000).unwrap();

        let dist = compute_distribution(&hist);
        assert_eq!(dist.len(), 3);
        assert_eq!((dist[0].range_start_us, dist[0].range_end_us), (0, 500));
        assert_eq!((dist[1].range_start_us, dist[1].range_end_us), (500, 1_000));
        assert_eq!(dist[2].range_start_us, 5_000_000);
        assert_eq!(dist[2].count, 1);
    }

    #[test]
    fn empty_histogram_has_no_distribution() {
        let hist =
            Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG).unwrap();
        assert!(compute_distribution(&hist).is_empty());
    }
}
