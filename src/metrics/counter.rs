use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::time::Instant;

/// Per-second outcome accounting for one run.
///
/// One bucket per second of the configured duration. Completions are
/// attributed to the second in which they *resolved*, measured from the run
/// start and clamped into the last bucket when they arrive after the nominal
/// window. Every slot is its own atomic, so concurrent completion tasks never
/// contend on a lock and never lose an increment.
#[derive(Debug)]
pub struct PerSecondCounter {
    started_at: Instant,
    buckets: Box<[Bucket]>,
}

#[derive(Debug, Default)]
struct Bucket {
    /// Requests issued during this tick (by issue time)
    dispatched: AtomicU64,
    /// Successful completions during this second (by completion time)
    completed: AtomicU64,
    /// Failed completions during this second (by completion time)
    failed: AtomicU64,
}

/// Read-only view of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecondRow {
    pub second: usize,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
}

impl PerSecondCounter {
    /// `duration_secs` is the bucket count; zero is treated as one so that
    /// clamping always has a target.
    pub fn new(duration_secs: u64, started_at: Instant) -> Self {
        let len = duration_secs.max(1) as usize;
        Self {
            started_at,
            buckets: (0..len).map(|_| Bucket::default()).collect(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// `floor(at - start)` in whole seconds, clamped to `[0, len-1]`.
    pub fn bucket_index(&self, at: Instant) -> usize {
        let secs = at.saturating_duration_since(self.started_at).as_secs();
        usize::try_from(secs)
            .unwrap_or(usize::MAX)
            .min(self.buckets.len() - 1)
    }

    pub fn record_dispatched(&self, tick: usize) {
        let idx = tick.min(self.buckets.len() - 1);
        self.buckets[idx].dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the bucket the success was attributed to.
    pub fn record_success(&self, at: Instant) -> usize {
        let idx = self.bucket_index(at);
        self.buckets[idx].completed.fetch_add(1, Ordering::Relaxed);
        idx
    }

    /// Returns the bucket the failure was attributed to.
    pub fn record_failure(&self, at: Instant) -> usize {
        let idx = self.bucket_index(at);
        self.buckets[idx].failed.fetch_add(1, Ordering::Relaxed);
        idx
    }

    pub fn completed(&self, second: usize) -> u64 {
        self.buckets
            .get(second)
            .map_or(0, |b| b.completed.load(Ordering::Relaxed))
    }

    pub fn failed(&self, second: usize) -> u64 {
        self.buckets
            .get(second)
            .map_or(0, |b| b.failed.load(Ordering::Relaxed))
    }

    pub fn total_dispatched(&self) -> u64 {
        self.sum(|b| &b.dispatched)
    }

    pub fn total_completed(&self) -> u64 {
        self.sum(|b| &b.completed)
    }

    pub fn total_failed(&self) -> u64 {
        self.sum(|b| &b.failed)
    }

    /// Requests issued but not yet resolved either way.
    pub fn in_flight(&self) -> u64 {
        self.total_dispatched()
            .saturating_sub(self.total_completed() + self.total_failed())
    }

    /// Point-in-time copy of every bucket. Slots are read independently,
    /// so rows may be mutually inconsistent by in-flight completions.
    pub fn rows(&self) -> Vec<SecondRow> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(second, b)| SecondRow {
                second,
                dispatched: b.dispatched.load(Ordering::Relaxed),
                completed: b.completed.load(Ordering::Relaxed),
                failed: b.failed.load(Ordering::Relaxed),
            })
            .collect()
    }

    fn sum(&self, field: impl Fn(&Bucket) -> &AtomicU64) -> u64 {
        self.buckets
            .iter()
            .map(|b| field(b).load(Ordering::Relaxed))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn index_is_floor_of_elapsed_seconds() {
        let start = Instant::now();
        let counter = PerSecondCounter::new(5, start);

        assert_eq!(counter.bucket_index(start), 0);
        assert_eq!(counter.bucket_index(start + Duration::from_millis(999)), 0);
        assert_eq!(counter.bucket_index(start + Duration::from_millis(1_000)), 1);
        assert_eq!(counter.bucket_index(start + Duration::from_millis(3_500)), 3);
    }

    #[test]
    fn late_completions_land_in_last_bucket() {
        let start = Instant::now();
        let counter = PerSecondCounter::new(3, start);

        assert_eq!(counter.record_success(start + Duration::from_secs(3)), 2);
        assert_eq!(counter.record_success(start + Duration::from_secs(120)), 2);
        assert_eq!(counter.completed(2), 2);
        assert_eq!(counter.total_completed(), 2);
    }

    #[test]
    fn early_instants_clamp_to_first_bucket() {
        let start = Instant::now() + Duration::from_secs(10);
        let counter = PerSecondCounter::new(3, start);
        assert_eq!(counter.record_failure(Instant::now()), 0);
        assert_eq!(counter.failed(0), 1);
    }

    #[test]
    fn failures_do_not_touch_successes() {
        let start = Instant::now();
        let counter = PerSecondCounter::new(2, start);
        counter.record_failure(start);
        counter.record_failure(start + Duration::from_secs(1));

        assert_eq!(counter.total_completed(), 0);
        assert_eq!(counter.total_failed(), 2);
        assert_eq!(counter.failed(1), 1);
    }

    #[test]
    fn in_flight_tracks_unresolved_requests() {
        let start = Instant::now();
        let counter = PerSecondCounter::new(2, start);
        for _ in 0..5 {
            counter.record_dispatched(0);
        }
        counter.record_success(start);
        counter.record_failure(start);

        assert_eq!(counter.in_flight(), 3);
        assert_eq!(
            counter.rows()[0],
            SecondRow {
                second: 0,
                dispatched: 5,
                completed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let start = Instant::now();
        let counter = Arc::new(PerSecondCounter::new(4, start));
        let threads = 8;
        let per_thread = 10_000;

        std::thread::scope(|s| {
            for _ in 0..threads {
                let counter = counter.clone();
                s.spawn(move || {
                    for _ in 0..per_thread {
                        counter.record_success(start + Duration::from_millis(1_500));
                    }
                });
            }
        });

        assert_eq!(counter.completed(1), threads * per_thread);
        assert_eq!(counter.total_completed(), threads * per_thread);
    }

    #[test]
    fn zero_duration_still_has_one_bucket() {
        let counter = PerSecondCounter::new(0, Instant::now());
        assert_eq!(counter.len(), 1);
    }
}
