use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::DispatchError;

/// How many failures the live feed keeps
const MAX_RECENT_FAILURES: usize = 100;

// ─── Error sink collaborator ─────────────────────────────────────

/// Receives every failed request as it resolves. Implementations must not
/// block; they run on the completion task of the failed request.
pub trait ErrorSink: Send + Sync + 'static {
    /// `second` is the bucket the failure was tallied in, `elapsed` the time
    /// since run start.
    fn report(&self, second: usize, elapsed: Duration, error: &DispatchError);
}

impl<T: ErrorSink> ErrorSink for Arc<T> {
    fn report(&self, second: usize, elapsed: Duration, error: &DispatchError) {
        (**self).report(second, elapsed, error);
    }
}

// ─── Default sink: log + bounded feed ────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub second: usize,
    pub elapsed_ms: u64,
    pub message: String,
}

/// Logs each failure and keeps the most recent ones for snapshots.
#[derive(Debug, Default)]
pub struct FailureFeed {
    recent: Mutex<VecDeque<FailureRecord>>,
}

impl FailureFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest last.
    pub fn recent(&self) -> Vec<FailureRecord> {
        self.recent.lock().iter().cloned().collect()
    }
}

impl ErrorSink for FailureFeed {
    fn report(&self, second: usize, elapsed: Duration, error: &DispatchError) {
        warn!(second, elapsed_ms = elapsed.as_millis() as u64, %error, "request failed");

        let mut recent = self.recent.lock();
        recent.push_back(FailureRecord {
            second,
            elapsed_ms: elapsed.as_millis() as u64,
            message: error.to_string(),
        });
        if recent.len() > MAX_RECENT_FAILURES {
            recent.pop_front();
        }
    }
}
