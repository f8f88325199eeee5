use serde::{Deserialize, Serialize};

use crate::error::BenchError;

// ─── Limits ──────────────────────────────────────────────────────

pub const MAX_DURATION_SECS: u64 = 3_600;
pub const MAX_BATCH_SIZE: u64 = 100_000;

// ─── Run configuration ───────────────────────────────────────────

/// Immutable shape of one benchmark run.
///
/// Accepted as the JSON body of `POST /api/benchmark/start` and built from
/// CLI flags for `instance-bench run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Wall-clock length of the run, one bucket per second
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Requests dispatched back-to-back at the start of every tick
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
}

fn default_duration() -> u64 {
    30
}
fn default_batch_size() -> u64 {
    100
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration(),
            batch_size: default_batch_size(),
        }
    }
}

impl BenchmarkConfig {
    pub fn new(duration_secs: u64, batch_size: u64) -> Self {
        Self {
            duration_secs,
            batch_size,
        }
    }

    /// Rejects configurations that must fail before any dispatch happens.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.duration_secs == 0 || self.duration_secs > MAX_DURATION_SECS {
            return Err(BenchError::InvalidConfig(format!(
                "duration_secs must be between 1 and {MAX_DURATION_SECS}, got {}",
                self.duration_secs
            )));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(BenchError::InvalidConfig(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }

    /// Upper bound on dispatch calls for the whole run.
    pub fn total_requests(&self) -> u64 {
        self.duration_secs * self.batch_size
    }
}
