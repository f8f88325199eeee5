pub mod collector;
pub mod counter;
pub mod failures;
pub mod percentiles;
pub mod stream;

pub use collector::{RunMetrics, RunSnapshot};
pub use counter::PerSecondCounter;
pub use failures::{ErrorSink, FailureFeed, FailureRecord};
