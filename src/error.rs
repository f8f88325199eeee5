use thiserror::Error;

/// Errors that stop a benchmark run before (or instead of) dispatching.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid benchmark configuration: {0}")]
    InvalidConfig(String),

    #[error("dispatch target unavailable: {0}")]
    Target(#[from] DispatchError),
}

/// Failure outcome of a single dispatched request.
///
/// Never fatal to the run: it is handed to the error sink and tallied.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("redis: {0}")]
    Redis(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<redis::RedisError> for DispatchError {
    fn from(e: redis::RedisError) -> Self {
        Self::Redis(e.to_string())
    }
}
