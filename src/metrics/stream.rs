use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};

use super::collector::RunSnapshot;
use crate::handlers::AppError;
use crate::AppState;

const PUSH_INTERVAL: Duration = Duration::from_millis(500);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

// ─── GET /api/metrics ────────────────────────────────────────────

/// 404 until the first run has been started.
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, AppError> {
    state.snapshot().map(Json).ok_or(AppError::NoRun)
}

// ─── GET /api/metrics/stream ─────────────────────────────────────

/// Live feed of the per-second tallies while a run issues and drains.
///
/// One `data:` frame per push, holding the serialized `RunSnapshot`, or the
/// literal `null` while the server has not run anything yet. Clients keep
/// receiving frames after the run ends, so late completions still show up.
pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let ticks = IntervalStream::new(tokio::time::interval(PUSH_INTERVAL));
    let frames = ticks.map(move |_| Ok(Event::default().data(snapshot_json(&state))));

    Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

fn snapshot_json(state: &AppState) -> String {
    serde_json::to_string(&state.snapshot()).unwrap_or_else(|_| "null".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchmarkConfig;
    use crate::dispatch::{SimulatedDispatcher, Target};
    use crate::metrics::{FailureFeed, RunMetrics};
    use crate::ActiveRun;
    use tokio::time::Instant;

    #[test]
    fn frame_is_null_before_any_run() {
        let state = AppState::new(Target::Simulated(SimulatedDispatcher::instant()));
        assert_eq!(snapshot_json(&state), "null");
    }

    #[test]
    fn frame_carries_current_run() {
        let state = AppState::new(Target::Simulated(SimulatedDispatcher::instant()));
        let metrics = Arc::new(RunMetrics::new(BenchmarkConfig::new(2, 7), Instant::now()));
        *state.current_run.lock() = Some(ActiveRun {
            metrics,
            failures: Arc::new(FailureFeed::new()),
        });

        let frame: serde_json::Value = serde_json::from_str(&snapshot_json(&state)).unwrap();
        assert_eq!(frame["config"]["batch_size"], 7);
        assert_eq!(frame["per_second"].as_array().map(Vec::len), Some(2));
        assert_eq!(frame["issuing"], true);
    }
}
