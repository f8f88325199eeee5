use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use crate::config::BenchmarkConfig;
use crate::load_generator::LoadGenerator;
use crate::metrics::FailureFeed;
use crate::{ActiveRun, AppState};

use super::AppError;

#[derive(Debug, Serialize)]
pub struct BenchmarkStatus {
    pub running: bool,
    pub message: String,
}

// ─── POST /api/benchmark/start ───────────────────────────────────

pub async fn start_benchmark(
    State(state): State<Arc<AppState>>,
    Json(config): Json<BenchmarkConfig>,
) -> Result<Json<BenchmarkStatus>, AppError> {
    // Hold the handle slot for the whole start so two requests can't race
    let mut guard = state.load_handle.lock().await;

    if state.load_running.load(Ordering::SeqCst) {
        return Err(AppError::AlreadyRunning);
    }

    let failures = Arc::new(FailureFeed::new());
    let generator = LoadGenerator::new(config, state.target.clone(), failures.clone())?;

    // Reap the previous run's task, if it finished on its own
    if let Some(previous) = guard.take() {
        let _ = previous.await;
    }

    // Flip the flag BEFORE spawning so the tick loop sees it immediately
    state.load_running.store(true, Ordering::SeqCst);

    let (metrics, handle) = generator.spawn(state.load_running.clone());
    *state.current_run.lock() = Some(ActiveRun { metrics, failures });
    *guard = Some(handle);

    let msg = format!(
        "Started: {} requests/s × {}s",
        config.batch_size, config.duration_secs,
    );
    info!(%msg, "benchmark start requested");

    Ok(Json(BenchmarkStatus {
        running: true,
        message: msg,
    }))
}

// ─── POST /api/benchmark/stop ────────────────────────────────────

pub async fn stop_benchmark(
    State(state): State<Arc<AppState>>,
) -> Json<BenchmarkStatus> {
    let mut guard = state.load_handle.lock().await;

    if !state.load_running.load(Ordering::SeqCst) {
        return Json(BenchmarkStatus {
            running: false,
            message: "No benchmark is running".into(),
        });
    }

    // Picked up at the next tick boundary
    state.load_running.store(false, Ordering::SeqCst);

    if let Some(handle) = guard.take() {
        // Ignore JoinError; the task may have already finished
        let _ = handle.await;
    }
    info!("benchmark stopped");

    Json(BenchmarkStatus {
        running: false,
        message: "Benchmark stopped".into(),
    })
}

// ─── GET /api/benchmark/status ───────────────────────────────────

pub async fn benchmark_status(
    State(state): State<Arc<AppState>>,
) -> Json<BenchmarkStatus> {
    let running = state.load_running.load(Ordering::SeqCst);
    Json(BenchmarkStatus {
        running,
        message: if running {
            "Benchmark in progress".into()
        } else {
            "Idle".into()
        },
    })
}
