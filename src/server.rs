use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Benchmark control ───────────────────────────────────
        .route(
            "/api/benchmark/start",
            post(handlers::benchmark::start_benchmark),
        )
        .route(
            "/api/benchmark/stop",
            post(handlers::benchmark::stop_benchmark),
        )
        .route(
            "/api/benchmark/status",
            get(handlers::benchmark::benchmark_status),
        )
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
