use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::time::Instant;
use tracing::info;

use instance_bench::config::BenchmarkConfig;
use instance_bench::dispatch::TargetArgs;
use instance_bench::load_generator::LoadGenerator;
use instance_bench::metrics::{FailureFeed, RunMetrics, RunSnapshot};
use instance_bench::{server, telemetry, AppState};

// ─── CLI ─────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "instance-bench", version, about = "Batched create-instance throughput benchmark")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one benchmark and print per-second results
    Run(RunArgs),
    /// Serve the HTTP control API
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, env = "INSTANCE_BENCH_DURATION_SECS", default_value_t = 30)]
    duration_secs: u64,

    /// Requests dispatched at the start of every second
    #[arg(long, env = "INSTANCE_BENCH_BATCH_SIZE", default_value_t = 100)]
    batch_size: u64,

    /// How long to wait for in-flight requests before reporting
    #[arg(long, env = "INSTANCE_BENCH_DRAIN_SECS", default_value_t = 2)]
    drain_secs: u64,

    /// Print the full snapshot as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, env = "INSTANCE_BENCH_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,

    #[command(flatten)]
    target: TargetArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    match Cli::parse().command {
        Command::Run(args) => run_once(args).await,
        Command::Serve(args) => serve(args).await,
    }
}

// ─── instance-bench run ──────────────────────────────────────────

async fn run_once(args: RunArgs) -> anyhow::Result<()> {
    let config = BenchmarkConfig::new(args.duration_secs, args.batch_size);
    let target = Arc::new(args.target.connect().await?);
    let failures = Arc::new(FailureFeed::new());
    let generator = LoadGenerator::new(config, target, failures.clone())?;

    println!("Create-Instance Throughput Benchmark");
    println!(
        "Will run for {}s at {} requests/s ({} total)",
        config.duration_secs,
        config.batch_size,
        config.total_requests()
    );

    // Ctrl-C ends the run at the next tick boundary
    let running = Arc::new(AtomicBool::new(true));
    let cancel = running.clone();
    tokio::spawn(async move {
        telemetry::shutdown_signal().await;
        cancel.store(false, Ordering::SeqCst);
    });

    let metrics = generator.run(running).await;
    drain(&metrics, Duration::from_secs(args.drain_secs)).await;

    let mut snapshot = metrics.snapshot();
    snapshot.recent_failures = failures.recent();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_report(&snapshot);
    }
    Ok(())
}

/// Waits up to `grace` for outstanding requests so the tail lands in the
/// report. Anything still in flight afterwards is reported as such.
async fn drain(metrics: &RunMetrics, grace: Duration) {
    let counter = metrics.counter();
    let until = Instant::now() + grace;
    while counter.in_flight() > 0 && Instant::now() < until {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if counter.in_flight() > 0 {
        info!(in_flight = counter.in_flight(), "drain window elapsed");
    }
}

fn print_report(snapshot: &RunSnapshot) {
    let completed: Vec<u64> = snapshot.per_second.iter().map(|r| r.completed).collect();

    println!();
    println!(
        "Result after {} milliseconds",
        (snapshot.elapsed_secs * 1000.0) as u64
    );
    println!("{completed:?}");
    println!();
    println!("  second  dispatched  completed  failed");
    for row in &snapshot.per_second {
        println!(
            "  {:>6}  {:>10}  {:>9}  {:>6}",
            row.second, row.dispatched, row.completed, row.failed
        );
    }
    println!();
    println!(
        "  total: {} dispatched, {} completed, {} failed, {} in flight",
        snapshot.total_dispatched,
        snapshot.total_completed,
        snapshot.total_failed,
        snapshot.in_flight
    );
    println!("  throughput: {:.1} completions/s", snapshot.completions_per_sec);
    let l = &snapshot.latency;
    println!(
        "  latency (ms): p50 {:.2}  p95 {:.2}  p99 {:.2}  max {:.2}",
        l.p50_us as f64 / 1000.0,
        l.p95_us as f64 / 1000.0,
        l.p99_us as f64 / 1000.0,
        l.max_us as f64 / 1000.0
    );
    if let Some(last) = snapshot.recent_failures.last() {
        println!("  last failure: second {}: {}", last.second, last.message);
    }
}

// ─── instance-bench serve ────────────────────────────────────────

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let target = args.target.connect().await?;
    let state = Arc::new(AppState::new(target));
    let app = server::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("failed to bind to {}", args.addr))?;

    info!(addr = %args.addr, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    // Stop issuing; in-flight requests are abandoned with the process
    state.load_running.store(false, Ordering::SeqCst);
    info!("shutdown complete");
    Ok(())
}
