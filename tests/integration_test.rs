use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use instance_bench::config::BenchmarkConfig;
use instance_bench::dispatch::{SimulatedDispatcher, Target};
use instance_bench::load_generator::LoadGenerator;
use instance_bench::metrics::FailureFeed;

#[tokio::test(start_paused = true)]
async fn simulated_failures_reach_the_feed() {
    let target = Arc::new(Target::Simulated(SimulatedDispatcher::new(
        Duration::from_millis(10),
        Duration::from_millis(20),
        100,
    )));
    let feed = Arc::new(FailureFeed::new());
    let generator =
        LoadGenerator::new(BenchmarkConfig::new(2, 10), target, feed.clone()).unwrap();

    let metrics = generator.run(Arc::new(AtomicBool::new(true))).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = metrics.snapshot();
    assert!(!snapshot.issuing);
    assert_eq!(snapshot.total_dispatched, 20);
    assert_eq!(snapshot.total_completed, 0);
    assert_eq!(snapshot.total_failed, 20);
    assert_eq!(snapshot.in_flight, 0);
    assert!(snapshot.per_second.iter().all(|row| row.completed == 0));
    assert_eq!(feed.recent().len(), 20);
}

#[tokio::test(start_paused = true)]
async fn simulated_latency_is_recorded() {
    let target = Arc::new(Target::Simulated(SimulatedDispatcher::new(
        Duration::from_millis(30),
        Duration::from_millis(30),
        0,
    )));
    let generator = LoadGenerator::new(
        BenchmarkConfig::new(3, 4),
        target,
        Arc::new(FailureFeed::new()),
    )
    .unwrap();

    let metrics = generator.run(Arc::new(AtomicBool::new(true))).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_completed, 12);
    assert_eq!(
        snapshot.per_second.iter().map(|r| r.completed).collect::<Vec<_>>(),
        vec![4, 4, 4]
    );
    assert_eq!(snapshot.latency.count, 12);
    assert!(snapshot.latency.p50_us >= 30_000, "{}", snapshot.latency.p50_us);
    // ticks 0..3 over a 3 s issuing window
    assert!((snapshot.completions_per_sec - 4.0).abs() < 0.1);
}
