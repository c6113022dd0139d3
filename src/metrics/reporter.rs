//! Periodic progress logging while a run is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::collector::MetricsCollector;

/// Log live counters every `every` until `stop` is cancelled.
pub async fn run_progress_reporter(
    collector: Arc<MetricsCollector>,
    every: Duration,
    stop: CancellationToken,
) {
    let started = Instant::now();
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately
    ticker.tick().await;

    let mut last_requests = 0u64;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let requests = collector.requests();
        let window_rps = (requests - last_requests) as f64 / every.as_secs_f64();
        last_requests = requests;
        info!(
            elapsed_s = started.elapsed().as_secs(),
            live_workers = collector.live_workers(),
            requests,
            window_rps,
            error_rate = collector.error_rate(),
            "progress"
        );
    }
}
