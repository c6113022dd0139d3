use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::sender::RequestSender;
use crate::checks::CheckSet;
use crate::domain::PayloadGenerator;
use crate::metrics::MetricsCollector;

/// State shared by every worker of a run.
#[derive(Clone)]
pub struct WorkerContext {
    pub sender: Arc<dyn RequestSender>,
    pub checks: Arc<CheckSet>,
    pub metrics: Arc<MetricsCollector>,
    /// Pause between iterations.
    pub sleep: Duration,
    pub include_timestamp: bool,
}

/// One virtual user: build a payload, send it, check it, record it, pause,
/// repeat.
///
/// Retirement is observed before every iteration and during the pause. A
/// request that is already in flight always runs to completion (bounded by
/// the sender's timeout). Returns the number of completed iterations.
pub async fn run_worker(
    id: u64,
    seed: u64,
    ctx: WorkerContext,
    retire: CancellationToken,
) -> u64 {
    let _live = ctx.metrics.worker_started();
    let mut payloads = PayloadGenerator::new(Some(seed.wrapping_add(id)), ctx.include_timestamp);
    let mut iterations = 0u64;

    while !retire.is_cancelled() {
        let payload = payloads.next_payload();
        let outcome = ctx.sender.send(&payload).await;
        let results = ctx.checks.evaluate(&outcome);
        ctx.metrics.record(&outcome, &results);
        iterations += 1;

        if ctx.sleep.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = retire.cancelled() => break,
                _ = tokio::time::sleep(ctx.sleep) => {}
            }
        }
    }

    trace!(worker = id, iterations, "worker retired");
    iterations
}
