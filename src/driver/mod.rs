//! Load driver: walks the ramp schedule and keeps the worker pool at the
//! desired level on every tick.

pub mod pool;
pub mod sender;
pub mod worker;

use std::sync::Arc;

use anyhow::Result;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use pool::{DrainReport, WorkerPool};
pub use sender::{HttpSender, RequestSender};
pub use worker::{run_worker, WorkerContext};

use crate::config::RunPlan;
use crate::metrics::{run_progress_reporter, MetricsCollector, RunSummary};

pub struct LoadDriver {
    plan: RunPlan,
    sender: Arc<dyn RequestSender>,
}

impl LoadDriver {
    pub fn new(plan: RunPlan, sender: Arc<dyn RequestSender>) -> Self {
        Self { plan, sender }
    }

    /// Driver that POSTs to the plan's target over HTTP.
    pub fn http(plan: RunPlan) -> Result<Self> {
        let sender = HttpSender::new(plan.target.url.clone(), plan.target.request_timeout)?;
        Ok(Self::new(plan, Arc::new(sender)))
    }

    /// Execute the schedule. Cancelling `shutdown` ends the run early; the
    /// summary is still produced and marked as aborted.
    pub async fn run(&self, shutdown: CancellationToken) -> RunSummary {
        let plan = &self.plan;
        let schedule = &plan.schedule;
        let checks = Arc::new(plan.checks.clone());
        let metrics = Arc::new(MetricsCollector::new(checks.names()));

        let ctx = WorkerContext {
            sender: self.sender.clone(),
            checks,
            metrics: metrics.clone(),
            sleep: plan.worker.sleep,
            include_timestamp: plan.worker.include_timestamp,
        };

        info!(
            target_url = %plan.target.url,
            seed = plan.seed,
            stages = schedule.stages().len(),
            total_duration = %humantime::format_duration(schedule.total_duration()),
            peak_target = schedule.peak_target(),
            "starting run"
        );

        let reporter_stop = CancellationToken::new();
        if let Some(every) = plan.report_interval {
            tokio::spawn(run_progress_reporter(
                metrics.clone(),
                every,
                reporter_stop.clone(),
            ));
        }

        let mut pool = WorkerPool::new(ctx, plan.seed, shutdown.child_token());
        let started = Instant::now();
        let deadline = started + schedule.total_duration();
        let mut ticker = interval(plan.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut current_stage: Option<usize> = None;

        let aborted = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break true,
                _ = sleep_until(deadline) => break false,
                _ = ticker.tick() => {}
            }

            let elapsed = started.elapsed();
            let Some(desired) = schedule.desired_at(elapsed) else {
                break false;
            };
            if let Some((idx, stage)) = schedule.stage_at(elapsed) {
                if current_stage != Some(idx) {
                    current_stage = Some(idx);
                    info!(
                        stage = idx,
                        stage_target = stage.target,
                        stage_duration = %humantime::format_duration(stage.duration),
                        "entering stage"
                    );
                }
            }

            let (spawned, retired) = pool.scale_to(desired);
            if spawned > 0 || retired > 0 {
                debug!(desired, spawned, retired, active = pool.active(), "scaled workers");
            }
        };
        let elapsed = started.elapsed();

        if aborted {
            warn!(elapsed = ?elapsed, "run aborted, retiring workers");
        } else {
            info!(elapsed = ?elapsed, "schedule complete, retiring workers");
        }

        let drain = pool
            .shutdown(plan.target.request_timeout + plan.drain_grace)
            .await;
        reporter_stop.cancel();
        info!(drained = drain.drained, aborted = drain.aborted, "workers drained");

        let thresholds = plan.thresholds.evaluate(&metrics);
        RunSummary::from_collector(
            &metrics,
            plan.target.url.to_string(),
            plan.seed,
            elapsed.as_secs_f64(),
            aborted,
            thresholds,
        )
    }
}
