use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use super::collector::{CheckTally, LatencyStats, MetricsCollector};
use crate::thresholds::ThresholdResult;

/// End-of-run report. Rendered as text or JSON by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub target: String,
    pub seed: u64,
    pub aborted: bool,
    pub elapsed_secs: f64,
    pub requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub requests_per_second: f64,
    pub transport_errors: BTreeMap<String, u64>,
    pub latency_ms: LatencyStats,
    pub checks: Vec<CheckTally>,
    pub peak_workers: usize,
    pub workers_spawned: u64,
    pub thresholds: Vec<ThresholdResult>,
}

impl RunSummary {
    pub fn from_collector(
        collector: &MetricsCollector,
        target: String,
        seed: u64,
        elapsed_secs: f64,
        aborted: bool,
        thresholds: Vec<ThresholdResult>,
    ) -> Self {
        let requests = collector.requests();
        let requests_per_second = if elapsed_secs > 0.0 {
            requests as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            target,
            seed,
            aborted,
            elapsed_secs,
            requests,
            failed_requests: collector.failed_requests(),
            error_rate: collector.error_rate(),
            requests_per_second,
            transport_errors: collector.transport_errors(),
            latency_ms: collector.latency_stats(),
            checks: collector.check_tallies(),
            peak_workers: collector.peak_workers(),
            workers_spawned: collector.spawned_workers(),
            thresholds,
        }
    }

    /// True when every threshold passed. Failed checks alone never fail a run.
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn failed_checks(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "==================== RUN SUMMARY ====================");
        let _ = writeln!(out, "  target:              {}", self.target);
        let _ = writeln!(out, "  seed:                {}", self.seed);
        let _ = writeln!(out, "  duration:            {:.2}s", self.elapsed_secs);
        if self.aborted {
            let _ = writeln!(out, "  status:              ABORTED");
        }
        let _ = writeln!(out, "  peak workers:        {}", self.peak_workers);
        let _ = writeln!(out, "  workers spawned:     {}", self.workers_spawned);

        let _ = writeln!(out, "\n  requests");
        let _ = writeln!(out, "    total:             {:>10}", self.requests);
        let _ = writeln!(out, "    failed:            {:>10}", self.failed_requests);
        let _ = writeln!(out, "    error rate:        {:>9.2}%", self.error_rate * 100.0);
        let _ = writeln!(out, "    throughput:        {:>10.2} req/s", self.requests_per_second);
        for (kind, count) in self.transport_errors.iter().filter(|(_, c)| **c > 0) {
            let _ = writeln!(out, "    {:<19}{:>10}", format!("{kind} errors:"), count);
        }

        if self.latency_ms.count > 0 {
            let l = &self.latency_ms;
            let _ = writeln!(out, "\n  latency (ms)");
            let _ = writeln!(
                out,
                "    min {:.2}  p50 {:.2}  p90 {:.2}  p95 {:.2}  p99 {:.2}  max {:.2}",
                l.min, l.p50, l.p90, l.p95, l.p99, l.max
            );
            let _ = writeln!(out, "    mean {:.2}", l.mean);
        }

        if !self.checks.is_empty() {
            let _ = writeln!(out, "\n  checks");
            for c in &self.checks {
                let mark = if c.fails == 0 { "ok  " } else { "FAIL" };
                let _ = writeln!(
                    out,
                    "    [{mark}] {:<34} {:>8} passed {:>8} failed",
                    c.name, c.passes, c.fails
                );
            }
        }

        if !self.thresholds.is_empty() {
            let _ = writeln!(out, "\n  thresholds");
            for t in &self.thresholds {
                let mark = if t.passed { "ok  " } else { "FAIL" };
                let _ = writeln!(out, "    [{mark}] {:<34} observed {:.4}", t.name, t.observed);
            }
        }
        let _ = writeln!(out, "=====================================================");
        out
    }
}
