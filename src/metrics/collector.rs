//! Concurrency-safe run statistics.
//!
//! Workers only ever write; the driver reads once the run is over (and the
//! progress reporter reads counters while it runs). Counters are atomics,
//! the latency histogram sits behind a short-held mutex.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::domain::{RequestOutcome, TransportErrorKind};

/// Latencies are recorded in microseconds, up to one hour.
const HISTOGRAM_MAX_MICROS: u64 = 3_600_000_000;

struct CheckCounter {
    name: String,
    passes: AtomicU64,
    fails: AtomicU64,
}

pub struct MetricsCollector {
    requests: AtomicU64,
    failed: AtomicU64,
    transport_errors: BTreeMap<TransportErrorKind, AtomicU64>,
    checks: Vec<CheckCounter>,
    latencies: Mutex<Histogram<u64>>,
    live_workers: AtomicUsize,
    peak_workers: AtomicUsize,
    spawned_workers: AtomicU64,
}

impl MetricsCollector {
    /// `check_names` fixes the positional layout used by [`record`](Self::record).
    pub fn new<I, S>(check_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let histogram = Histogram::new_with_bounds(1, HISTOGRAM_MAX_MICROS, 3)
            .expect("static histogram bounds are valid");
        Self {
            requests: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            transport_errors: TransportErrorKind::iter()
                .map(|k| (k, AtomicU64::new(0)))
                .collect(),
            checks: check_names
                .into_iter()
                .map(|name| CheckCounter {
                    name: name.into(),
                    passes: AtomicU64::new(0),
                    fails: AtomicU64::new(0),
                })
                .collect(),
            latencies: Mutex::new(histogram),
            live_workers: AtomicUsize::new(0),
            peak_workers: AtomicUsize::new(0),
            spawned_workers: AtomicU64::new(0),
        }
    }

    /// Record one outcome together with its positional check results.
    pub fn record(&self, outcome: &RequestOutcome, check_results: &[bool]) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if outcome.is_failed() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(err) = &outcome.error {
            if let Some(counter) = self.transport_errors.get(&err.kind) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        for (counter, passed) in self.checks.iter().zip(check_results) {
            if *passed {
                counter.passes.fetch_add(1, Ordering::Relaxed);
            } else {
                counter.fails.fetch_add(1, Ordering::Relaxed);
            }
        }

        let micros = u64::try_from(outcome.duration.as_micros()).unwrap_or(u64::MAX);
        self.latencies
            .lock()
            .saturating_record(micros.clamp(1, HISTOGRAM_MAX_MICROS));
    }

    /// Mark a worker as running. The count drops again when the returned
    /// guard is dropped, including when the worker task panics.
    pub fn worker_started(&self) -> WorkerGuard<'_> {
        self.spawned_workers.fetch_add(1, Ordering::Relaxed);
        let live = self.live_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_workers.fetch_max(live, Ordering::SeqCst);
        WorkerGuard { collector: self }
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub fn peak_workers(&self) -> usize {
        self.peak_workers.load(Ordering::SeqCst)
    }

    pub fn spawned_workers(&self) -> u64 {
        self.spawned_workers.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Failed / total, or 0 when nothing was sent.
    pub fn error_rate(&self) -> f64 {
        let total = self.requests();
        if total == 0 {
            return 0.0;
        }
        self.failed_requests() as f64 / total as f64
    }

    pub fn transport_errors(&self) -> BTreeMap<String, u64> {
        self.transport_errors
            .iter()
            .map(|(kind, count)| (kind.to_string(), count.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn check_tallies(&self) -> Vec<CheckTally> {
        self.checks
            .iter()
            .map(|c| CheckTally {
                name: c.name.clone(),
                passes: c.passes.load(Ordering::Relaxed),
                fails: c.fails.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Latency at percentile `p` (0-100], `None` with no samples. Reported
    /// as the lowest value of the histogram bucket, so it never exceeds the
    /// largest sample that landed there.
    pub fn latency_percentile(&self, p: f64) -> Option<Duration> {
        let hist = self.latencies.lock();
        if hist.len() == 0 {
            return None;
        }
        Some(Duration::from_micros(lowest_at_quantile(&hist, p / 100.0)))
    }

    pub fn latency_stats(&self) -> LatencyStats {
        let hist = self.latencies.lock();
        if hist.len() == 0 {
            return LatencyStats::default();
        }
        let ms = |micros: u64| micros as f64 / 1000.0;
        LatencyStats {
            count: hist.len(),
            min: ms(hist.min()),
            mean: hist.mean() / 1000.0,
            p50: ms(lowest_at_quantile(&hist, 0.50)),
            p90: ms(lowest_at_quantile(&hist, 0.90)),
            p95: ms(lowest_at_quantile(&hist, 0.95)),
            p99: ms(lowest_at_quantile(&hist, 0.99)),
            max: ms(hist.max()),
        }
    }
}

fn lowest_at_quantile(hist: &Histogram<u64>, q: f64) -> u64 {
    hist.lowest_equivalent(hist.value_at_quantile(q))
}

pub struct WorkerGuard<'a> {
    collector: &'a MetricsCollector,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.collector.live_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckTally {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// Request latency distribution in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min: f64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}
