//! Run-level pass/fail conditions, evaluated once after the run completes.

use std::time::Duration;

use serde::Serialize;

use crate::metrics::MetricsCollector;

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyThreshold {
    /// Percentile in (0, 100].
    pub percentile: f64,
    /// Observed latency at `percentile` must be strictly below this.
    pub max: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thresholds {
    /// Failed-request rate must be strictly below this.
    pub max_error_rate: Option<f64>,
    pub latency: Vec<LatencyThreshold>,
    /// Share of passing check evaluations, across all checks, must be at
    /// least this.
    pub min_check_pass_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub name: String,
    pub observed: f64,
    pub bound: f64,
    pub passed: bool,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        self.max_error_rate.is_none() && self.latency.is_empty() && self.min_check_pass_rate.is_none()
    }

    pub fn evaluate(&self, metrics: &MetricsCollector) -> Vec<ThresholdResult> {
        let mut results = Vec::new();

        if let Some(bound) = self.max_error_rate {
            let observed = metrics.error_rate();
            results.push(ThresholdResult {
                name: format!("error_rate < {bound}"),
                observed,
                bound,
                passed: observed < bound,
            });
        }

        for t in &self.latency {
            let bound_ms = t.max.as_secs_f64() * 1000.0;
            let name = format!("p({}) < {}ms", t.percentile, bound_ms);
            // No samples means nothing was slow.
            let result = match metrics.latency_percentile(t.percentile) {
                Some(observed) => ThresholdResult {
                    name,
                    observed: observed.as_secs_f64() * 1000.0,
                    bound: bound_ms,
                    passed: observed < t.max,
                },
                None => ThresholdResult {
                    name,
                    observed: 0.0,
                    bound: bound_ms,
                    passed: true,
                },
            };
            results.push(result);
        }

        if let Some(bound) = self.min_check_pass_rate {
            let (passes, total) = metrics
                .check_tallies()
                .iter()
                .fold((0u64, 0u64), |(p, t), c| (p + c.passes, t + c.total()));
            let observed = if total == 0 {
                1.0
            } else {
                passes as f64 / total as f64
            };
            results.push(ThresholdResult {
                name: format!("check_pass_rate >= {bound}"),
                observed,
                bound,
                passed: observed >= bound,
            });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestOutcome;

    fn collector_with(statuses: &[(u16, u64)]) -> MetricsCollector {
        let collector = MetricsCollector::new(["status_is_200"]);
        for (status, millis) in statuses {
            collector.record(
                &RequestOutcome::response(*status, Duration::from_millis(*millis), None),
                &[*status == 200],
            );
        }
        collector
    }

    #[test]
    fn test_no_thresholds_no_results() {
        let collector = collector_with(&[(500, 10)]);
        let thresholds = Thresholds::default();
        assert!(thresholds.is_empty());
        assert!(thresholds.evaluate(&collector).is_empty());
    }

    #[test]
    fn test_error_rate_is_strict() {
        let thresholds = Thresholds {
            max_error_rate: Some(0.5),
            ..Default::default()
        };
        let half = collector_with(&[(200, 1), (500, 1)]);
        assert!(!thresholds.evaluate(&half)[0].passed);

        let quarter = collector_with(&[(200, 1), (200, 1), (200, 1), (500, 1)]);
        assert!(thresholds.evaluate(&quarter)[0].passed);
    }

    #[test]
    fn test_latency_threshold() {
        let thresholds = Thresholds {
            latency: vec![LatencyThreshold {
                percentile: 95.0,
                max: Duration::from_millis(500),
            }],
            ..Default::default()
        };
        let fast: Vec<(u16, u64)> = (0..100).map(|_| (200, 50)).collect();
        assert!(thresholds.evaluate(&collector_with(&fast))[0].passed);

        let slow: Vec<(u16, u64)> = (0..100).map(|i| (200, if i < 90 { 50 } else { 800 })).collect();
        let result = &thresholds.evaluate(&collector_with(&slow))[0];
        assert!(!result.passed);
        assert!(result.observed >= 790.0);
    }

    #[test]
    fn test_latency_just_under_bound_passes() {
        let thresholds = Thresholds {
            latency: vec![LatencyThreshold {
                percentile: 95.0,
                max: Duration::from_millis(500),
            }],
            ..Default::default()
        };
        let collector = MetricsCollector::new(["response_time_under_threshold"]);
        for _ in 0..100 {
            collector.record(
                &RequestOutcome::response(200, Duration::from_micros(499_990), None),
                &[true],
            );
        }
        let result = &thresholds.evaluate(&collector)[0];
        assert!(result.observed < 500.0, "observed {}", result.observed);
        assert!(result.passed);
    }

    #[test]
    fn test_latency_threshold_passes_without_samples() {
        let thresholds = Thresholds {
            latency: vec![LatencyThreshold {
                percentile: 99.0,
                max: Duration::from_millis(1),
            }],
            ..Default::default()
        };
        assert!(thresholds.evaluate(&collector_with(&[]))[0].passed);
    }

    #[test]
    fn test_check_pass_rate() {
        let thresholds = Thresholds {
            min_check_pass_rate: Some(0.75),
            ..Default::default()
        };
        let collector = collector_with(&[(200, 1), (200, 1), (200, 1), (500, 1)]);
        let result = &thresholds.evaluate(&collector)[0];
        assert!(result.passed);
        assert!((result.observed - 0.75).abs() < f64::EPSILON);
    }
}
