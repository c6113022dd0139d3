//! Named boolean assertions evaluated against every request outcome.
//!
//! Two checks are always present: `status_is_200` and
//! `response_time_under_threshold`. Additional checks come from
//! configuration and are appended in declaration order. Results are
//! positional so the metrics collector can tally them without locking.

use std::collections::HashSet;
use std::time::Duration;

use crate::domain::RequestOutcome;
use crate::error::ConfigError;

pub const STATUS_IS_200: &str = "status_is_200";
pub const RESPONSE_TIME_UNDER_THRESHOLD: &str = "response_time_under_threshold";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Status equals the given code.
    StatusIs(u16),
    /// Status within `min..=max`.
    StatusBetween(u16, u16),
    /// Request duration strictly below the limit.
    DurationUnder(Duration),
    /// Response body contains the needle.
    BodyContains(String),
}

impl Predicate {
    pub fn evaluate(&self, outcome: &RequestOutcome) -> bool {
        match self {
            Predicate::StatusIs(code) => outcome.status == Some(*code),
            Predicate::StatusBetween(min, max) => outcome
                .status
                .map(|s| (*min..=*max).contains(&s))
                .unwrap_or(false),
            Predicate::DurationUnder(limit) => outcome.duration < *limit,
            Predicate::BodyContains(needle) => outcome
                .body
                .as_deref()
                .map(|b| b.contains(needle.as_str()))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub predicate: Predicate,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

/// Ordered, immutable set of checks shared by every worker.
#[derive(Debug, Clone)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    /// The two built-in checks.
    pub fn standard(response_time_threshold: Duration) -> Self {
        Self {
            checks: vec![
                Check::new(STATUS_IS_200, Predicate::StatusIs(200)),
                Check::new(
                    RESPONSE_TIME_UNDER_THRESHOLD,
                    Predicate::DurationUnder(response_time_threshold),
                ),
            ],
        }
    }

    /// Append configured checks. Names must be unique across the set.
    pub fn with_extra(mut self, extra: Vec<Check>) -> Result<Self, ConfigError> {
        let mut seen: HashSet<String> = self.checks.iter().map(|c| c.name.clone()).collect();
        for check in extra {
            if check.name.trim().is_empty() {
                return Err(ConfigError::Invalid("check name must not be empty".into()));
            }
            if !seen.insert(check.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate check name {:?}",
                    check.name
                )));
            }
            self.checks.push(check);
        }
        Ok(self)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.name.as_str())
    }

    /// Evaluate every check; the result at index `i` belongs to the `i`th
    /// check in [`CheckSet::names`] order.
    pub fn evaluate(&self, outcome: &RequestOutcome) -> Vec<bool> {
        self.checks
            .iter()
            .map(|c| c.predicate.evaluate(outcome))
            .collect()
    }
}
