use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::checks::{Check, CheckSet, Predicate};
use crate::domain::{Schedule, Stage};
use crate::error::ConfigError;
use crate::thresholds::{LatencyThreshold, Thresholds};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const DEFAULT_TARGET_URL: &str = "http://localhost:8080/metric";
const ENV_PREFIX: &str = "LOADGEN__";

/// Raw configuration as read from TOML and the environment. Durations are
/// humantime strings ("10s", "250ms"); everything is checked in
/// [`Config::into_plan`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Fixed seed for payload generation. Random when absent.
    pub seed: Option<u64>,
    /// How often the driver re-evaluates the desired worker count.
    pub tick: String,
    /// Progress log interval. Disabled when absent.
    pub report_interval: Option<String>,
    /// Extra time, on top of the request timeout, that retired workers get
    /// to finish in-flight requests at the end of the run.
    pub drain_grace: String,
    pub target: TargetConfig,
    #[validate(nested)]
    pub worker: WorkerConfig,
    pub schedule: ScheduleConfig,
    #[validate(nested)]
    pub thresholds: ThresholdsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: None,
            tick: "1s".into(),
            report_interval: None,
            drain_grace: "5s".into(),
            target: TargetConfig::default(),
            worker: WorkerConfig::default(),
            schedule: ScheduleConfig::default(),
            thresholds: ThresholdsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,
    pub request_timeout: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TARGET_URL.into(),
            request_timeout: "30s".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pause between iterations of one worker.
    pub sleep: String,
    pub include_timestamp: bool,
    /// Bound used by the `response_time_under_threshold` check.
    pub response_time_threshold: String,
    #[validate(nested)]
    pub checks: Vec<CheckConfig>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sleep: "0s".into(),
            include_timestamp: false,
            response_time_threshold: "500ms".into(),
            checks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CheckConfig {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(flatten)]
    pub rule: CheckRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckRule {
    Status { code: u16 },
    StatusRange { min: u16, max: u16 },
    MaxDuration { limit: String },
    BodyContains { needle: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub start_concurrency: u32,
    pub stages: Vec<StageConfig>,
}

/// Kept signed so negative values reach validation and get a precise error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub duration: String,
    pub target: i64,
}

impl std::str::FromStr for StageConfig {
    type Err = ConfigError;

    /// Parse `DURATION:TARGET`, e.g. `30s:50`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidStageArg(s.to_string()))?;
        let target = target
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidStageArg(s.to_string()))?;
        if duration.trim().is_empty() {
            return Err(ConfigError::InvalidStageArg(s.to_string()));
        }
        Ok(Self {
            duration: duration.trim().to_string(),
            target,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ThresholdsConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_error_rate: Option<f64>,
    #[validate(nested)]
    pub latency: Vec<LatencyThresholdConfig>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_check_pass_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LatencyThresholdConfig {
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub percentile: f64,
    pub max: String,
}

/// Command-line values that win over file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub seed: Option<u64>,
    pub sleep: Option<String>,
    pub request_timeout: Option<String>,
    pub include_timestamp: Option<bool>,
    pub tick: Option<String>,
    pub report_interval: Option<String>,
    /// Replaces the configured stages when non-empty.
    pub stages: Vec<StageConfig>,
}

/// Validated, immutable description of one run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub target: TargetPlan,
    pub schedule: Schedule,
    pub worker: WorkerPlan,
    pub checks: CheckSet,
    pub thresholds: Thresholds,
    pub seed: u64,
    pub tick: Duration,
    pub report_interval: Option<Duration>,
    pub drain_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct TargetPlan {
    pub url: Url,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerPlan {
    pub sleep: Duration,
    pub include_timestamp: bool,
}

impl Config {
    /// Layer the TOML file and `LOADGEN__`-prefixed environment variables
    /// (`LOADGEN__TARGET__URL`, `LOADGEN__WORKER__SLEEP`, ...) over the
    /// defaults. An explicit path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) if !p.exists() => {
                return Err(ConfigError::Invalid(format!(
                    "config file {} does not exist",
                    p.display()
                )))
            }
            Some(p) => Toml::file(p),
            None => Toml::file(DEFAULT_CONFIG_PATH),
        };
        let figment = Figment::new()
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Ok(figment.extract()?)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.url {
            self.target.url = url;
        }
        if let Some(seed) = overrides.seed {
            self.seed = Some(seed);
        }
        if let Some(sleep) = overrides.sleep {
            self.worker.sleep = sleep;
        }
        if let Some(timeout) = overrides.request_timeout {
            self.target.request_timeout = timeout;
        }
        if let Some(include) = overrides.include_timestamp {
            self.worker.include_timestamp = include;
        }
        if let Some(tick) = overrides.tick {
            self.tick = tick;
        }
        if let Some(every) = overrides.report_interval {
            self.report_interval = Some(every);
        }
        if !overrides.stages.is_empty() {
            self.schedule.stages = overrides.stages;
        }
    }

    /// Check everything and produce the plan the driver runs. Nothing here
    /// touches the network.
    pub fn into_plan(self) -> Result<RunPlan, ConfigError> {
        self.validate()?;

        let url = parse_url(&self.target.url)?;
        let request_timeout = positive_duration("target.request_timeout", &self.target.request_timeout)?;
        let tick = positive_duration("tick", &self.tick)?;
        let report_interval = self
            .report_interval
            .as_deref()
            .map(|v| positive_duration("report_interval", v))
            .transpose()?;
        let drain_grace = parse_duration("drain_grace", &self.drain_grace)?;

        let stages = self
            .schedule
            .stages
            .iter()
            .enumerate()
            .map(|(idx, s)| stage_from_config(idx, s))
            .collect::<Result<Vec<_>, _>>()?;
        let schedule = Schedule::new(self.schedule.start_concurrency, stages)?;

        let response_time_threshold = positive_duration(
            "worker.response_time_threshold",
            &self.worker.response_time_threshold,
        )?;
        let extra = self
            .worker
            .checks
            .iter()
            .map(check_from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let checks = CheckSet::standard(response_time_threshold).with_extra(extra)?;

        let latency = self
            .thresholds
            .latency
            .iter()
            .map(|t| {
                Ok(LatencyThreshold {
                    percentile: t.percentile,
                    max: positive_duration("thresholds.latency.max", &t.max)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        for (idx, t) in latency.iter().enumerate() {
            if latency[..idx].iter().any(|other| other.percentile == t.percentile) {
                return Err(ConfigError::InvalidThreshold(format!(
                    "duplicate latency percentile p({})",
                    t.percentile
                )));
            }
        }
        let thresholds = Thresholds {
            max_error_rate: self.thresholds.max_error_rate,
            latency,
            min_check_pass_rate: self.thresholds.min_check_pass_rate,
        };

        Ok(RunPlan {
            target: TargetPlan {
                url,
                request_timeout,
            },
            schedule,
            worker: WorkerPlan {
                sleep: parse_duration("worker.sleep", &self.worker.sleep)?,
                include_timestamp: self.worker.include_timestamp,
            },
            checks,
            thresholds,
            seed: self.seed.unwrap_or_else(rand::random),
            tick,
            report_interval,
            drain_grace,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn positive_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    let d = parse_duration(field, value)?;
    if d.is_zero() {
        return Err(ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(d)
}

fn stage_from_config(idx: usize, stage: &StageConfig) -> Result<Stage, ConfigError> {
    let raw = stage.duration.trim();
    if raw.starts_with('-') {
        return Err(ConfigError::NonPositiveDuration {
            stage: idx,
            value: stage.duration.clone(),
        });
    }
    let duration = parse_duration(&format!("schedule.stages[{idx}].duration"), raw)?;
    if duration.is_zero() {
        return Err(ConfigError::NonPositiveDuration {
            stage: idx,
            value: stage.duration.clone(),
        });
    }
    if stage.target < 0 {
        return Err(ConfigError::NegativeTarget {
            stage: idx,
            target: stage.target,
        });
    }
    let target = u32::try_from(stage.target).map_err(|_| ConfigError::TargetOutOfRange {
        stage: idx,
        target: stage.target,
    })?;
    Ok(Stage::new(duration, target))
}

fn check_from_config(check: &CheckConfig) -> Result<Check, ConfigError> {
    let predicate = match &check.rule {
        CheckRule::Status { code } => Predicate::StatusIs(*code),
        CheckRule::StatusRange { min, max } => {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "check {:?}: status_range min {min} exceeds max {max}",
                    check.name
                )));
            }
            Predicate::StatusBetween(*min, *max)
        }
        CheckRule::MaxDuration { limit } => Predicate::DurationUnder(positive_duration(
            &format!("worker.checks.{}.limit", check.name),
            limit,
        )?),
        CheckRule::BodyContains { needle } => Predicate::BodyContains(needle.clone()),
    };
    Ok(Check::new(check.name.clone(), predicate))
}
