use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{Config, ConfigOverrides, RunPlan, StageConfig};
use crate::error::ConfigError;
use crate::metrics::RunSummary;
use crate::telemetry::LogFormat;

/// Staged virtual-user load generator for JSON metric endpoints
#[derive(Parser, Debug)]
#[command(name = "metric-loadgen")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute the configured ramp against the target
    Run(RunArgs),

    /// Load and validate configuration, print the resolved plan, send nothing
    Validate(ValidateArgs),
}

impl Command {
    pub fn config_args(&self) -> &ConfigArgs {
        match self {
            Command::Run(args) => &args.config,
            Command::Validate(args) => &args.config,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// TOML configuration file (defaults to config/default.toml when present)
    #[arg(short, long, env = "LOADGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target endpoint URL
    #[arg(long)]
    pub url: Option<String>,

    /// Seed for payload generation, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Pause between iterations of one worker (e.g. 100ms)
    #[arg(long)]
    pub sleep: Option<String>,

    /// Per-request timeout (e.g. 30s)
    #[arg(long)]
    pub request_timeout: Option<String>,

    /// Include an epoch-millisecond timestamp in every payload
    #[arg(long)]
    pub include_timestamp: Option<bool>,

    /// Ramp re-evaluation interval (e.g. 1s)
    #[arg(long)]
    pub tick: Option<String>,

    /// Log progress at this interval (e.g. 5s)
    #[arg(long)]
    pub report_interval: Option<String>,

    /// Stage as DURATION:TARGET; repeat to build a schedule. Replaces configured stages.
    #[arg(long = "stage", value_name = "DURATION:TARGET")]
    pub stages: Vec<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ConfigArgs {
    pub fn overrides(&self) -> Result<ConfigOverrides, ConfigError> {
        let stages = self
            .stages
            .iter()
            .map(|s| s.parse::<StageConfig>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ConfigOverrides {
            url: self.url.clone(),
            seed: self.seed,
            sleep: self.sleep.clone(),
            request_timeout: self.request_timeout.clone(),
            include_timestamp: self.include_timestamp,
            tick: self.tick.clone(),
            report_interval: self.report_interval.clone(),
            stages,
        })
    }

    /// File + environment + command line, merged but not yet validated.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply(self.overrides()?);
        Ok(config)
    }

    pub fn load_plan(&self) -> Result<RunPlan, ConfigError> {
        self.load_config()?.into_plan()
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Summary format written to stdout
    #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
    pub summary: SummaryFormat,

    /// Also write the summary to this file
    #[arg(long)]
    pub summary_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Also print the merged configuration as TOML
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    Text,
    Json,
}

/// Process exit statuses, matching k6's conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Passed,
    Unexpected,
    ThresholdsFailed,
    InvalidConfig,
    Aborted,
}

impl RunExit {
    pub fn code(self) -> u8 {
        match self {
            RunExit::Passed => 0,
            RunExit::Unexpected => 1,
            RunExit::ThresholdsFailed => 99,
            RunExit::InvalidConfig => 104,
            RunExit::Aborted => 105,
        }
    }

    pub fn from_summary(summary: &RunSummary) -> Self {
        if summary.aborted {
            RunExit::Aborted
        } else if !summary.thresholds_passed() {
            RunExit::ThresholdsFailed
        } else {
            RunExit::Passed
        }
    }
}

impl From<RunExit> for ExitCode {
    fn from(exit: RunExit) -> Self {
        ExitCode::from(exit.code())
    }
}
