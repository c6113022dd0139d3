use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use metric_loadgen::cli::{Cli, Command, RunArgs, RunExit, SummaryFormat, ValidateArgs};
use metric_loadgen::config::RunPlan;
use metric_loadgen::driver::LoadDriver;
use metric_loadgen::telemetry::{cancel_on_signal, init_tracing};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let common = cli.command.config_args();
    init_tracing(common.log_format, common.verbose);
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded .env");
    }

    let exit = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Validate(args) => validate(args),
    };
    match exit {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!(error = %format!("{e:#}"), "load generator failed");
            eprintln!("error: {e:#}");
            RunExit::Unexpected.into()
        }
    }
}

async fn run(args: RunArgs) -> Result<RunExit> {
    let plan = match args.config.load_plan() {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "invalid configuration, no requests sent");
            eprintln!("configuration error: {e}");
            return Ok(RunExit::InvalidConfig);
        }
    };

    let driver = LoadDriver::http(plan).context("failed to build HTTP client")?;
    let summary = driver.run(cancel_on_signal()).await;

    let rendered = match args.summary {
        SummaryFormat::Text => summary.render_text(),
        SummaryFormat::Json => summary.to_json().context("failed to serialize summary")?,
    };
    println!("{rendered}");
    if let Some(path) = &args.summary_file {
        tokio::fs::write(path, &rendered)
            .await
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
    }

    let exit = RunExit::from_summary(&summary);
    match exit {
        RunExit::Passed => info!(
            requests = summary.requests,
            failed_checks = summary.failed_checks(),
            "run passed"
        ),
        RunExit::ThresholdsFailed => {
            for t in summary.thresholds.iter().filter(|t| !t.passed) {
                warn!(threshold = %t.name, observed = t.observed, "threshold violated");
            }
        }
        _ => warn!(?exit, "run did not complete normally"),
    }
    Ok(exit)
}

fn validate(args: ValidateArgs) -> Result<RunExit> {
    let config = match args.config.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return Ok(RunExit::InvalidConfig);
        }
    };
    if args.show_config {
        println!(
            "{}",
            toml::to_string_pretty(&config).context("failed to render configuration")?
        );
    }
    match config.into_plan() {
        Ok(plan) => {
            print_plan(&plan);
            Ok(RunExit::Passed)
        }
        Err(e) => {
            eprintln!("configuration error: {e}");
            Ok(RunExit::InvalidConfig)
        }
    }
}

fn print_plan(plan: &RunPlan) {
    let schedule = &plan.schedule;
    println!("target:          {}", plan.target.url);
    println!(
        "request timeout: {}",
        humantime::format_duration(plan.target.request_timeout)
    );
    println!("seed:            {}", plan.seed);
    println!("sleep:           {}", humantime::format_duration(plan.worker.sleep));
    println!("timestamp:       {}", plan.worker.include_timestamp);
    println!("stages (starting at {} workers):", schedule.start_concurrency());
    for (idx, stage) in schedule.stages().iter().enumerate() {
        println!("  {idx}: {stage}");
    }
    println!(
        "total duration:  {}",
        humantime::format_duration(schedule.total_duration())
    );
    println!("checks:          {}", plan.checks.names().collect::<Vec<_>>().join(", "));
    if plan.thresholds.is_empty() {
        println!("thresholds:      none");
    } else {
        if let Some(rate) = plan.thresholds.max_error_rate {
            println!("thresholds:      error_rate < {rate}");
        }
        for t in &plan.thresholds.latency {
            println!(
                "                 p({}) < {}",
                t.percentile,
                humantime::format_duration(t.max)
            );
        }
        if let Some(rate) = plan.thresholds.min_check_pass_rate {
            println!("                 check_pass_rate >= {rate}");
        }
    }
}
