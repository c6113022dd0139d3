pub mod checks;
pub mod cli;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod telemetry;
pub mod thresholds;
