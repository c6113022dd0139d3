pub mod collector;
pub mod reporter;
pub mod summary;

pub use collector::{CheckTally, LatencyStats, MetricsCollector, WorkerGuard};
pub use reporter::run_progress_reporter;
pub use summary::RunSummary;
