use std::path::PathBuf;
use std::time::Duration;

use metric_loadgen::config::Config;
use rstest::rstest;

fn preset(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config").join(name)
}

#[rstest]
#[case("default.toml", 4, 50, Duration::from_secs(70))]
#[case("ramp-100.toml", 3, 100, Duration::from_secs(50))]
fn test_shipped_presets_are_valid(
    #[case] file: &str,
    #[case] stages: usize,
    #[case] peak: u32,
    #[case] total: Duration,
) {
    let plan = Config::load(Some(preset(file).as_path()))
        .and_then(Config::into_plan)
        .unwrap_or_else(|e| panic!("{file}: {e}"));

    assert_eq!(plan.schedule.stages().len(), stages);
    assert_eq!(plan.schedule.peak_target(), peak);
    assert_eq!(plan.schedule.total_duration(), total);
    assert_eq!(plan.target.url.as_str(), "http://localhost:8080/metric");
}

#[test]
fn test_presets_differ_only_in_tuning() {
    let thresholded = Config::load(Some(preset("default.toml").as_path()))
        .and_then(Config::into_plan)
        .unwrap();
    let ramp = Config::load(Some(preset("ramp-100.toml").as_path()))
        .and_then(Config::into_plan)
        .unwrap();

    assert_eq!(thresholded.worker.sleep, Duration::from_millis(100));
    assert!(thresholded.worker.include_timestamp);
    assert_eq!(thresholded.thresholds.max_error_rate, Some(0.01));

    assert_eq!(ramp.worker.sleep, Duration::ZERO);
    assert!(!ramp.worker.include_timestamp);
    assert!(ramp.thresholds.is_empty());

    assert_eq!(
        thresholded.checks.names().collect::<Vec<_>>(),
        ramp.checks.names().collect::<Vec<_>>()
    );
}
