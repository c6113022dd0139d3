use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// A time-boxed segment of the run with a fixed target concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} workers",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

/// Ordered list of stages. Only constructible through [`Schedule::new`], so a
/// value of this type is always non-empty with strictly positive durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    start_concurrency: u32,
    stages: Vec<Stage>,
}

impl Schedule {
    pub fn new(start_concurrency: u32, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        for (idx, stage) in stages.iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(ConfigError::NonPositiveDuration {
                    stage: idx,
                    value: humantime::format_duration(stage.duration).to_string(),
                });
            }
        }
        Ok(Self {
            start_concurrency,
            stages,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn start_concurrency(&self) -> u32 {
        self.start_concurrency
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest level any stage ramps to or from.
    pub fn peak_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_concurrency, u32::max)
    }

    /// Active stage at `elapsed`, or `None` once the schedule has ended.
    pub fn stage_at(&self, elapsed: Duration) -> Option<(usize, &Stage)> {
        let mut stage_end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some((idx, stage));
            }
        }
        None
    }

    /// Desired worker count at `elapsed` since the run started.
    ///
    /// Within a stage of duration `D` ramping from level `S` (the previous
    /// stage's target, or the start concurrency) to `T`, the level at time
    /// `t` into the stage is `S + (T - S) * t / D`, rounded to the nearest
    /// integer. Returns `None` once the schedule has ended.
    pub fn desired_at(&self, elapsed: Duration) -> Option<u32> {
        let mut stage_start = Duration::ZERO;
        let mut from = self.start_concurrency;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let diff = f64::from(stage.target) - f64::from(from);
                let level = f64::from(from) + diff * progress;
                return Some(level.round().max(0.0) as u32);
            }
            stage_start = stage_end;
            from = stage.target;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ms(m: u64) -> Duration {
        Duration::from_millis(m)
    }

    /// Ramp 0 -> 100 over 10s, hold at 100 for 10s, ramp down to 0 over 10s.
    fn ramp_hold_ramp() -> Schedule {
        Schedule::new(
            0,
            vec![
                Stage::new(secs(10), 100),
                Stage::new(secs(10), 100),
                Stage::new(secs(10), 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_schedule() {
        assert!(matches!(
            Schedule::new(0, vec![]),
            Err(ConfigError::EmptySchedule)
        ));
    }

    #[test]
    fn test_rejects_zero_duration() {
        let err = Schedule::new(0, vec![Stage::new(secs(5), 1), Stage::new(Duration::ZERO, 2)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveDuration { stage: 1, .. }));
    }

    #[test]
    fn test_total_duration() {
        assert_eq!(ramp_hold_ramp().total_duration(), secs(30));
    }

    #[rstest]
    #[case(secs(0), Some(0))]
    #[case(secs(5), Some(50))]
    #[case(ms(9_990), Some(100))]
    #[case(secs(10), Some(100))]
    #[case(secs(15), Some(100))]
    #[case(secs(25), Some(50))]
    #[case(ms(29_999), Some(0))]
    #[case(secs(30), None)]
    #[case(secs(31), None)]
    fn test_desired_at(#[case] elapsed: Duration, #[case] expected: Option<u32>) {
        assert_eq!(ramp_hold_ramp().desired_at(elapsed), expected);
    }

    #[rstest]
    #[case(ms(0), 10)]
    #[case(ms(500), 15)]
    #[case(ms(999), 20)]
    fn test_ramps_from_start_concurrency(#[case] elapsed: Duration, #[case] expected: u32) {
        let schedule = Schedule::new(10, vec![Stage::new(secs(1), 20)]).unwrap();
        assert_eq!(schedule.desired_at(elapsed), Some(expected));
    }

    #[test]
    fn test_rounds_to_nearest() {
        // 0 -> 3 over 4s: 0.75 at 1s rounds to 1, 1.5 at 2s rounds to 2.
        let schedule = Schedule::new(0, vec![Stage::new(secs(4), 3)]).unwrap();
        assert_eq!(schedule.desired_at(secs(1)), Some(1));
        assert_eq!(schedule.desired_at(secs(2)), Some(2));
        assert_eq!(schedule.desired_at(ms(3_900)), Some(3));
    }

    #[test]
    fn test_stage_at() {
        let schedule = ramp_hold_ramp();
        assert_eq!(schedule.stage_at(secs(0)).map(|(i, _)| i), Some(0));
        assert_eq!(schedule.stage_at(secs(10)).map(|(i, _)| i), Some(1));
        assert_eq!(schedule.stage_at(ms(29_999)).map(|(i, _)| i), Some(2));
        assert!(schedule.stage_at(secs(30)).is_none());
    }

    #[test]
    fn test_peak_target() {
        let schedule = Schedule::new(
            5,
            vec![Stage::new(secs(1), 50), Stage::new(secs(1), 20)],
        )
        .unwrap();
        assert_eq!(schedule.peak_target(), 50);
    }

    fn arb_schedule() -> impl Strategy<Value = Schedule> {
        (
            0u32..50,
            prop::collection::vec((1u64..5_000, 0u32..200), 1..6),
        )
            .prop_map(|(start, stages)| {
                let stages = stages
                    .into_iter()
                    .map(|(d, t)| Stage::new(Duration::from_millis(d), t))
                    .collect();
                Schedule::new(start, stages).unwrap()
            })
    }

    proptest! {
        #[test]
        fn desired_never_exceeds_surrounding_levels(
            schedule in arb_schedule(),
            frac in 0.0f64..0.999,
        ) {
            let total = schedule.total_duration();
            let elapsed = total.mul_f64(frac);
            let desired = schedule.desired_at(elapsed).unwrap();
            let (idx, stage) = schedule.stage_at(elapsed).unwrap();
            let from = if idx == 0 {
                schedule.start_concurrency()
            } else {
                schedule.stages()[idx - 1].target
            };
            prop_assert!(desired <= from.max(stage.target));
            prop_assert!(desired >= from.min(stage.target));
        }

        #[test]
        fn desired_is_monotone_within_a_stage(
            from in 0u32..200,
            to in 0u32..200,
            millis in 1u64..60_000,
            a in 0.0f64..0.999,
            b in 0.0f64..0.999,
        ) {
            let duration = Duration::from_millis(millis);
            let schedule = Schedule::new(from, vec![Stage::new(duration, to)]).unwrap();
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            let first = schedule.desired_at(duration.mul_f64(early)).unwrap();
            let second = schedule.desired_at(duration.mul_f64(late)).unwrap();
            if to >= from {
                prop_assert!(first <= second, "ramp-up went {first} -> {second}");
            } else {
                prop_assert!(first >= second, "ramp-down went {first} -> {second}");
            }
        }

        #[test]
        fn schedule_ends_at_total_duration(schedule in arb_schedule()) {
            let total = schedule.total_duration();
            prop_assert!(schedule.desired_at(total).is_none());
            prop_assert!(schedule.desired_at(total - Duration::from_millis(1)).is_some());
        }
    }
}
