use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) of the generated `rps` value.
pub const RPS_MAX: f64 = 200.0;
/// Upper bound (exclusive) of the generated `cpu` value.
pub const CPU_MAX: f64 = 100.0;

/// Metric sample POSTed to the target on every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub rps: f64,
    pub cpu: f64,
    /// Wall-clock epoch milliseconds at construction time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Per-worker payload source.
pub struct PayloadGenerator {
    rng: StdRng,
    include_timestamp: bool,
}

impl PayloadGenerator {
    /// Create a generator. With a seed the sequence of `rps`/`cpu` values is
    /// reproducible; without one the generator is seeded from OS entropy.
    pub fn new(seed: Option<u64>, include_timestamp: bool) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            include_timestamp,
        }
    }

    pub fn next_payload(&mut self) -> Payload {
        let rps = self.rng.gen_range(0.0..RPS_MAX);
        let cpu = self.rng.gen_range(0.0..CPU_MAX);
        let timestamp = self
            .include_timestamp
            .then(|| chrono::Utc::now().timestamp_millis());
        Payload {
            rps,
            cpu,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = PayloadGenerator::new(Some(42), false);
        let mut b = PayloadGenerator::new(Some(42), false);
        for _ in 0..100 {
            assert_eq!(a.next_payload(), b.next_payload());
        }
    }

    #[test]
    fn test_timestamp_toggle() {
        let before = chrono::Utc::now().timestamp_millis();
        let with = PayloadGenerator::new(Some(1), true).next_payload();
        let after = chrono::Utc::now().timestamp_millis();
        let ts = with.timestamp.expect("timestamp requested");
        assert!(ts >= before && ts <= after);

        let without = PayloadGenerator::new(Some(1), false).next_payload();
        assert!(without.timestamp.is_none());
    }

    #[test]
    fn test_json_shape() {
        let payload = Payload {
            rps: 12.5,
            cpu: 40.0,
            timestamp: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"rps": 12.5, "cpu": 40.0}));

        let payload = Payload {
            timestamp: Some(1_700_000_000_000),
            ..payload
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }

    proptest! {
        #[test]
        fn generated_fields_stay_in_range(seed in any::<u64>()) {
            let mut generator = PayloadGenerator::new(Some(seed), true);
            for _ in 0..64 {
                let p = generator.next_payload();
                prop_assert!((0.0..RPS_MAX).contains(&p.rps));
                prop_assert!((0.0..CPU_MAX).contains(&p.cpu));
            }
        }

        #[test]
        fn payload_survives_json(seed in any::<u64>(), with_ts in any::<bool>()) {
            let payload = PayloadGenerator::new(Some(seed), with_ts).next_payload();
            let text = serde_json::to_string(&payload).unwrap();
            let back: Payload = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(back, payload);
        }
    }
}
