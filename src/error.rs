use thiserror::Error;

/// Configuration failures. All of them are fatal and are reported before any
/// traffic is generated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("schedule must contain at least one stage")]
    EmptySchedule,

    #[error("stage {stage}: duration must be positive, got {value:?}")]
    NonPositiveDuration { stage: usize, value: String },

    #[error("stage {stage}: target concurrency must be >= 0, got {target}")]
    NegativeTarget { stage: usize, target: i64 },

    #[error("stage {stage}: target concurrency {target} is too large")]
    TargetOutOfRange { stage: usize, target: i64 },

    #[error("{field}: invalid duration {value:?}: {reason}")]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },

    #[error("invalid target url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("invalid stage argument {0:?}, expected DURATION:TARGET (e.g. 10s:20)")]
    InvalidStageArg(String),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Load(Box::new(error))
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ConfigError::Invalid(errors.to_string())
    }
}
