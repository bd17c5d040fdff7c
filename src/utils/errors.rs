use thiserror::Error;

/// Errors raised while loading, validating or saving settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("At least one target time slot must be selected")]
    NoTargetTimes,

    #[error("Retry interval must be a non-negative number of seconds no larger than a Duration can hold (got {0})")]
    InvalidRetryInterval(f64),

    #[error("Timeout cannot exceed {max_ms}ms. Received: {received_ms}ms")]
    TimeoutTooLarge { max_ms: u64, received_ms: u64 },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("YAML parse error: {0}")]
    YamlError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::YamlError(err.to_string())
    }
}
