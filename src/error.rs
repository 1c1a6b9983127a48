use thiserror::Error;

/// Failures reported by a `SampleSource`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),

    #[error("Transient read failure: {0}")]
    TransientRead(String),
}

/// Rejected session transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Missing job label")]
    EmptyJobLabel,

    #[error("Job label too long ({len} bytes, max {max})")]
    JobLabelTooLong { len: usize, max: usize },
}

/// Configuration values that cannot drive the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be in (0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{0} must be non-zero")]
    Zero(&'static str),
}

/// Crate-level error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeedReaderError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, SpeedReaderError>;
