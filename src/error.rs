use thiserror::Error;

/// Rejected parameter bundle. Raised before any conversion runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("resolution must be between 1 and {max} bits, got {got}")]
    Resolution { got: u32, max: u32 },

    #[error("array_size must be at least 1")]
    EmptyArray,

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },

    #[error("individual_weights has {got} entries but array_size is {expected}")]
    WeightCount { expected: usize, got: usize },

    #[error("radix must be greater than 1, got {0}")]
    Radix(f64),

    #[error("positive reference ({positive} V) must exceed negative reference ({negative} V)")]
    ReferenceOrder { positive: f64, negative: f64 },

    #[error("unknown switching strategy `{0}` (expected one of: monotonic, bss)")]
    UnknownStrategy(String),

    #[error(
        "testbench vectors differ in length: {times} times, {positive} positive, {negative} negative inputs"
    )]
    TestbenchLength {
        times: usize,
        positive: usize,
        negative: usize,
    },

    #[error("testbench simulation times must be non-decreasing")]
    TestbenchOrder,

    #[error("{field}: {reason}")]
    Distribution { field: &'static str, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Invalid settings handed to one of the measurement drivers.
#[derive(Debug, Error)]
pub enum MeasureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    #[error("{0}")]
    Invalid(String),
}

/// Failure while persisting a results blob.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
