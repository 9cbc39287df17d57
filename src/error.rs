use thiserror::Error;

/// Errors raised at the boundary of the alert aggregation engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregatorError {
    #[error("Invalid axis identifier: {0}")]
    InvalidAxis(String),
}

/// Errors that can occur while reading acceleration samples
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to parse sample on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Acceleration source exhausted")]
    Exhausted,

    #[error("Threshold out of range: {0}")]
    InvalidThreshold(f64),

    #[error("Acceleration source unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
