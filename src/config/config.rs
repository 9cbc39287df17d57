use crate::aggregator::ConsolidationOrder;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Lowest threshold the sampler accepts, in g
pub const MIN_THRESHOLD: f64 = 0.1;
/// Highest threshold the sampler accepts, in g
pub const MAX_THRESHOLD: f64 = 2.0;

/// Application configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub history: HistoryConfig,
}

/// Sampler settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Time between two accelerometer reads, in milliseconds
    pub interval_ms: u64,
    /// Initial alert threshold in g
    pub threshold: f64,
    /// Close an axis group as soon as that axis reads back within threshold
    pub close_on_recovery: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100, // 10 Hz
            threshold: 1.0,
            close_on_recovery: true,
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Alert history settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Time between two full history resets, in seconds
    pub reset_interval_secs: u64,
    /// Also clear the consolidated feed on reset
    pub clear_consolidated_on_reset: bool,
    pub consolidation: ConsolidationOrder,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            reset_interval_secs: 6 * 60 * 60,
            clear_consolidated_on_reset: false,
            consolidation: ConsolidationOrder::default(),
        }
    }
}

impl HistoryConfig {
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read, a parse
    /// error for malformed TOML and `ConfigError::ValidationError` for values
    /// out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "sampling.interval_ms must be greater than 0".to_string(),
            ));
        }

        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&self.sampling.threshold) {
            return Err(ConfigError::ValidationError(format!(
                "sampling.threshold must be between {} and {}, got {}",
                MIN_THRESHOLD, MAX_THRESHOLD, self.sampling.threshold
            )));
        }

        if self.history.reset_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "history.reset_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
