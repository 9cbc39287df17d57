/// Configuration loading and validation
#[allow(clippy::module_inception)]
pub mod config;

pub use config::{Config, HistoryConfig, SamplingConfig, MAX_THRESHOLD, MIN_THRESHOLD};
