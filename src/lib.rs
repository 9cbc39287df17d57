/// Error types for the alert engine, sources and configuration
pub mod error;

/// Core alert types
pub mod events;

/// Alert aggregation engine with periodic history reset
pub mod aggregator;

/// Accelerometer sampling and sources
pub mod sensor;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{AggregatorError, ConfigError, SourceError};
pub use events::{AlertEvent, AlertGroup, Axis, ConsolidatedAlert};
