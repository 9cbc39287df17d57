/// Fixed-rate sampler feeding the alert aggregator
pub mod seismometer;

/// Acceleration sources: simulated and replayed readings
pub mod source;

pub use seismometer::{process_reading, Seismometer};
pub use source::{AccelerationReading, AccelerationSource, ReplaySource, SimulatedSource};
