//! Core alert types for the acceleration alert engine
//!
//! This module defines the fundamental data structures shared by the aggregator,
//! the sampler and any consumer of the published history: axes, raw alert
//! events, per-axis alert groups and consolidated alert rows.

use crate::error::AggregatorError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Measurement channel of a tri-axial accelerometer
///
/// The declaration order (X, Y, Z) is also the tie-break priority used when
/// two open groups share the same peak value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in priority order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            _ => Err(AggregatorError::InvalidAxis(s.to_string())),
        }
    }
}

/// A single over-threshold sample
///
/// Created once per sample whose magnitude exceeds the threshold in effect.
/// Two events are equal only if they carry the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unique id assigned by the aggregator
    pub id: u64,
    /// When the sample was recorded
    pub timestamp: Timestamp,
    /// Axis the sample was taken on
    pub axis: Axis,
    /// Signed acceleration in g
    pub acceleration: f64,
    /// Threshold in effect when the event was created
    pub threshold: f64,
}

impl PartialEq for AlertEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AlertEvent {}

/// One contiguous episode of alerting on a single axis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertGroup {
    pub axis: Axis,
    pub start_time: Timestamp,
    /// Time of the most recent over-threshold sample in this episode
    pub end_time: Timestamp,
    /// Largest absolute acceleration seen in this episode
    pub peak_value: f64,
    pub peak_time: Timestamp,
    /// Threshold in effect at the most recent update
    pub threshold: f64,
}

impl AlertGroup {
    /// Open a new group from its first over-threshold sample
    pub fn open(axis: Axis, magnitude: f64, threshold: f64, now: Timestamp) -> Self {
        Self {
            axis,
            start_time: now,
            end_time: now,
            peak_value: magnitude,
            peak_time: now,
            threshold,
        }
    }

    /// Return this group extended by another over-threshold sample
    ///
    /// The peak time only moves when `magnitude` is strictly larger than the
    /// current peak. The threshold is always overwritten.
    pub fn extended(&self, magnitude: f64, threshold: f64, now: Timestamp) -> Self {
        let (peak_value, peak_time) = if magnitude > self.peak_value {
            (magnitude, now)
        } else {
            (self.peak_value, self.peak_time)
        };

        Self {
            axis: self.axis,
            start_time: self.start_time,
            end_time: now,
            peak_value,
            peak_time,
            threshold,
        }
    }

    /// Stable identifier derived from the axis and the start time
    pub fn id(&self) -> String {
        format!("{}_{}", self.axis, self.start_time.timestamp_micros())
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration())
    }
}

/// Summary row naming the strongest currently alerting axis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsolidatedAlert {
    pub id: u64,
    /// End time of the winning group when the row was computed
    pub timestamp: Timestamp,
    pub strongest_axis: Axis,
    pub strongest_value: f64,
    pub threshold: f64,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl ConsolidatedAlert {
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }
}

/// Format a duration as `"42s"` below one minute and `"3m 7s"` above
///
/// Fractional seconds are truncated and negative durations render as `"0s"`.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else {
        format!("{}m {}s", seconds / 60, seconds % 60)
    }
}

mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::milliseconds)
    }
}
