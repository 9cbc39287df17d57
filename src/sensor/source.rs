//! Acceleration sources feeding the sampler
//!
//! A source yields one tri-axial reading per call. Two implementations are
//! provided: a deterministic simulator and a replay of recorded JSON lines.

use crate::error::SourceError;
use crate::events::Axis;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::path::Path;

/// One tri-axial accelerometer reading, in g
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AccelerationReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelerationReading {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Per-axis values in axis priority order
    pub fn iter(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        Axis::ALL.into_iter().map(move |axis| (axis, self.axis(axis)))
    }
}

/// Producer of accelerometer readings
#[cfg_attr(test, mockall::automock)]
pub trait AccelerationSource: Send {
    /// Read the next sample
    ///
    /// Returns `SourceError::Exhausted` once a finite source has no more data.
    fn read(&mut self) -> Result<AccelerationReading, SourceError>;
}

/// Deterministic synthetic accelerometer
///
/// Produces a low-amplitude oscillation on every axis, interrupted at a fixed
/// cadence by a burst on a single axis whose peak exceeds `burst_peak`. The
/// bursting axis rotates X, Y, Z.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    step: u64,
    /// Readings between the starts of two bursts
    burst_every: u64,
    /// Readings a burst lasts
    burst_len: u64,
    /// Peak magnitude of a burst, in g
    burst_peak: f64,
    /// Amplitude of the background oscillation, in g
    noise: f64,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        // At 10 Hz: a 0.8 s burst every 5 s
        Self::new(50, 8, 1.6)
    }
}

impl SimulatedSource {
    pub fn new(burst_every: u64, burst_len: u64, burst_peak: f64) -> Self {
        Self {
            step: 0,
            burst_every: burst_every.max(1),
            burst_len: burst_len.min(burst_every.max(1)),
            burst_peak,
            noise: 0.05,
        }
    }

    fn background(&self, phase: f64) -> f64 {
        self.noise * (self.step as f64 * 0.7 + phase).sin()
    }
}

impl AccelerationSource for SimulatedSource {
    fn read(&mut self) -> Result<AccelerationReading, SourceError> {
        let mut reading = AccelerationReading::new(
            self.background(0.0),
            self.background(2.1),
            self.background(4.2),
        );

        let burst = self.step / self.burst_every;
        let offset = self.step % self.burst_every;
        if offset < self.burst_len {
            // Half sine from 0 to the peak and back, alternating sign per burst
            let envelope = (PI * (offset as f64 + 0.5) / self.burst_len as f64).sin();
            let sign = if burst % 2 == 0 { 1.0 } else { -1.0 };
            let value = sign * self.burst_peak * envelope;
            match Axis::ALL[(burst % 3) as usize] {
                Axis::X => reading.x += value,
                Axis::Y => reading.y += value,
                Axis::Z => reading.z += value,
            }
        }

        self.step += 1;
        Ok(reading)
    }
}

/// Replays readings recorded as JSON lines
///
/// Each non-empty line is an object `{"x": .., "y": .., "z": ..}`.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    readings: VecDeque<AccelerationReading>,
}

impl ReplaySource {
    pub fn from_readings(readings: Vec<AccelerationReading>) -> Self {
        Self {
            readings: readings.into(),
        }
    }

    /// Load a JSON-lines recording
    ///
    /// # Errors
    ///
    /// Returns `SourceError::IoError` if the file cannot be read and
    /// `SourceError::Parse` with the 1-based line number of the first
    /// malformed line.
    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)?;
        let source = Self::parse(&contents)?;
        debug!(
            "Loaded {} readings from {}",
            source.remaining(),
            path.display()
        );
        Ok(source)
    }

    pub fn parse(contents: &str) -> Result<Self, SourceError> {
        let readings = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<AccelerationReading>(line).map_err(|e| SourceError::Parse {
                    line: index + 1,
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_readings(readings))
    }

    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl AccelerationSource for ReplaySource {
    fn read(&mut self) -> Result<AccelerationReading, SourceError> {
        self.readings.pop_front().ok_or(SourceError::Exhausted)
    }
}
