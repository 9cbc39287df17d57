use crate::aggregator::{lock_aggregator, AlertAggregator, SharedAggregator};
use crate::config::{SamplingConfig, MAX_THRESHOLD, MIN_THRESHOLD};
use crate::error::SourceError;
use crate::events::Timestamp;
use crate::sensor::source::{AccelerationReading, AccelerationSource};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Fixed-rate sampler feeding an alert aggregator
///
/// Reads an `AccelerationSource` on a background thread at a fixed interval,
/// records every axis against the current threshold and, when enabled, closes
/// an axis's alert group as soon as that axis reads back within threshold.
/// All writes go through the shared aggregator lock, which serializes them
/// with the history reset.
pub struct Seismometer {
    /// Time between two reads
    interval: Duration,
    /// Current alert threshold in g, adjustable while running
    threshold: Arc<Mutex<f64>>,
    /// Close groups when their axis returns to normal
    close_on_recovery: bool,
    /// Aggregator receiving the samples
    aggregator: SharedAggregator,
    /// Source, parked here while the sampler is stopped
    source: Option<Box<dyn AccelerationSource>>,
    /// Handle to the background thread, which hands the source back on exit
    thread_handle: Option<JoinHandle<Box<dyn AccelerationSource>>>,
    /// Shared state for controlling the sampler
    running: Arc<Mutex<bool>>,
}

impl Seismometer {
    /// Create a new Seismometer
    ///
    /// # Arguments
    ///
    /// * `config` - Sampling interval, initial threshold and recovery policy
    /// * `source` - Where readings come from
    /// * `aggregator` - Where alerts are recorded
    pub fn new(
        config: &SamplingConfig,
        source: Box<dyn AccelerationSource>,
        aggregator: SharedAggregator,
    ) -> Self {
        Self {
            interval: config.interval(),
            threshold: Arc::new(Mutex::new(config.threshold)),
            close_on_recovery: config.close_on_recovery,
            aggregator,
            source: Some(source),
            thread_handle: None,
            running: Arc::new(Mutex::new(false)),
        }
    }

    /// Start sampling on a background thread
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` if the source was lost by a
    /// panicking sampler thread.
    pub fn start(&mut self) -> Result<(), SourceError> {
        info!("Starting Seismometer with interval: {:?}", self.interval);

        if self.is_running() {
            info!("Seismometer already running, skipping start");
            return Ok(());
        }

        // Reclaim the source from a thread that stopped on its own
        self.join_thread();

        let source = self.source.take().ok_or_else(|| {
            SourceError::Unavailable("acceleration source lost by a previous run".to_string())
        })?;

        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = true;

        let interval = self.interval;
        let threshold = Arc::clone(&self.threshold);
        let close_on_recovery = self.close_on_recovery;
        let aggregator = Arc::clone(&self.aggregator);
        let running = Arc::clone(&self.running);

        debug!("Spawning Seismometer background thread");
        let handle = thread::spawn(move || {
            Self::sampler_thread(
                source,
                interval,
                threshold,
                close_on_recovery,
                aggregator,
                running,
            )
        });

        self.thread_handle = Some(handle);
        info!("Seismometer started successfully");
        Ok(())
    }

    /// Stop sampling and wait for the background thread to finish
    pub fn stop(&mut self) {
        info!("Stopping Seismometer");

        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.join_thread();

        info!("Seismometer stopped");
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!("Waiting for Seismometer thread to join");
            match handle.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => error!("Seismometer thread panicked, acceleration source lost"),
            }
        }
    }

    fn sampler_thread(
        mut source: Box<dyn AccelerationSource>,
        interval: Duration,
        threshold: Arc<Mutex<f64>>,
        close_on_recovery: bool,
        aggregator: SharedAggregator,
        running: Arc<Mutex<bool>>,
    ) -> Box<dyn AccelerationSource> {
        info!("Seismometer thread started");
        let mut samples: u64 = 0;

        while *running.lock().unwrap_or_else(PoisonError::into_inner) {
            let tick_start = Instant::now();

            match source.read() {
                Ok(reading) => {
                    let current = *threshold.lock().unwrap_or_else(PoisonError::into_inner);
                    let mut guard = lock_aggregator(&aggregator);
                    process_reading(&mut guard, &reading, current, close_on_recovery, Utc::now);
                    samples += 1;
                }
                Err(SourceError::Exhausted) => {
                    info!("Acceleration source exhausted after {} samples", samples);
                    break;
                }
                Err(e) => {
                    warn!("Failed to read acceleration sample: {}", e);
                }
            }

            let elapsed = tick_start.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        *running.lock().unwrap_or_else(PoisonError::into_inner) = false;
        info!("Seismometer thread stopped after {} samples", samples);
        source
    }

    /// Change the alert threshold used for subsequent samples
    ///
    /// # Errors
    ///
    /// Returns `SourceError::InvalidThreshold` outside 0.1 to 2.0 g.
    pub fn set_threshold(&self, threshold: f64) -> Result<(), SourceError> {
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
            return Err(SourceError::InvalidThreshold(threshold));
        }

        info!("Alert threshold set to {:.2} g", threshold);
        *self.threshold.lock().unwrap_or_else(PoisonError::into_inner) = threshold;
        Ok(())
    }

    pub fn threshold(&self) -> f64 {
        *self.threshold.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if the sampler is currently running
    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Seismometer {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

/// Record one reading on every axis, X first
///
/// `clock` is asked for a fresh timestamp per axis. With `close_on_recovery`,
/// an axis reading within threshold closes that axis's open group. Returns
/// the number of axes that raised an alert.
pub fn process_reading<F>(
    aggregator: &mut AlertAggregator,
    reading: &AccelerationReading,
    threshold: f64,
    close_on_recovery: bool,
    mut clock: F,
) -> usize
where
    F: FnMut() -> Timestamp,
{
    let mut alerts = 0;

    for (axis, value) in reading.iter() {
        if aggregator.record_sample_at(axis, value, threshold, clock()) {
            alerts += 1;
        } else if close_on_recovery && aggregator.open_group(axis).is_some() {
            aggregator.close_group(axis);
        }
    }

    alerts
}
