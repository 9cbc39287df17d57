//! Owned alert history with its reset schedule
//!
//! AlertHistory is the entry point for applications: it builds the shared
//! aggregator and the reset task together and tears both down together.

use crate::aggregator::reset::ResetTask;
use crate::aggregator::{AlertAggregator, HistoryChange, HistorySnapshot};
use crate::config::HistoryConfig;
use crate::events::{AlertGroup, Axis, Timestamp};
use log::info;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Aggregator shared between the sampler, the reset task and readers
pub type SharedAggregator = Arc<Mutex<AlertAggregator>>;

/// Lock a shared aggregator, recovering the data from a poisoned lock
pub fn lock_aggregator(aggregator: &SharedAggregator) -> MutexGuard<'_, AlertAggregator> {
    aggregator.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Alert history whose periodic reset lives exactly as long as it does
#[derive(Debug)]
pub struct AlertHistory {
    aggregator: SharedAggregator,
    reset_task: ResetTask,
}

impl AlertHistory {
    /// Create an empty history and schedule its first reset
    pub fn new(config: &HistoryConfig) -> Self {
        let aggregator = Arc::new(Mutex::new(AlertAggregator::new(config)));
        let reset_task = ResetTask::spawn(&aggregator, config.reset_interval());

        info!(
            "Alert history created, resetting every {:?}",
            config.reset_interval()
        );

        Self {
            aggregator,
            reset_task,
        }
    }

    /// Handle for components that record samples from another thread
    pub fn aggregator(&self) -> SharedAggregator {
        Arc::clone(&self.aggregator)
    }

    pub fn record_sample(&self, axis: Axis, acceleration: f64, threshold: f64) -> bool {
        lock_aggregator(&self.aggregator).record_sample(axis, acceleration, threshold)
    }

    pub fn close_group(&self, axis: Axis) -> Option<AlertGroup> {
        lock_aggregator(&self.aggregator).close_group(axis)
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        lock_aggregator(&self.aggregator).snapshot()
    }

    pub fn subscribe(&self) -> Receiver<HistoryChange> {
        lock_aggregator(&self.aggregator).subscribe()
    }

    pub fn last_reset_time(&self) -> Timestamp {
        lock_aggregator(&self.aggregator).last_reset_time()
    }

    pub fn next_reset_at(&self) -> Option<Timestamp> {
        self.reset_task.next_reset_at()
    }

    /// Cancel the reset schedule
    ///
    /// The history stays readable and writable afterwards, it just stops
    /// resetting. Dropping the history does the same.
    pub fn shutdown(&mut self) {
        info!("Cancelling alert history reset schedule");
        self.reset_task.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn config_with_interval(reset_interval_secs: u64) -> HistoryConfig {
        HistoryConfig {
            reset_interval_secs,
            ..HistoryConfig::default()
        }
    }

    #[test]
    fn test_history_records_and_closes() {
        let history = AlertHistory::new(&HistoryConfig::default());

        assert!(history.record_sample(Axis::X, 1.2, 1.0));
        assert!(!history.record_sample(Axis::X, 0.2, 1.0));
        let closed = history.close_group(Axis::X).unwrap();
        assert_eq!(closed.peak_value, 1.2);

        let snapshot = history.snapshot();
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.alert_groups, vec![closed]);
        assert!(snapshot.open_groups.is_empty());
    }

    #[test]
    fn test_history_schedules_reset() {
        let history = AlertHistory::new(&HistoryConfig::default());

        let next = history.next_reset_at().unwrap();
        let expected = history.last_reset_time() + chrono::Duration::hours(6);
        assert!((next - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_shutdown_cancels_reset() {
        let mut history = AlertHistory::new(&config_with_interval(3600));
        history.shutdown();

        assert_eq!(history.next_reset_at(), None);
        assert!(history.record_sample(Axis::Z, 1.9, 1.0));
    }

    #[test]
    fn test_concurrent_writers_are_serialized() {
        let history = AlertHistory::new(&HistoryConfig::default());

        let handles: Vec<_> = Axis::ALL
            .iter()
            .map(|axis| {
                let aggregator = history.aggregator();
                let axis = *axis;
                thread::spawn(move || {
                    for i in 0..50 {
                        lock_aggregator(&aggregator).record_sample(axis, 1.5 + i as f64 / 100.0, 1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.events.len(), 150);
        assert_eq!(snapshot.open_groups.len(), 3);
        assert!(snapshot
            .consolidated_alerts
            .windows(2)
            .all(|pair| pair[0].timestamp > pair[1].timestamp));
    }

    #[test]
    fn test_dropping_history_stops_reset_thread() {
        let history = AlertHistory::new(&config_with_interval(6 * 60 * 60));
        let aggregator = history.aggregator();
        drop(history);

        // The joined reset thread released its weak handle
        assert_eq!(Arc::weak_count(&aggregator), 0);
        assert_eq!(Arc::strong_count(&aggregator), 1);
    }
}
