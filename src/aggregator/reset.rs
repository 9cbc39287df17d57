//! Deferred, cancellable history reset
//!
//! The ResetTask owns a background thread that purges the alert history once
//! per interval. It only holds a weak reference to the aggregator, so it can
//! never keep a torn-down history alive, and it is cancelled when dropped.

use crate::aggregator::history::{lock_aggregator, SharedAggregator};
use crate::aggregator::AlertAggregator;
use crate::events::Timestamp;
use chrono::Utc;
use log::{debug, error, info};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to a scheduled, repeating history reset
#[derive(Debug)]
pub struct ResetTask {
    /// Time between two resets
    interval: Duration,
    /// Sending on (or dropping) this channel cancels the task
    cancel_sender: Option<Sender<()>>,
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    /// Wall-clock time of the next scheduled reset
    next_reset: Arc<Mutex<Option<Timestamp>>>,
}

impl ResetTask {
    /// Schedule a reset of `aggregator` every `interval`, starting one
    /// interval from now
    pub fn spawn(aggregator: &SharedAggregator, interval: Duration) -> Self {
        let (cancel_sender, cancel_receiver) = mpsc::channel();
        let next_reset = Arc::new(Mutex::new(deadline_after(interval)));

        let target = Arc::downgrade(aggregator);
        let thread_next_reset = Arc::clone(&next_reset);

        debug!("Spawning history reset thread with interval {:?}", interval);
        let handle = thread::spawn(move || {
            Self::reset_thread(target, interval, cancel_receiver, thread_next_reset);
        });

        Self {
            interval,
            cancel_sender: Some(cancel_sender),
            thread_handle: Some(handle),
            next_reset,
        }
    }

    fn reset_thread(
        target: Weak<Mutex<AlertAggregator>>,
        interval: Duration,
        cancel_receiver: mpsc::Receiver<()>,
        next_reset: Arc<Mutex<Option<Timestamp>>>,
    ) {
        info!("History reset thread started");
        let mut deadline = Instant::now() + interval;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match cancel_receiver.recv_timeout(remaining) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("History reset thread cancelled");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            let Some(aggregator) = target.upgrade() else {
                debug!("Alert history dropped, stopping reset thread");
                break;
            };
            lock_aggregator(&aggregator).reset_history();
            drop(aggregator);

            deadline = Instant::now() + interval;
            let next = deadline_after(interval);
            *next_reset.lock().unwrap_or_else(PoisonError::into_inner) = next;
            if let Some(next) = next {
                info!("Next history reset scheduled at {}", next);
            }
        }

        info!("History reset thread stopped");
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wall-clock time of the next reset, if one is still pending
    pub fn next_reset_at(&self) -> Option<Timestamp> {
        if !self.is_active() {
            return None;
        }
        *self.next_reset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a reset is still scheduled
    pub fn is_active(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel the pending reset and wait for the thread to exit
    ///
    /// Calling this more than once is a no-op.
    pub fn cancel(&mut self) {
        if let Some(sender) = self.cancel_sender.take() {
            // A closed channel means the thread already exited
            let _ = sender.send(());
        }

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("History reset thread panicked");
            }
        }
    }
}

impl Drop for ResetTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn deadline_after(interval: Duration) -> Option<Timestamp> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
}
