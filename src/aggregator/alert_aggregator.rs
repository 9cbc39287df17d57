//! Alert aggregation engine
//!
//! This module provides the AlertAggregator, which turns a stream of per-axis
//! acceleration samples into a raw alert log, contiguous per-axis alert groups
//! and a deduplicated consolidated feed naming the strongest alerting axis.

use crate::config::HistoryConfig;
use crate::events::{AlertEvent, AlertGroup, Axis, ConsolidatedAlert, Timestamp};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Number of closed groups returned by `recent_groups` when no limit is given
pub const DEFAULT_RECENT_GROUPS: usize = 10;

/// Number of consolidated rows shown on a summary view
pub const DEFAULT_CONSOLIDATED_DISPLAY: usize = 8;

/// When the consolidated feed is recomputed relative to a group update
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationOrder {
    /// Store the new or extended group first, then recompute
    #[default]
    AfterUpdate,
    /// Recompute only when an existing group is extended, while the triggering
    /// axis still holds its previous state
    BeforeUpdate,
}

/// Change published to subscribers after every mutation
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryChange {
    EventRecorded(AlertEvent),
    /// A group was opened or extended
    GroupUpdated(AlertGroup),
    GroupClosed(AlertGroup),
    ConsolidatedAdded(ConsolidatedAlert),
    Reset { at: Timestamp },
}

/// Point-in-time copy of every published collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistorySnapshot {
    pub events: Vec<AlertEvent>,
    pub alert_groups: Vec<AlertGroup>,
    pub open_groups: BTreeMap<Axis, AlertGroup>,
    pub consolidated_alerts: Vec<ConsolidatedAlert>,
    pub last_reset_time: Timestamp,
}

/// Owner of the alert history
///
/// All mutation goes through `record_sample`, `close_group` and
/// `reset_history`. Callers sharing an aggregator across threads must
/// serialize those calls (see `AlertHistory`).
#[derive(Debug)]
pub struct AlertAggregator {
    /// Raw over-threshold samples in arrival order
    events: Vec<AlertEvent>,
    /// Groups finalized through `close_group`
    alert_groups: Vec<AlertGroup>,
    /// Groups still accumulating samples, keyed by axis
    open_groups: BTreeMap<Axis, AlertGroup>,
    /// Strongest-axis rows, newest first
    consolidated_alerts: Vec<ConsolidatedAlert>,
    last_reset_time: Timestamp,
    order: ConsolidationOrder,
    clear_consolidated_on_reset: bool,
    next_id: u64,
    subscribers: Vec<Sender<HistoryChange>>,
}

impl Default for AlertAggregator {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

impl AlertAggregator {
    /// Create an empty aggregator whose history starts now
    ///
    /// # Examples
    ///
    /// ```
    /// use seismo::aggregator::AlertAggregator;
    /// use seismo::config::HistoryConfig;
    /// use seismo::events::Axis;
    ///
    /// let mut aggregator = AlertAggregator::new(&HistoryConfig::default());
    /// assert!(aggregator.record_sample(Axis::X, 1.4, 1.0));
    /// assert!(!aggregator.record_sample(Axis::Y, 0.3, 1.0));
    /// ```
    pub fn new(config: &HistoryConfig) -> Self {
        Self::new_at(config, Utc::now())
    }

    /// Create an empty aggregator whose history starts at `now`
    pub fn new_at(config: &HistoryConfig, now: Timestamp) -> Self {
        Self {
            events: Vec::new(),
            alert_groups: Vec::new(),
            open_groups: BTreeMap::new(),
            consolidated_alerts: Vec::new(),
            last_reset_time: now,
            order: config.consolidation,
            clear_consolidated_on_reset: config.clear_consolidated_on_reset,
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    /// Record one sample taken now
    ///
    /// Returns `true` if the sample exceeded its threshold and raised an alert.
    pub fn record_sample(&mut self, axis: Axis, acceleration: f64, threshold: f64) -> bool {
        self.record_sample_at(axis, acceleration, threshold, Utc::now())
    }

    /// Record one sample taken at `now`
    ///
    /// Samples with `|acceleration| <= threshold` are dropped without any
    /// trace. Every other sample appends an `AlertEvent` and opens or extends
    /// the open group of its axis.
    pub fn record_sample_at(
        &mut self,
        axis: Axis,
        acceleration: f64,
        threshold: f64,
        now: Timestamp,
    ) -> bool {
        let magnitude = acceleration.abs();
        if magnitude.is_nan() || magnitude <= threshold {
            return false;
        }

        let event = AlertEvent {
            id: self.allocate_id(),
            timestamp: now,
            axis,
            acceleration,
            threshold,
        };
        debug!(
            "Alert on axis {}: {:.3} g exceeds {:.3} g",
            axis, acceleration, threshold
        );
        self.events.push(event.clone());
        self.publish(HistoryChange::EventRecorded(event));

        self.update_group(axis, magnitude, threshold, now);
        true
    }

    /// Open or extend the group for `axis` and refresh the consolidated feed
    fn update_group(&mut self, axis: Axis, magnitude: f64, threshold: f64, now: Timestamp) {
        let existing = self.open_groups.get(&axis).cloned();

        match existing {
            None => {
                let group = AlertGroup::open(axis, magnitude, threshold, now);
                info!(
                    "Alert group {} opened on axis {} at {:.3} g",
                    group.id(),
                    axis,
                    magnitude
                );
                self.open_groups.insert(axis, group.clone());
                self.publish(HistoryChange::GroupUpdated(group));

                if self.order == ConsolidationOrder::AfterUpdate {
                    self.update_consolidated();
                }
            }
            Some(existing) => {
                let updated = existing.extended(magnitude, threshold, now);

                match self.order {
                    ConsolidationOrder::AfterUpdate => {
                        self.open_groups.insert(axis, updated.clone());
                        self.publish(HistoryChange::GroupUpdated(updated));
                        self.update_consolidated();
                    }
                    ConsolidationOrder::BeforeUpdate => {
                        self.update_consolidated();
                        self.open_groups.insert(axis, updated.clone());
                        self.publish(HistoryChange::GroupUpdated(updated));
                    }
                }
            }
        }
    }

    /// Finalize the open group of `axis`
    ///
    /// Moves the group unchanged into the closed list and returns it. Does
    /// nothing if the axis has no open group.
    pub fn close_group(&mut self, axis: Axis) -> Option<AlertGroup> {
        let group = self.open_groups.remove(&axis)?;

        info!(
            "Alert group {} closed: peak {:.3} g, lasted {}",
            group.id(),
            group.peak_value,
            group.formatted_duration()
        );
        self.alert_groups.push(group.clone());
        self.publish(HistoryChange::GroupClosed(group.clone()));
        Some(group)
    }

    /// Open group with the highest peak, earliest axis first on ties
    fn strongest_open_group(&self) -> Option<&AlertGroup> {
        self.open_groups
            .values()
            .fold(None, |best: Option<&AlertGroup>, group| match best {
                Some(best) if group.peak_value <= best.peak_value => Some(best),
                _ => Some(group),
            })
    }

    /// Append a consolidated row for the strongest open group
    ///
    /// Rows are unique by timestamp; the feed is kept sorted newest first.
    fn update_consolidated(&mut self) {
        let Some(strongest) = self.strongest_open_group() else {
            return;
        };

        let timestamp = strongest.end_time;
        if self
            .consolidated_alerts
            .iter()
            .any(|alert| alert.timestamp == timestamp)
        {
            debug!("Consolidated row at {} already present, skipping", timestamp);
            return;
        }

        let strongest_axis = strongest.axis;
        let strongest_value = strongest.peak_value;
        let threshold = strongest.threshold;
        let duration = strongest.duration();

        let alert = ConsolidatedAlert {
            id: self.allocate_id(),
            timestamp,
            strongest_axis,
            strongest_value,
            threshold,
            duration,
        };

        self.consolidated_alerts.push(alert.clone());
        self.consolidated_alerts
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.publish(HistoryChange::ConsolidatedAdded(alert));
    }

    /// Purge the history now
    pub fn reset_history(&mut self) {
        self.reset_history_at(Utc::now());
    }

    /// Purge raw events, closed groups and open groups
    ///
    /// The consolidated feed survives unless the aggregator was configured
    /// with `clear_consolidated_on_reset`.
    pub fn reset_history_at(&mut self, now: Timestamp) {
        info!(
            "Resetting alert history: {} events, {} closed groups, {} open groups",
            self.events.len(),
            self.alert_groups.len(),
            self.open_groups.len()
        );

        self.events.clear();
        self.alert_groups.clear();
        self.open_groups.clear();
        if self.clear_consolidated_on_reset {
            self.consolidated_alerts.clear();
        }
        self.last_reset_time = now;

        self.publish(HistoryChange::Reset { at: now });
    }

    pub fn events(&self) -> &[AlertEvent] {
        &self.events
    }

    pub fn alert_groups(&self) -> &[AlertGroup] {
        &self.alert_groups
    }

    pub fn open_groups(&self) -> &BTreeMap<Axis, AlertGroup> {
        &self.open_groups
    }

    pub fn open_group(&self, axis: Axis) -> Option<&AlertGroup> {
        self.open_groups.get(&axis)
    }

    pub fn consolidated_alerts(&self) -> &[ConsolidatedAlert] {
        &self.consolidated_alerts
    }

    pub fn last_reset_time(&self) -> Timestamp {
        self.last_reset_time
    }

    /// Raw events of one axis in arrival order
    pub fn events_for_axis(&self, axis: Axis) -> Vec<AlertEvent> {
        self.events
            .iter()
            .filter(|event| event.axis == axis)
            .cloned()
            .collect()
    }

    /// Closed groups of one axis in closing order
    pub fn groups_for_axis(&self, axis: Axis) -> Vec<AlertGroup> {
        self.alert_groups
            .iter()
            .filter(|group| group.axis == axis)
            .cloned()
            .collect()
    }

    /// Up to `limit` closed groups, most recently ended first
    pub fn recent_groups(&self, limit: usize) -> Vec<AlertGroup> {
        let mut groups = self.alert_groups.clone();
        groups.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        groups.truncate(limit);
        groups
    }

    /// The newest `limit` consolidated rows
    pub fn latest_consolidated(&self, limit: usize) -> Vec<ConsolidatedAlert> {
        self.consolidated_alerts.iter().take(limit).cloned().collect()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            events: self.events.clone(),
            alert_groups: self.alert_groups.clone(),
            open_groups: self.open_groups.clone(),
            consolidated_alerts: self.consolidated_alerts.clone(),
            last_reset_time: self.last_reset_time,
        }
    }

    /// Receive every subsequent change to the history
    pub fn subscribe(&mut self) -> Receiver<HistoryChange> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    fn publish(&mut self, change: HistoryChange) {
        // Drop subscribers whose receiver is gone
        self.subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(millis: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(millis)
    }

    fn aggregator_with(order: ConsolidationOrder, clear_consolidated_on_reset: bool) -> AlertAggregator {
        let config = HistoryConfig {
            consolidation: order,
            clear_consolidated_on_reset,
            ..HistoryConfig::default()
        };
        AlertAggregator::new_at(&config, t(0))
    }

    fn aggregator() -> AlertAggregator {
        aggregator_with(ConsolidationOrder::AfterUpdate, false)
    }

    #[test]
    fn test_sample_within_threshold_is_dropped() {
        let mut aggregator = aggregator();
        let changes = aggregator.subscribe();

        assert!(!aggregator.record_sample_at(Axis::X, 0.5, 1.0, t(100)));
        assert!(!aggregator.record_sample_at(Axis::Y, -1.0, 1.0, t(200)));
        assert!(!aggregator.record_sample_at(Axis::Z, f64::NAN, 1.0, t(300)));

        assert!(aggregator.events().is_empty());
        assert!(aggregator.open_groups().is_empty());
        assert!(aggregator.consolidated_alerts().is_empty());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_first_alert_opens_group() {
        let mut aggregator = aggregator();

        assert!(aggregator.record_sample_at(Axis::Z, -1.3, 1.0, t(100)));

        let event = &aggregator.events()[0];
        assert_eq!(event.axis, Axis::Z);
        assert_eq!(event.acceleration, -1.3);
        assert_eq!(event.threshold, 1.0);
        assert_eq!(event.timestamp, t(100));

        let group = aggregator.open_group(Axis::Z).unwrap();
        assert_eq!(group.peak_value, 1.3);
        assert_eq!(group.start_time, t(100));
        assert_eq!(group.end_time, t(100));
        assert_eq!(group.peak_time, t(100));
        assert!(aggregator.alert_groups().is_empty());
    }

    #[test]
    fn test_events_are_never_coalesced() {
        let mut aggregator = aggregator();

        for i in 0..5 {
            aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(100));
            assert_eq!(aggregator.events().len(), i + 1);
        }

        let ids: Vec<u64> = aggregator.events().iter().map(|e| e.id).collect();
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(ids, unique);
    }

    #[test]
    fn test_threshold_is_last_write_wins() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.2, 0.4, t(200));

        assert_eq!(aggregator.open_group(Axis::X).unwrap().threshold, 0.4);
    }

    #[test]
    fn test_single_axis_episode_scenario() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 0.5, 1.0, t(0));
        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(200));
        assert!(aggregator.close_group(Axis::X).is_some());

        assert_eq!(aggregator.events().len(), 2);
        let groups = aggregator.groups_for_axis(Axis::X);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].peak_value, 1.5);
        assert_eq!(groups[0].peak_time, t(200));
        assert_eq!(groups[0].duration(), t(200) - t(100));
        assert!(aggregator.open_groups().is_empty());
    }

    #[test]
    fn test_close_group_is_idempotent() {
        let mut aggregator = aggregator();
        aggregator.record_sample_at(Axis::Y, 1.5, 1.0, t(100));

        let closed = aggregator.close_group(Axis::Y).unwrap();
        assert_eq!(aggregator.close_group(Axis::Y), None);
        assert_eq!(aggregator.close_group(Axis::Z), None);

        assert_eq!(aggregator.alert_groups(), &[closed]);
    }

    #[test]
    fn test_new_episode_after_close() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 1.8, 1.0, t(100));
        aggregator.close_group(Axis::X);
        aggregator.record_sample_at(Axis::X, 1.1, 1.0, t(500));

        let open = aggregator.open_group(Axis::X).unwrap();
        assert_eq!(open.peak_value, 1.1);
        assert_eq!(open.start_time, t(500));
        assert_ne!(open.id(), aggregator.alert_groups()[0].id());
    }

    #[test]
    fn test_stronger_axis_takes_over_consolidated_feed() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(200));
        aggregator.record_sample_at(Axis::Y, 2.0, 1.0, t(300));

        let latest = &aggregator.consolidated_alerts()[0];
        assert_eq!(latest.strongest_axis, Axis::Y);
        assert_eq!(latest.strongest_value, 2.0);
        assert_eq!(latest.timestamp, t(300));
        assert!(aggregator.open_group(Axis::X).is_some());
    }

    #[test]
    fn test_weaker_axis_update_reports_strongest_group() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::Y, 2.0, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(200));
        aggregator.record_sample_at(Axis::X, 1.4, 1.0, t(300));

        // Y's end time is still t(100), which is already in the feed
        let feed = aggregator.consolidated_alerts();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].strongest_axis, Axis::Y);
        assert_eq!(feed[0].timestamp, t(100));
    }

    #[test]
    fn test_consolidated_duration_and_threshold() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::Z, 1.6, 1.0, t(0));
        aggregator.record_sample_at(Axis::Z, 1.2, 0.9, t(2_500));

        let latest = &aggregator.consolidated_alerts()[0];
        assert_eq!(latest.duration, Duration::milliseconds(2_500));
        assert_eq!(latest.threshold, 0.9);
        assert_eq!(latest.strongest_value, 1.6);
        assert_eq!(latest.formatted_duration(), "2s");
    }

    #[test]
    fn test_tie_break_prefers_earliest_axis() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::Z, 1.5, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(200));
        aggregator.record_sample_at(Axis::Y, 1.5, 1.0, t(300));
        aggregator.record_sample_at(Axis::Z, 1.2, 1.0, t(400));

        // X wins every tie, and its end time t(200) is already in the feed
        assert!(aggregator
            .consolidated_alerts()
            .iter()
            .all(|alert| alert.strongest_axis != Axis::Y));
        assert_eq!(aggregator.consolidated_alerts()[0].strongest_axis, Axis::X);
        assert_eq!(aggregator.consolidated_alerts()[0].timestamp, t(200));
    }

    #[test]
    fn test_consolidated_feed_sorted_newest_first() {
        let mut aggregator = aggregator();

        for (i, value) in [1.1, 1.3, 1.2, 1.9, 1.4].iter().enumerate() {
            aggregator.record_sample_at(Axis::X, *value, 1.0, t(i as i64 * 100));
        }

        let timestamps: Vec<Timestamp> = aggregator
            .consolidated_alerts()
            .iter()
            .map(|alert| alert.timestamp)
            .collect();
        assert_eq!(timestamps.len(), 5);
        assert!(timestamps.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn test_duplicate_timestamp_is_skipped() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.3, 1.0, t(100));

        assert_eq!(aggregator.consolidated_alerts().len(), 1);
        assert_eq!(aggregator.consolidated_alerts()[0].strongest_value, 1.2);
    }

    #[test]
    fn test_before_update_order_uses_previous_state() {
        let mut aggregator = aggregator_with(ConsolidationOrder::BeforeUpdate, false);

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        assert!(aggregator.consolidated_alerts().is_empty());

        aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(200));
        let feed = aggregator.consolidated_alerts();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].strongest_value, 1.2);
        assert_eq!(feed[0].timestamp, t(100));

        // The stored group still advances
        assert_eq!(aggregator.open_group(Axis::X).unwrap().peak_value, 1.5);
    }

    #[test]
    fn test_before_update_order_lags_new_strongest_axis() {
        let mut aggregator = aggregator_with(ConsolidationOrder::BeforeUpdate, false);

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(200));
        aggregator.record_sample_at(Axis::Y, 2.0, 1.0, t(300));
        assert_eq!(aggregator.consolidated_alerts()[0].strongest_axis, Axis::X);

        aggregator.record_sample_at(Axis::Y, 1.1, 1.0, t(400));
        let latest = &aggregator.consolidated_alerts()[0];
        assert_eq!(latest.strongest_axis, Axis::Y);
        assert_eq!(latest.timestamp, t(300));
    }

    #[test]
    fn test_after_update_order_reflects_current_sample() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(200));

        let feed = aggregator.consolidated_alerts();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].strongest_value, 1.5);
        assert_eq!(feed[0].timestamp, t(200));
        assert_eq!(feed[1].strongest_value, 1.2);
    }

    #[test]
    fn test_recent_groups_limit() {
        let mut aggregator = aggregator();
        let axes = [Axis::X, Axis::Y, Axis::Z, Axis::X, Axis::Y];

        for (i, axis) in axes.iter().enumerate() {
            aggregator.record_sample_at(*axis, 1.5, 1.0, t(i as i64 * 1_000));
            aggregator.close_group(*axis);
        }

        let recent = aggregator.recent_groups(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].end_time, t(4_000));
        assert_eq!(recent[1].end_time, t(3_000));

        assert_eq!(aggregator.recent_groups(DEFAULT_RECENT_GROUPS).len(), 5);
        assert!(aggregator.recent_groups(0).is_empty());
    }

    #[test]
    fn test_events_and_groups_for_axis() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::Y, -1.4, 1.0, t(150));
        aggregator.record_sample_at(Axis::X, -1.6, 1.0, t(200));
        aggregator.close_group(Axis::X);

        let x_events = aggregator.events_for_axis(Axis::X);
        assert_eq!(x_events.len(), 2);
        assert_eq!(x_events[0].acceleration, 1.2);
        assert_eq!(x_events[1].acceleration, -1.6);
        assert_eq!(aggregator.events_for_axis(Axis::Z), vec![]);

        assert_eq!(aggregator.groups_for_axis(Axis::X).len(), 1);
        assert!(aggregator.groups_for_axis(Axis::Y).is_empty());
    }

    #[test]
    fn test_reset_keeps_consolidated_by_default() {
        let mut aggregator = aggregator();

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::Y, 1.5, 1.0, t(200));
        aggregator.close_group(Axis::X);
        let consolidated = aggregator.consolidated_alerts().len();
        assert!(consolidated > 0);

        aggregator.reset_history_at(t(10_000));

        assert!(aggregator.events().is_empty());
        assert!(aggregator.alert_groups().is_empty());
        assert!(aggregator.open_groups().is_empty());
        assert_eq!(aggregator.consolidated_alerts().len(), consolidated);
        assert_eq!(aggregator.last_reset_time(), t(10_000));
    }

    #[test]
    fn test_reset_can_clear_consolidated() {
        let mut aggregator = aggregator_with(ConsolidationOrder::AfterUpdate, true);

        aggregator.record_sample_at(Axis::Z, 1.2, 1.0, t(100));
        aggregator.reset_history_at(t(10_000));

        assert!(aggregator.consolidated_alerts().is_empty());
        assert!(aggregator.events().is_empty());
        assert_eq!(aggregator.last_reset_time(), t(10_000));
    }

    #[test]
    fn test_latest_consolidated_limit() {
        let mut aggregator = aggregator();

        for i in 0..12 {
            aggregator.record_sample_at(Axis::X, 1.5, 1.0, t(i * 100));
        }

        let latest = aggregator.latest_consolidated(DEFAULT_CONSOLIDATED_DISPLAY);
        assert_eq!(latest.len(), 8);
        assert_eq!(latest[0].timestamp, t(1_100));
    }

    #[test]
    fn test_subscribers_receive_changes_in_order() {
        let mut aggregator = aggregator();
        let changes = aggregator.subscribe();

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.close_group(Axis::X);
        aggregator.reset_history_at(t(500));

        let received: Vec<HistoryChange> = changes.try_iter().collect();
        assert_eq!(received.len(), 5);
        assert!(matches!(received[0], HistoryChange::EventRecorded(_)));
        assert!(matches!(received[1], HistoryChange::GroupUpdated(_)));
        assert!(matches!(received[2], HistoryChange::ConsolidatedAdded(_)));
        assert!(matches!(received[3], HistoryChange::GroupClosed(_)));
        assert_eq!(received[4], HistoryChange::Reset { at: t(500) });
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut aggregator = aggregator();
        let kept = aggregator.subscribe();
        drop(aggregator.subscribe());

        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));

        assert_eq!(aggregator.subscribers.len(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut aggregator = aggregator();
        aggregator.record_sample_at(Axis::X, 1.2, 1.0, t(100));
        aggregator.record_sample_at(Axis::Y, 1.4, 1.0, t(200));
        aggregator.close_group(Axis::X);

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.alert_groups.len(), 1);
        assert!(snapshot.open_groups.contains_key(&Axis::Y));
        assert_eq!(snapshot.last_reset_time, t(0));

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"open_groups\":{\"Y\":"));
        assert!(json.contains("\"last_reset_time\":\"2023-11-14T22:13:20Z\""));
    }
}
