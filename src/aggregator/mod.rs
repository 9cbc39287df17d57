/// Alert aggregation engine, its reset schedule and the owning history
pub mod alert_aggregator;
pub mod history;
pub mod reset;

pub use alert_aggregator::{
    AlertAggregator, ConsolidationOrder, HistoryChange, HistorySnapshot,
    DEFAULT_CONSOLIDATED_DISPLAY, DEFAULT_RECENT_GROUPS,
};
pub use history::{lock_aggregator, AlertHistory, SharedAggregator};
pub use reset::ResetTask;
