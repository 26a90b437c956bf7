//! History module - durable decision records, sessions, and retention.
//!
//! The backbone of the diagnostics surface: without the record you cannot
//! trace why a decision was made, audit alerts, or build training data.

pub mod queue;
pub mod record;
pub mod store;

pub use record::{HistoryRecord, SessionInfo};
pub use store::{
    DecisionHistoryStore, HistoryCounters, HistoryStats, PruneReport, QueryOrder, TimeRange,
    TimelineBucket, DEFAULT_FLUSH_TIMEOUT,
};
