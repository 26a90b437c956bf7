//! Engine status snapshot for the monitoring surface.

use serde::{Deserialize, Serialize};

use crate::features::LayoutInfo;
use crate::history::HistoryCounters;
use crate::model::batch::BatchModelStatus;
use crate::model::stream::StreamModelStatus;

// ============================================================================
// ENGINE STATUS
// ============================================================================

/// Point-in-time view of the engine, assembled from component counters.
///
/// Reading a snapshot never mutates model state; it is safe to call from a
/// monitoring thread while ingestion runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub session_id: String,
    /// Decisions produced this session.
    pub decisions: u64,
    /// Of which anomalies.
    pub anomalies: u64,
    pub last_score: Option<f32>,
    pub last_reasons: Vec<String>,
    pub batch: BatchModelStatus,
    pub stream: StreamModelStatus,
    pub history: HistoryCounters,
    pub layout: LayoutInfo,
}
