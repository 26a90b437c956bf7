//! Persisted record types.
//!
//! `HistoryRecord` is the durable form of a decision; `SessionInfo` scopes
//! contiguous blocks of records to one run of the engine. Both are
//! immutable once written and round-trip exactly through JSON lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::Decision;

// ============================================================================
// HISTORY RECORD
// ============================================================================

/// One persisted decision, one JSON line in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Monotonically increasing, resumed across store reopen.
    pub sequence_id: u64,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub combined_score: f32,
    pub is_anomaly: bool,
    pub alert: bool,
    pub reasons: Vec<String>,
    pub src_ip: String,
    pub src_port: Option<u16>,
    pub dst_ip: String,
    pub dst_port: Option<u16>,
}

impl HistoryRecord {
    pub fn from_decision(decision: &Decision, sequence_id: u64) -> Self {
        Self {
            sequence_id,
            session_id: decision.session_id.clone(),
            timestamp: decision.timestamp,
            combined_score: decision.combined_score,
            is_anomaly: decision.is_anomaly,
            alert: decision.alert,
            reasons: decision.reasons.clone(),
            src_ip: decision.src_ip.clone(),
            src_port: decision.src_port,
            dst_ip: decision.dst_ip.clone(),
            dst_port: decision.dst_port,
        }
    }

    pub fn to_jsonl(&self) -> String {
        // A record is plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================================================
// SESSION INFO
// ============================================================================

/// One contiguous run of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    /// None while the session is open.
    pub ended_at: Option<DateTime<Utc>>,
    /// Decisions recorded under this session.
    pub decisions: u64,
    /// Of which anomalies.
    pub anomalies: u64,
}

impl SessionInfo {
    pub fn open(started_at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            started_at,
            ended_at: None,
            decisions: 0,
            anomalies: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
