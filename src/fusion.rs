//! Score fusion - one combined score and decision from heuristics plus
//! whichever models are available.
//!
//! Unavailable scores are excluded from the weighted average rather than
//! counted as zero, so the combined scale does not shift with model
//! availability.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::heuristics::RuleOutcome;
use crate::model::ScoreResult;

/// Reason synthesized when the batch score crosses its sub-threshold.
pub const REASON_BATCH_ANOMALY: &str = "batch-model-anomaly";

/// Reason synthesized when the stream score crosses its sub-threshold.
pub const REASON_STREAM_ANOMALY: &str = "stream-model-anomaly";

// ============================================================================
// OUTCOME
// ============================================================================

/// Fused verdict for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionOutcome {
    /// Always in [0, 1].
    pub combined_score: f32,
    pub is_anomaly: bool,
    /// Whether this decision should be surfaced to the alert consumer.
    /// Differs from `is_anomaly` only under anomalies-only alerting.
    pub alert: bool,
    /// Heuristic reasons first, synthesized model reasons after.
    pub reasons: Vec<String>,
}

// ============================================================================
// FUSION
// ============================================================================

/// Fusion policy; thresholds and weights are fixed at construction.
#[derive(Debug, Clone)]
pub struct ScoreFusion {
    combined_threshold: f32,
    batch_weight: f32,
    stream_weight: f32,
    batch_score_threshold: f32,
    stream_score_threshold: f32,
    anomalies_only_alerts: bool,
}

impl ScoreFusion {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            combined_threshold: config.combined_threshold,
            batch_weight: config.batch_weight,
            stream_weight: config.stream_weight,
            batch_score_threshold: config.batch_score_threshold,
            stream_score_threshold: config.stream_score_threshold,
            anomalies_only_alerts: config.anomalies_only_alerts,
        }
    }

    /// Combine one event's heuristic outcome and model scores.
    pub fn fuse(
        &self,
        heuristic: &RuleOutcome,
        batch: ScoreResult,
        stream: ScoreResult,
    ) -> FusionOutcome {
        let mut reasons = heuristic.reasons.clone();

        let mut weighted = 0.0f32;
        let mut total_weight = 0.0f32;
        if let Some(score) = batch.value() {
            weighted += score * self.batch_weight;
            total_weight += self.batch_weight;
            if score >= self.batch_score_threshold {
                reasons.push(REASON_BATCH_ANOMALY.to_string());
            }
        }
        if let Some(score) = stream.value() {
            weighted += score * self.stream_weight;
            total_weight += self.stream_weight;
            if score >= self.stream_score_threshold {
                reasons.push(REASON_STREAM_ANOMALY.to_string());
            }
        }

        let combined_score = if total_weight > 0.0 {
            (weighted / total_weight).clamp(0.0, 1.0)
        } else if heuristic.flagged {
            // Heuristic-only degradation: the flag is the score.
            1.0
        } else {
            0.0
        };

        let model_anomaly = combined_score >= self.combined_threshold;
        let is_anomaly = model_anomaly || heuristic.flagged;
        let alert = if self.anomalies_only_alerts {
            model_anomaly
        } else {
            is_anomaly
        };

        FusionOutcome {
            combined_score,
            is_anomaly,
            alert,
            reasons,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
