//! Engine configuration.
//!
//! All tunables are injected here and validated once, at engine
//! construction. Invalid values are rejected with a `ConfigError` instead
//! of being silently clamped.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// RULE CONFIG
// ============================================================================

/// Thresholds and tables for the heuristic rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Packets at or above this length trigger the large-length rule.
    pub large_length_threshold: u32,

    /// Destination ports that trigger the suspicious-port rule.
    pub suspicious_ports: HashSet<u16>,

    /// Regex patterns matched against the payload excerpt. Empty by default.
    pub payload_patterns: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            large_length_threshold: 1400,
            suspicious_ports: default_suspicious_ports(),
            payload_patterns: Vec::new(),
        }
    }
}

/// Telnet, RPC/SMB, NetBIOS, SSDP, RDP, and the classic 31337 backdoor port.
static DEFAULT_SUSPICIOUS_PORTS: Lazy<HashSet<u16>> =
    Lazy::new(|| [23, 135, 139, 445, 1900, 3389, 31337].into_iter().collect());

pub fn default_suspicious_ports() -> HashSet<u16> {
    DEFAULT_SUSPICIOUS_PORTS.clone()
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Full configuration surface of the analysis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Enable the batch (periodically refit) anomaly model.
    pub ml_enabled: bool,

    /// Expected outlier fraction used when fitting the batch model.
    pub contamination: f32,

    /// Observations between refits; the first fit happens after this many.
    pub refit_interval: usize,

    /// Capacity of the sliding sample window (ring buffer).
    pub buffer_size: usize,

    /// Refits draw a deterministic subsample when the window exceeds this.
    pub max_fit_samples: usize,

    /// Seed for the refit subsampler.
    pub model_seed: u64,

    /// Enable the incremental (streaming) anomaly model.
    pub stream_enabled: bool,

    /// Deviation bound for the stream model; z-scores at or beyond it
    /// saturate the stream score at 1.0.
    pub z_threshold: f32,

    /// Combined score at or above this is an anomaly.
    pub combined_threshold: f32,

    /// Relative weight of the batch score in fusion.
    pub batch_weight: f32,

    /// Relative weight of the stream score in fusion.
    pub stream_weight: f32,

    /// Batch score at or above this synthesizes a "batch-model-anomaly"
    /// reason. 0.5 is the model's own decision margin.
    pub batch_score_threshold: f32,

    /// Stream score at or above this synthesizes a "stream-model-anomaly"
    /// reason. 1.0 means the z bound was reached.
    pub stream_score_threshold: f32,

    /// When set, heuristic-only detections are recorded but not surfaced
    /// as alerts.
    pub anomalies_only_alerts: bool,

    /// History retention horizon in days; 0 disables scheduled pruning.
    pub retention_days: u32,

    /// Capacity of the in-memory history write queue.
    pub history_queue_capacity: usize,

    pub rules: RuleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ml_enabled: true,
            contamination: 0.02,
            refit_interval: 500,
            buffer_size: 4000,
            max_fit_samples: 2048,
            model_seed: 42,
            stream_enabled: true,
            z_threshold: 2.5,
            combined_threshold: 0.7,
            batch_weight: 1.0,
            stream_weight: 1.0,
            batch_score_threshold: 0.5,
            stream_score_threshold: 1.0,
            anomalies_only_alerts: false,
            retention_days: 0,
            history_queue_capacity: 1024,
            rules: RuleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Both models off: decisions come from the heuristics alone.
    pub fn heuristics_only() -> Self {
        Self {
            ml_enabled: false,
            stream_enabled: false,
            ..Default::default()
        }
    }

    /// Check every constraint; called by `AnalysisEngine::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.contamination > 0.0 && self.contamination < 1.0) {
            return Err(ConfigError::Contamination(self.contamination));
        }
        if self.refit_interval < 2 {
            return Err(ConfigError::RefitInterval(self.refit_interval));
        }
        if self.buffer_size < self.refit_interval {
            return Err(ConfigError::BufferSize {
                buffer: self.buffer_size,
                refit: self.refit_interval,
            });
        }
        if self.max_fit_samples < 2 {
            return Err(ConfigError::MaxFitSamples(self.max_fit_samples));
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(ConfigError::ZThreshold(self.z_threshold));
        }
        if !(self.combined_threshold > 0.0 && self.combined_threshold < 1.0) {
            return Err(ConfigError::CombinedThreshold(self.combined_threshold));
        }
        for (name, value) in [
            ("batch_weight", self.batch_weight),
            ("stream_weight", self.stream_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Weight { name, value });
            }
        }
        if self.batch_weight == 0.0 && self.stream_weight == 0.0 {
            return Err(ConfigError::ZeroWeights);
        }
        for (name, value) in [
            ("batch_score_threshold", self.batch_score_threshold),
            ("stream_score_threshold", self.stream_score_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(ConfigError::ScoreThreshold { name, value });
            }
        }
        if self.history_queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        for (index, pattern) in self.rules.payload_patterns.iter().enumerate() {
            // Same engine the payload rule compiles with.
            if let Err(source) = regex::bytes::Regex::new(pattern) {
                return Err(ConfigError::PayloadPattern { index, source });
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
