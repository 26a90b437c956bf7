//! Streaming anomaly model - incremental per-event scoring.
//!
//! Keeps running per-feature statistics (Welford's method) and scores each
//! vector before folding it in, so an event never influences its own
//! score. O(1) state and work per event.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::features::{FeatureVector, FEATURE_COUNT};

use super::ScoreResult;

/// Samples required before the z statistic means anything.
const WARM_UP: u64 = 10;

/// Floor for the running standard deviation.
const STD_FLOOR: f64 = 1e-6;

// ============================================================================
// STATUS
// ============================================================================

/// Stream model view for the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamModelStatus {
    pub enabled: bool,
    pub updates: u64,
    /// Past warm-up; scores are numeric.
    pub ready: bool,
}

// ============================================================================
// MODEL
// ============================================================================

/// The stream model as a capability-checked variant: `Disabled` when
/// `stream_enabled` is off; no state is ever constructed in that case.
pub struct StreamAnomalyModel {
    mode: Mode,
}

enum Mode {
    Active {
        z_threshold: f64,
        state: RwLock<StreamState>,
    },
    Disabled,
}

#[derive(Debug, Clone)]
struct StreamState {
    count: u64,
    mean: [f64; FEATURE_COUNT],
    m2: [f64; FEATURE_COUNT],
}

impl StreamState {
    fn new() -> Self {
        Self {
            count: 0,
            mean: [0.0; FEATURE_COUNT],
            m2: [0.0; FEATURE_COUNT],
        }
    }

    /// Largest per-feature |z| against the current statistics.
    fn max_z(&self, values: &[f32]) -> f64 {
        let mut max_z = 0.0f64;
        for (i, &x) in values.iter().enumerate() {
            let std = (self.m2[i] / (self.count - 1) as f64).sqrt().max(STD_FLOOR);
            let z = ((x as f64 - self.mean[i]) / std).abs();
            if z > max_z {
                max_z = z;
            }
        }
        max_z
    }

    fn update(&mut self, values: &[f32]) {
        self.count += 1;
        for (i, &x) in values.iter().enumerate() {
            let x = x as f64;
            let delta = x - self.mean[i];
            self.mean[i] += delta / self.count as f64;
            self.m2[i] += delta * (x - self.mean[i]);
        }
    }
}

impl StreamAnomalyModel {
    pub fn from_config(config: &EngineConfig) -> Self {
        if !config.stream_enabled {
            return Self { mode: Mode::Disabled };
        }
        Self {
            mode: Mode::Active {
                z_threshold: config.z_threshold as f64,
                state: RwLock::new(StreamState::new()),
            },
        }
    }

    /// Score the vector against the pre-update state, then fold it in.
    /// State reflects all events up to and including this one afterwards;
    /// each event updates state exactly once, in arrival order.
    pub fn update_and_score(&self, vector: &FeatureVector) -> ScoreResult {
        let (z_threshold, state) = match &self.mode {
            Mode::Active { z_threshold, state } => (*z_threshold, state),
            Mode::Disabled => return ScoreResult::Unavailable,
        };

        let mut state = state.write();
        let score = if state.count < WARM_UP {
            ScoreResult::Unavailable
        } else {
            let z = state.max_z(vector.as_slice());
            ScoreResult::Score((z / z_threshold).min(1.0) as f32)
        };
        state.update(vector.as_slice());
        score
    }

    pub fn status(&self) -> StreamModelStatus {
        match &self.mode {
            Mode::Active { state, .. } => {
                let count = state.read().count;
                StreamModelStatus {
                    enabled: true,
                    updates: count,
                    ready: count >= WARM_UP,
                }
            }
            Mode::Disabled => StreamModelStatus {
                enabled: false,
                updates: 0,
                ready: false,
            },
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
