//! Model module - batch and streaming anomaly scorers.
//!
//! Both models speak the same small numeric contract: score a feature
//! vector into [0,1], or report `Unavailable`. "No score" is a first-class
//! value here, never a swallowed exception.

pub mod batch;
pub mod buffer;
pub mod stream;

use serde::{Deserialize, Serialize};

pub use batch::{BatchAnomalyModel, BatchScorer, DiagonalGaussianScorer, FittedModel};
pub use buffer::SampleBuffer;
pub use stream::StreamAnomalyModel;

// ============================================================================
// SCORE RESULT
// ============================================================================

/// Outcome of asking a model for a score.
///
/// `Unavailable` covers every non-numeric case: model disabled, not yet
/// fit, or still warming up. Fusion excludes unavailable scores from the
/// weighted average instead of treating them as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScoreResult {
    /// Normalized anomaly score in [0, 1]; higher is more anomalous.
    Score(f32),
    Unavailable,
}

impl ScoreResult {
    pub fn value(&self) -> Option<f32> {
        match self {
            ScoreResult::Score(v) => Some(*v),
            ScoreResult::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ScoreResult::Score(_))
    }
}

// ============================================================================
// TESTS
// ============================================================================
