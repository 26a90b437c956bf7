//! Batch anomaly model - retrainable outlier scoring over a sliding window.
//!
//! The scoring strategy is pluggable behind `BatchScorer`/`FittedModel`;
//! the lifecycle (window, refit cadence, atomic state swap, degradation on
//! failed refit) lives here and is strategy-independent.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::RetrainError;
use crate::features::{FeatureVector, FEATURE_COUNT};

use super::buffer::SampleBuffer;
use super::ScoreResult;

/// Floor for per-feature standard deviations and rescale denominators.
const STD_FLOOR: f32 = 1e-6;

// ============================================================================
// SCORING STRATEGY
// ============================================================================

/// Fits a scoring model from a window of samples.
pub trait BatchScorer: Send + Sync {
    /// Fit from `samples` (rows = observations). `contamination` is the
    /// expected outlier fraction; the fitted model's 0.5 margin should sit
    /// at the `(1 - contamination)` quantile of the training scores.
    fn fit(
        &self,
        samples: &Array2<f32>,
        contamination: f32,
    ) -> Result<Arc<dyn FittedModel>, RetrainError>;
}

/// An immutable fitted model; shared snapshots are swapped atomically.
pub trait FittedModel: Send + Sync {
    /// Normalized anomaly score in [0, 1]; 0.5 is the fit's own margin.
    fn score(&self, vector: &FeatureVector) -> f32;
}

// ============================================================================
// DEFAULT STRATEGY
// ============================================================================

/// Default strategy: diagonal-covariance Gaussian distance.
///
/// Fit computes per-feature mean and standard deviation; the raw
/// outlyingness of a vector is the mean squared per-feature z-score.
/// Rescaling to [0, 1] is anchored on the training window: raw scores up
/// to the `(1 - contamination)` quantile map linearly onto [0, 0.5), the
/// rest onto [0.5, 1.0], clamped. A score of 0.5 therefore plays the role
/// of the classic decision-function sign change.
pub struct DiagonalGaussianScorer;

struct DiagonalGaussianFit {
    mean: Array1<f32>,
    std: Array1<f32>,
    lo: f32,
    cutoff: f32,
    hi: f32,
}

impl DiagonalGaussianFit {
    fn raw(&self, values: &[f32]) -> f32 {
        let mut sum = 0.0f32;
        for (i, &x) in values.iter().enumerate() {
            let z = (x - self.mean[i]) / self.std[i];
            sum += z * z;
        }
        sum / values.len() as f32
    }
}

impl FittedModel for DiagonalGaussianFit {
    fn score(&self, vector: &FeatureVector) -> f32 {
        let raw = self.raw(vector.as_slice());
        let normalized = if raw <= self.cutoff {
            let denom = (self.cutoff - self.lo).max(STD_FLOOR);
            0.5 * (raw - self.lo) / denom
        } else {
            // When no training sample exceeded the cutoff the below-cutoff
            // spread is reused as the scale.
            let denom = if self.hi > self.cutoff {
                self.hi - self.cutoff
            } else {
                (self.cutoff - self.lo).max(STD_FLOOR)
            };
            0.5 + 0.5 * (raw - self.cutoff) / denom
        };
        normalized.clamp(0.0, 1.0)
    }
}

impl BatchScorer for DiagonalGaussianScorer {
    fn fit(
        &self,
        samples: &Array2<f32>,
        contamination: f32,
    ) -> Result<Arc<dyn FittedModel>, RetrainError> {
        let n = samples.nrows();
        if n < 2 {
            return Err(RetrainError::InsufficientSamples(n));
        }

        let mean = samples
            .mean_axis(Axis(0))
            .ok_or(RetrainError::InsufficientSamples(n))?;
        let std = samples
            .std_axis(Axis(0), 1.0)
            .mapv(|s| s.max(STD_FLOOR));

        let fit = DiagonalGaussianFit {
            mean,
            std,
            lo: 0.0,
            cutoff: 0.0,
            hi: 0.0,
        };

        let mut raws: Vec<f32> = samples
            .axis_iter(Axis(0))
            .map(|row| fit.raw(&row.to_vec()))
            .collect();
        raws.sort_by(|a, b| a.total_cmp(b));

        let lo = raws[0];
        let hi = raws[n - 1];
        if hi - lo < STD_FLOOR {
            // Every sample scores the same: nothing to rank against.
            return Err(RetrainError::DegenerateWindow);
        }
        let idx = (((1.0 - contamination) * n as f32).ceil() as usize).clamp(1, n) - 1;
        let cutoff = raws[idx];

        Ok(Arc::new(DiagonalGaussianFit { cutoff, lo, hi, ..fit }))
    }
}

// ============================================================================
// STATUS
// ============================================================================

/// Batch model view for the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchModelStatus {
    pub enabled: bool,
    /// A fitted state is in service.
    pub ready: bool,
    pub samples_seen: u64,
    pub buffer_len: usize,
    pub buffer_fill_percent: f32,
    pub retrain_count: u64,
    /// Last refit failed; scores come from the previous fit.
    pub degraded: bool,
    pub last_error: Option<String>,
}

impl BatchModelStatus {
    fn disabled() -> Self {
        Self {
            enabled: false,
            ready: false,
            samples_seen: 0,
            buffer_len: 0,
            buffer_fill_percent: 0.0,
            retrain_count: 0,
            degraded: false,
            last_error: None,
        }
    }
}

// ============================================================================
// MODEL
// ============================================================================

/// The batch model as a capability-checked variant: `Disabled` when
/// `ml_enabled` is off, never a null checked at call sites.
pub struct BatchAnomalyModel {
    mode: Mode,
}

enum Mode {
    Active(ActiveBatch),
    Disabled,
}

struct ActiveBatch {
    contamination: f32,
    refit_interval: usize,
    max_fit_samples: usize,
    seed: u64,
    scorer: Box<dyn BatchScorer>,
    window: Mutex<Window>,
    fitted: RwLock<Option<Arc<dyn FittedModel>>>,
    last_error: RwLock<Option<String>>,
    samples_seen: AtomicU64,
    retrain_count: AtomicU64,
    degraded: AtomicBool,
}

struct Window {
    buffer: SampleBuffer,
    since_fit: usize,
    fit_count: u64,
}

impl BatchAnomalyModel {
    pub fn from_config(config: &EngineConfig) -> Self {
        if !config.ml_enabled {
            return Self { mode: Mode::Disabled };
        }
        Self::with_scorer(config, Box::new(DiagonalGaussianScorer))
    }

    /// Plug in a non-default strategy (also used by tests).
    pub fn with_scorer(config: &EngineConfig, scorer: Box<dyn BatchScorer>) -> Self {
        Self {
            mode: Mode::Active(ActiveBatch {
                contamination: config.contamination,
                refit_interval: config.refit_interval,
                max_fit_samples: config.max_fit_samples,
                seed: config.model_seed,
                scorer,
                window: Mutex::new(Window {
                    buffer: SampleBuffer::new(config.buffer_size),
                    since_fit: 0,
                    fit_count: 0,
                }),
                fitted: RwLock::new(None),
                last_error: RwLock::new(None),
                samples_seen: AtomicU64::new(0),
                retrain_count: AtomicU64::new(0),
                degraded: AtomicBool::new(false),
            }),
        }
    }

    /// Score against the currently fitted state. Never blocks on a refit:
    /// the read lock only covers an `Arc` clone.
    pub fn score(&self, vector: &FeatureVector) -> ScoreResult {
        let active = match &self.mode {
            Mode::Active(active) => active,
            Mode::Disabled => return ScoreResult::Unavailable,
        };
        let fitted = active.fitted.read().clone();
        match fitted {
            Some(model) => ScoreResult::Score(model.score(vector)),
            None => ScoreResult::Unavailable,
        }
    }

    /// Buffer the vector; every `refit_interval` observations triggers one
    /// retrain. The retrain affects later events only, never the one that
    /// triggered it.
    pub fn observe(&self, vector: &FeatureVector) {
        let active = match &self.mode {
            Mode::Active(active) => active,
            Mode::Disabled => return,
        };
        active.samples_seen.fetch_add(1, Ordering::Relaxed);

        let mut window = active.window.lock();
        window.buffer.push(vector);
        window.since_fit += 1;
        if window.since_fit < active.refit_interval {
            return;
        }
        window.since_fit = 0;
        window.fit_count += 1;
        active.retrain(&window);
    }

    /// True once a fitted state is in service.
    pub fn is_ready(&self) -> bool {
        match &self.mode {
            Mode::Active(active) => active.fitted.read().is_some(),
            Mode::Disabled => false,
        }
    }

    pub fn status(&self) -> BatchModelStatus {
        let active = match &self.mode {
            Mode::Active(active) => active,
            Mode::Disabled => return BatchModelStatus::disabled(),
        };
        let (buffer_len, buffer_fill_percent) = {
            let window = active.window.lock();
            (window.buffer.len(), window.buffer.fill_percent())
        };
        BatchModelStatus {
            enabled: true,
            ready: active.fitted.read().is_some(),
            samples_seen: active.samples_seen.load(Ordering::Relaxed),
            buffer_len,
            buffer_fill_percent,
            retrain_count: active.retrain_count.load(Ordering::Relaxed),
            degraded: active.degraded.load(Ordering::Relaxed),
            last_error: active.last_error.read().clone(),
        }
    }
}

impl ActiveBatch {
    /// Fit a new state from the window and swap it in. Failure keeps the
    /// previous state and marks the model degraded for this cycle.
    fn retrain(&self, window: &Window) {
        let samples = self.fit_matrix(window);
        match self.scorer.fit(&samples, self.contamination) {
            Ok(model) => {
                *self.fitted.write() = Some(model);
                *self.last_error.write() = None;
                self.degraded.store(false, Ordering::Relaxed);
                self.retrain_count.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "batch model refit #{} from {} samples",
                    self.retrain_count.load(Ordering::Relaxed),
                    samples.nrows()
                );
            }
            Err(err) => {
                self.degraded.store(true, Ordering::Relaxed);
                *self.last_error.write() = Some(err.to_string());
                log::warn!("batch model refit failed, keeping previous state: {err}");
            }
        }
    }

    /// Window contents as a fit matrix, deterministically subsampled when
    /// the window exceeds `max_fit_samples`.
    fn fit_matrix(&self, window: &Window) -> Array2<f32> {
        let n = window.buffer.len();
        let rows: Vec<&[f32; FEATURE_COUNT]> = if n > self.max_fit_samples {
            let mut rng = StdRng::seed_from_u64(self.seed ^ window.fit_count);
            let mut picked =
                rand::seq::index::sample(&mut rng, n, self.max_fit_samples).into_vec();
            picked.sort_unstable();
            let all: Vec<&[f32; FEATURE_COUNT]> = window.buffer.iter().collect();
            picked.into_iter().map(|i| all[i]).collect()
        } else {
            window.buffer.iter().collect()
        };

        let mut flat = Vec::with_capacity(rows.len() * FEATURE_COUNT);
        for row in &rows {
            flat.extend_from_slice(&row[..]);
        }
        Array2::from_shape_vec((rows.len(), FEATURE_COUNT), flat)
            .unwrap_or_else(|_| Array2::zeros((0, FEATURE_COUNT)))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;

    fn config(refit: usize) -> EngineConfig {
        EngineConfig {
            refit_interval: refit,
            buffer_size: refit.max(16) * 4,
            ..Default::default()
        }
    }

    fn vector(length: f32, port: f32) -> FeatureVector {
        FeatureVector::from_values([length, 1.0, 1024.0, port, 0.0, 0.0])
    }

    /// Mildly varied baseline traffic.
    fn baseline(i: usize) -> FeatureVector {
        vector(100.0 + (i % 7) as f32 * 10.0, 80.0 + (i % 3) as f32)
    }

    #[test]
    fn test_unavailable_before_first_fit() {
        let model = BatchAnomalyModel::from_config(&config(10));
        for i in 0..9 {
            assert_eq!(model.score(&baseline(i)), ScoreResult::Unavailable);
            model.observe(&baseline(i));
        }
        assert!(!model.is_ready());
    }

    #[test]
    fn test_retrain_triggers_exactly_at_interval() {
        let model = BatchAnomalyModel::from_config(&config(10));
        for i in 0..10 {
            model.observe(&baseline(i));
        }
        let status = model.status();
        assert!(status.ready);
        assert_eq!(status.retrain_count, 1);
        assert!(model.score(&baseline(0)).is_available());

        // No second retrain until another full interval.
        for i in 0..9 {
            model.observe(&baseline(i));
        }
        assert_eq!(model.status().retrain_count, 1);
        model.observe(&baseline(3));
        assert_eq!(model.status().retrain_count, 2);
    }

    #[test]
    fn test_disabled_model_is_unavailable() {
        let cfg = EngineConfig {
            ml_enabled: false,
            ..Default::default()
        };
        let model = BatchAnomalyModel::from_config(&cfg);
        model.observe(&baseline(0));
        assert_eq!(model.score(&baseline(0)), ScoreResult::Unavailable);
        assert!(!model.status().enabled);
    }

    #[test]
    fn test_outliers_score_above_inliers() {
        let model = BatchAnomalyModel::from_config(&config(50));
        for i in 0..50 {
            model.observe(&baseline(i));
        }
        let inlier = model.score(&baseline(1)).value().unwrap();
        let outlier = model.score(&vector(60000.0, 31337.0)).value().unwrap();
        assert!(outlier > inlier);
        assert!((0.0..=1.0).contains(&inlier));
        assert!((0.0..=1.0).contains(&outlier));
        assert!(outlier > 0.5);
    }

    #[test]
    fn test_degenerate_window_degrades_without_losing_state() {
        let model = BatchAnomalyModel::from_config(&config(10));
        for i in 0..10 {
            model.observe(&baseline(i));
        }
        assert!(model.status().ready);

        // A window of identical samples cannot be ranked; the previous fit
        // must stay in service.
        let same = vector(100.0, 80.0);
        for _ in 0..10 {
            model.observe(&same);
        }
        let status = model.status();
        assert!(status.degraded);
        assert!(status.ready);
        assert!(status.last_error.is_some());
        assert!(model.score(&same).is_available());
    }

    #[test]
    fn test_fit_is_deterministic_across_instances() {
        let a = BatchAnomalyModel::from_config(&config(30));
        let b = BatchAnomalyModel::from_config(&config(30));
        for i in 0..30 {
            a.observe(&baseline(i));
            b.observe(&baseline(i));
        }
        let probe = vector(5000.0, 23.0);
        assert_eq!(a.score(&probe), b.score(&probe));
    }

    #[test]
    fn test_subsampled_fit_is_deterministic() {
        let cfg = EngineConfig {
            refit_interval: 64,
            buffer_size: 256,
            max_fit_samples: 32,
            ..Default::default()
        };
        let a = BatchAnomalyModel::from_config(&cfg);
        let b = BatchAnomalyModel::from_config(&cfg);
        for i in 0..64 {
            a.observe(&baseline(i));
            b.observe(&baseline(i));
        }
        let probe = vector(9000.0, 31337.0);
        assert_eq!(a.score(&probe), b.score(&probe));
    }
}
