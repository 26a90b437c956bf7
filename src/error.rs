//! Error types for the analysis core.
//!
//! Only configuration problems surface to the constructor; everything the
//! per-event path can hit is either a total function or degrades to
//! `ScoreResult::Unavailable`.

use thiserror::Error;

/// Rejected engine configuration. Returned by `AnalysisEngine::new` and
/// `EngineConfig::validate`; nothing else in the crate produces it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("contamination must be in (0, 1), got {0}")]
    Contamination(f32),

    #[error("refit_interval must be >= 2, got {0}")]
    RefitInterval(usize),

    #[error("buffer_size ({buffer}) must be >= refit_interval ({refit})")]
    BufferSize { buffer: usize, refit: usize },

    #[error("max_fit_samples must be >= 2, got {0}")]
    MaxFitSamples(usize),

    #[error("z_threshold must be a positive finite number, got {0}")]
    ZThreshold(f32),

    #[error("combined_threshold must be in (0, 1), got {0}")]
    CombinedThreshold(f32),

    #[error("{name} must be a finite weight >= 0, got {value}")]
    Weight { name: &'static str, value: f32 },

    #[error("at least one model weight must be > 0")]
    ZeroWeights,

    #[error("{name} must be in [0, 1], got {value}")]
    ScoreThreshold { name: &'static str, value: f32 },

    #[error("history_queue_capacity must be >= 1")]
    QueueCapacity,

    #[error("payload pattern {index} does not compile: {source}")]
    PayloadPattern {
        index: usize,
        #[source]
        source: regex::Error,
    },
}

/// A batch refit could not produce a usable model. Non-fatal: the previous
/// fitted state stays in service and the model reports itself degraded.
#[derive(Debug, Clone, Error)]
pub enum RetrainError {
    #[error("insufficient samples for refit: {0} (need at least 2)")]
    InsufficientSamples(usize),

    #[error("insufficient distinct samples: training window is degenerate")]
    DegenerateWindow,
}

/// History store I/O failures, surfaced to the diagnostics caller.
/// The ingestion path never sees these; a failed append is retried and
/// then counted as dropped.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history store is closed")]
    Closed,
}
