//! AI Network Sniffer - Traffic Analysis Core
//!
//! Real-time traffic classification: every observed event gets a bounded
//! threat score, an anomaly decision, and a list of contributing reasons,
//! while the statistical models keep learning from the traffic they see.
//!
//! The pipeline per event:
//!
//! extract features -> heuristic rules -> stream model (score, then
//! update) -> batch model (score, then observe; periodic refit) -> score
//! fusion -> decision -> async history append.
//!
//! Capture, presentation, scanning, and export live outside this crate;
//! they feed [`AnalysisEngine::analyze`] with [`TrafficEvent`]s and read
//! decisions, status snapshots, and history queries back.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ai_sniffer_core::{AnalysisEngine, DecisionHistoryStore, EngineConfig};
//!
//! let store = Arc::new(DecisionHistoryStore::open(
//!     DecisionHistoryStore::default_dir(),
//!     1024,
//! )?);
//! let engine = AnalysisEngine::new(EngineConfig::default(), store)?;
//! // for each captured event: let decision = engine.analyze(&event);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod features;
pub mod fusion;
pub mod heuristics;
pub mod history;
pub mod model;
pub mod status;

pub use config::{EngineConfig, RuleConfig};
pub use engine::{AnalysisEngine, Decision};
pub use error::{ConfigError, HistoryError, RetrainError};
pub use event::{Protocol, TrafficEvent};
pub use features::{FeatureExtractor, FeatureVector, FEATURE_COUNT};
pub use fusion::{FusionOutcome, ScoreFusion};
pub use heuristics::{HeuristicRuleSet, RuleOutcome};
pub use history::{
    DecisionHistoryStore, HistoryRecord, HistoryStats, QueryOrder, SessionInfo, TimeRange,
};
pub use model::{BatchAnomalyModel, ScoreResult, StreamAnomalyModel};
pub use status::EngineStatus;
