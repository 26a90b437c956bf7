//! Analysis engine - the single entry point of the core.
//!
//! Owns the extractor, the rule set, both models, fusion, and the injected
//! history store, and runs the per-event pipeline:
//! extract -> heuristics -> stream score+update -> batch score -> batch
//! observe -> fuse -> record -> return.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::event::TrafficEvent;
use crate::features::{FeatureExtractor, LayoutInfo};
use crate::fusion::ScoreFusion;
use crate::heuristics::HeuristicRuleSet;
use crate::history::{DecisionHistoryStore, DEFAULT_FLUSH_TIMEOUT};
use crate::model::{BatchAnomalyModel, StreamAnomalyModel};
use crate::status::EngineStatus;

// ============================================================================
// DECISION
// ============================================================================

/// Verdict for one analyzed event. Immutable once created; the history
/// store owns the persisted copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Echo of the event timestamp, so replays reproduce exactly.
    pub timestamp: DateTime<Utc>,
    /// Always in [0, 1].
    pub combined_score: f32,
    pub is_anomaly: bool,
    /// Whether to surface this decision to the alert consumer.
    pub alert: bool,
    /// Heuristic reasons first, then synthesized model reasons.
    pub reasons: Vec<String>,
    pub src_ip: String,
    pub src_port: Option<u16>,
    pub dst_ip: String,
    pub dst_port: Option<u16>,
    pub session_id: String,
}

/// Last decision surface for status reporting.
#[derive(Debug, Clone)]
struct LastDecision {
    score: f32,
    reasons: Vec<String>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The orchestrator. One instance per capture session.
///
/// `analyze` is meant to be fed from a single ingestion thread (decision
/// order mirrors arrival order, and the stream model is order-sensitive);
/// `status` and the history store's query surface may be used concurrently
/// from monitoring threads.
pub struct AnalysisEngine {
    config: EngineConfig,
    extractor: FeatureExtractor,
    rules: HeuristicRuleSet,
    batch: BatchAnomalyModel,
    stream: StreamAnomalyModel,
    fusion: ScoreFusion,
    history: Arc<DecisionHistoryStore>,
    session_id: String,
    decisions: AtomicU64,
    anomalies: AtomicU64,
    last: RwLock<Option<LastDecision>>,
}

impl AnalysisEngine {
    /// Validate the configuration, open a session, and (when retention is
    /// enabled) run one startup prune. Configuration problems are the only
    /// errors surfaced here.
    pub fn new(
        config: EngineConfig,
        history: Arc<DecisionHistoryStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        if config.retention_days > 0 {
            if let Err(err) = history.prune(config.retention_days) {
                log::warn!("startup history prune failed: {err}");
            }
        }
        let session = history.open_session();

        Ok(Self {
            extractor: FeatureExtractor::new(&config.rules),
            rules: HeuristicRuleSet::new(&config.rules),
            batch: BatchAnomalyModel::from_config(&config),
            stream: StreamAnomalyModel::from_config(&config),
            fusion: ScoreFusion::from_config(&config),
            history,
            session_id: session.session_id,
            decisions: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            last: RwLock::new(None),
            config,
        })
    }

    /// Analyze one event and return its decision. The decision is also
    /// queued for persistence; persistence never blocks this call.
    pub fn analyze(&self, event: &TrafficEvent) -> Decision {
        let vector = self.extractor.extract(event);
        let heuristic = self.rules.evaluate(event);

        // Stream scores against pre-update state; batch scores against the
        // fit that existed before this event, then buffers it. A retrain
        // triggered here first affects the next event.
        let stream_score = self.stream.update_and_score(&vector);
        let batch_score = self.batch.score(&vector);
        self.batch.observe(&vector);

        let outcome = self.fusion.fuse(&heuristic, batch_score, stream_score);

        self.decisions.fetch_add(1, Ordering::Relaxed);
        if outcome.is_anomaly {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
        }

        let decision = Decision {
            timestamp: event.timestamp,
            combined_score: outcome.combined_score,
            is_anomaly: outcome.is_anomaly,
            alert: outcome.alert,
            reasons: outcome.reasons,
            src_ip: event.src_ip.clone(),
            src_port: event.src_port,
            dst_ip: event.dst_ip.clone(),
            dst_port: event.dst_port,
            session_id: self.session_id.clone(),
        };

        self.history.append(&decision);
        *self.last.write() = Some(LastDecision {
            score: decision.combined_score,
            reasons: decision.reasons.clone(),
        });

        decision
    }

    /// Snapshot of engine, model, and history counters.
    pub fn status(&self) -> EngineStatus {
        let last = self.last.read().clone();
        EngineStatus {
            session_id: self.session_id.clone(),
            decisions: self.decisions.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            last_score: last.as_ref().map(|l| l.score),
            last_reasons: last.map(|l| l.reasons).unwrap_or_default(),
            batch: self.batch.status(),
            stream: self.stream.status(),
            history: self.history.counters(),
            layout: LayoutInfo::current(),
        }
    }

    /// The injected history store, for the diagnostics surface.
    pub fn history(&self) -> &Arc<DecisionHistoryStore> {
        &self.history
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close the session with its final counters and flush queued history
    /// writes within a bounded timeout.
    pub fn shutdown(self) {
        self.history.close_session(
            self.decisions.load(Ordering::Relaxed),
            self.anomalies.load(Ordering::Relaxed),
        );
        self.history.shutdown(DEFAULT_FLUSH_TIMEOUT);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::event::Protocol;
    use crate::history::{QueryOrder, TimeRange};

    fn engine_with(config: EngineConfig) -> (AnalysisEngine, TempDir) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DecisionHistoryStore::open(dir.path(), 256).unwrap());
        let engine = AnalysisEngine::new(config, store).unwrap();
        (engine, dir)
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_770_000_000 + seconds, 0).unwrap()
    }

    fn benign_event(i: i64) -> TrafficEvent {
        TrafficEvent::new(at(i), "192.168.1.10", "192.168.1.20", Protocol::Tcp, 120 + (i % 9) as u32 * 10)
            .with_ports(50000 + (i % 100) as u16, 443)
    }

    #[test]
    fn test_combined_score_always_in_unit_range() {
        let (engine, _dir) = engine_with(EngineConfig {
            refit_interval: 20,
            buffer_size: 80,
            ..Default::default()
        });
        for i in 0..100 {
            let decision = engine.analyze(&benign_event(i));
            assert!(
                (0.0..=1.0).contains(&decision.combined_score),
                "score out of range: {}",
                decision.combined_score
            );
        }
        let spike = TrafficEvent::new(at(200), "10.9.9.9", "10.0.0.1", Protocol::Tcp, 65000)
            .with_ports(4444, 31337);
        let decision = engine.analyze(&spike);
        assert!((0.0..=1.0).contains(&decision.combined_score));
        engine.shutdown();
    }

    #[test]
    fn test_heuristics_only_score_equals_flag() {
        // Scenario B plus the exact-0/1 property with both models off.
        let (engine, _dir) = engine_with(EngineConfig::heuristics_only());

        let clean = engine.analyze(&benign_event(0));
        assert_eq!(clean.combined_score, 0.0);
        assert!(!clean.is_anomaly);
        assert!(clean.reasons.is_empty());

        let bad = TrafficEvent::new(at(1), "1.1.1.1", "2.2.2.2", Protocol::Tcp, 1500)
            .with_ports(1024, 31337);
        let flagged = engine.analyze(&bad);
        assert_eq!(flagged.combined_score, 1.0);
        assert!(flagged.is_anomaly);
    }

    #[test]
    fn test_heuristic_reasons_force_anomaly_regardless_of_models() {
        // Scenario A: both rules fire, anomaly regardless of ML scores.
        let (engine, _dir) = engine_with(EngineConfig::default());
        let event = TrafficEvent::new(at(0), "1.1.1.1", "2.2.2.2", Protocol::Tcp, 1500)
            .with_ports(1024, 31337);
        let decision = engine.analyze(&event);
        assert!(decision.reasons.contains(&"large_length>=1400".to_string()));
        assert!(decision.reasons.contains(&"suspicious_port".to_string()));
        assert!(decision.is_anomaly);
    }

    #[test]
    fn test_batch_unavailable_until_refit_interval() {
        // Scenarios C and D at the engine level.
        let (engine, _dir) = engine_with(EngineConfig {
            refit_interval: 25,
            buffer_size: 100,
            stream_enabled: false,
            ..Default::default()
        });
        for i in 0..24 {
            engine.analyze(&benign_event(i));
            assert!(!engine.status().batch.ready);
        }
        engine.analyze(&benign_event(24));
        let status = engine.status();
        assert!(status.batch.ready);
        assert_eq!(status.batch.retrain_count, 1);

        // With a fitted batch model the combined score is numeric and no
        // longer the heuristic 0/1 degradation.
        let decision = engine.analyze(&benign_event(25));
        assert!(decision.combined_score > 0.0 || !decision.is_anomaly);
    }

    #[test]
    fn test_identical_runs_produce_identical_decisions() {
        let config = EngineConfig {
            refit_interval: 15,
            buffer_size: 60,
            ..Default::default()
        };
        let (a, _da) = engine_with(config.clone());
        let (b, _db) = engine_with(config);

        let mut events: Vec<TrafficEvent> = (0..60).map(benign_event).collect();
        events.push(
            TrafficEvent::new(at(100), "6.6.6.6", "10.0.0.1", Protocol::Udp, 60000)
                .with_ports(4444, 23),
        );

        for event in &events {
            let da = a.analyze(event);
            let db = b.analyze(event);
            assert_eq!(da.combined_score, db.combined_score);
            assert_eq!(da.is_anomaly, db.is_anomaly);
            assert_eq!(da.reasons, db.reasons);
        }
    }

    #[test]
    fn test_decisions_are_recorded_with_session() {
        let (engine, _dir) = engine_with(EngineConfig::default());
        let session_id = engine.session_id().to_string();
        for i in 0..5 {
            engine.analyze(&benign_event(i));
        }
        engine.history().flush(Duration::from_secs(5));
        let records = engine
            .history()
            .query(TimeRange::all(), QueryOrder::OldestFirst, None)
            .unwrap();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.session_id == session_id));
        assert!(records.windows(2).all(|w| w[0].sequence_id < w[1].sequence_id));
    }

    #[test]
    fn test_shutdown_closes_session_with_counters() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DecisionHistoryStore::open(dir.path(), 256).unwrap());
        let engine = AnalysisEngine::new(EngineConfig::heuristics_only(), Arc::clone(&store)).unwrap();

        engine.analyze(&benign_event(0));
        let bad = TrafficEvent::new(at(1), "1.1.1.1", "2.2.2.2", Protocol::Tcp, 2000)
            .with_ports(1024, 23);
        engine.analyze(&bad);
        engine.shutdown();

        let sessions = store.sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].is_open());
        assert_eq!(sessions[0].decisions, 2);
        assert_eq!(sessions[0].anomalies, 1);
    }

    #[test]
    fn test_anomalies_only_mode_records_but_does_not_alert() {
        let (engine, _dir) = engine_with(EngineConfig {
            anomalies_only_alerts: true,
            ml_enabled: false,
            stream_enabled: false,
            ..Default::default()
        });
        let bad = TrafficEvent::new(at(0), "1.1.1.1", "2.2.2.2", Protocol::Tcp, 1500)
            .with_ports(1024, 443);
        let decision = engine.analyze(&bad);
        // Heuristic-only detection: recorded, not alerted.
        assert!(decision.is_anomaly);
        assert_eq!(decision.reasons, vec!["large_length>=1400"]);
        assert!(!decision.alert);

        engine.history().flush(Duration::from_secs(5));
        let records = engine
            .history()
            .query(TimeRange::all(), QueryOrder::NewestFirst, Some(1))
            .unwrap();
        assert!(records[0].is_anomaly);
        assert!(!records[0].alert);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DecisionHistoryStore::open(dir.path(), 256).unwrap());
        let config = EngineConfig {
            contamination: 1.5,
            ..Default::default()
        };
        assert!(AnalysisEngine::new(config, store).is_err());
    }
}
