//! Decision history store - durable, append-only JSONL with sessions.
//!
//! Appends are decoupled from the scoring path by a bounded queue drained
//! by a writer thread; a full queue sheds the oldest unpersisted record
//! (observable via the dropped counter) instead of ever blocking
//! ingestion. Reads are tolerant: a malformed line is skipped and counted,
//! never aborts the rest of the file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::engine::Decision;
use crate::error::HistoryError;

use super::queue::BoundedQueue;
use super::record::{HistoryRecord, SessionInfo};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum decisions file size before rotation (50 MB).
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const DECISIONS_PREFIX: &str = "decisions_";
const DECISIONS_EXT: &str = "jsonl";
const SESSIONS_FILE: &str = "sessions.jsonl";

/// Attempts per record before it counts as dropped.
const WRITE_RETRIES: u32 = 3;

/// Default bound on the shutdown flush.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// QUERY TYPES
// ============================================================================

/// Half-open-ended time filter; `None` bounds mean unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// All history.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    NewestFirst,
    OldestFirst,
}

/// Aggregates over a filtered record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: u64,
    pub anomaly_count: u64,
    /// `anomaly_count / total`, 0.0 over an empty set.
    pub anomaly_rate: f32,
    pub mean_score: f32,
    /// Hourly anomaly counts, oldest bucket first.
    pub timeline: Vec<TimelineBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub bucket_start: DateTime<Utc>,
    pub anomalies: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed_records: u64,
    pub removed_sessions: u64,
}

/// Store-side counters for the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryCounters {
    pub records_written: u64,
    pub records_dropped: u64,
    pub write_failures: u64,
    /// Malformed lines seen by the most recent read pass.
    pub malformed_records: u64,
    pub queued: u64,
}

// ============================================================================
// WRITER PLUMBING
// ============================================================================

struct WriterState {
    queue: BoundedQueue<HistoryRecord>,
    writing: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<WriterState>,
    work: Condvar,
    idle: Condvar,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    write_failures: AtomicU64,
}

/// Worker-owned rotating file sink.
struct LogSink {
    dir: PathBuf,
    writer: Option<BufWriter<File>>,
    current_size: u64,
}

impl LogSink {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            writer: None,
            current_size: 0,
        }
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let needed = line.len() as u64 + 1;
        if self.writer.is_none() || self.current_size + needed > MAX_FILE_SIZE {
            self.open_new()?;
        }
        // Checked above.
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.current_size += needed;
        }
        Ok(())
    }

    fn open_new(&mut self) -> std::io::Result<()> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let mut path = self.dir.join(format!("{DECISIONS_PREFIX}{stamp}.{DECISIONS_EXT}"));
        let mut n = 1;
        while path.exists() {
            path = self
                .dir
                .join(format!("{DECISIONS_PREFIX}{stamp}_{n}.{DECISIONS_EXT}"));
            n += 1;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("opened decision log {:?}", path);
        self.writer = Some(BufWriter::new(file));
        self.current_size = 0;
        Ok(())
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Durable decision history for one engine instance.
///
/// Constructed explicitly and injected into the engine; owns its writer
/// thread and files, independent of any UI lifecycle.
pub struct DecisionHistoryStore {
    dir: PathBuf,
    shared: Arc<Shared>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_seq: AtomicU64,
    malformed: AtomicU64,
    session: RwLock<Option<SessionInfo>>,
}

impl DecisionHistoryStore {
    /// Open (or create) a store directory. Sequence ids resume from the
    /// highest already on disk.
    pub fn open(dir: impl Into<PathBuf>, queue_capacity: usize) -> Result<Self, HistoryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let malformed = AtomicU64::new(0);
        let existing = read_decision_records(&dir, &malformed)?;
        let next_seq = existing
            .iter()
            .map(|r| r.sequence_id)
            .max()
            .map_or(0, |m| m + 1);

        let shared = Arc::new(Shared {
            state: Mutex::new(WriterState {
                queue: BoundedQueue::new(queue_capacity),
                writing: false,
                shutdown: false,
            }),
            work: Condvar::new(),
            idle: Condvar::new(),
        });
        let counters = Arc::new(Counters::default());

        let worker = {
            let shared = Arc::clone(&shared);
            let counters = Arc::clone(&counters);
            let sink = LogSink::new(dir.clone());
            thread::Builder::new()
                .name("history-writer".to_string())
                .spawn(move || writer_loop(shared, counters, sink))
                .map_err(HistoryError::Io)?
        };

        Ok(Self {
            dir,
            shared,
            counters,
            worker: Mutex::new(Some(worker)),
            next_seq: AtomicU64::new(next_seq),
            malformed,
            session: RwLock::new(None),
        })
    }

    /// Platform data directory for the default store location.
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ai-sniffer")
            .join("decision_history")
    }

    // ------------------------------------------------------------------
    // Append path
    // ------------------------------------------------------------------

    /// Enqueue one decision for persistence and return its sequence id.
    /// Never blocks on storage: a full queue sheds its oldest entry.
    pub fn append(&self, decision: &Decision) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = HistoryRecord::from_decision(decision, seq);

        let mut state = self.shared.state.lock();
        if state.shutdown {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return seq;
        }
        if state.queue.push(record).is_some() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("history queue full, dropped oldest unpersisted record");
        }
        drop(state);
        self.shared.work.notify_one();
        seq
    }

    /// Block until every queued record is on disk, or the timeout passes.
    /// Returns false on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.queue.is_empty() || state.writing {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = self.shared.idle.wait_for(&mut state, deadline - now);
        }
        true
    }

    /// Flush with a bounded timeout, then stop the writer. Records still
    /// queued after the timeout are discarded, counted, and logged.
    pub fn shutdown(&self, timeout: Duration) {
        let flushed = self.flush(timeout);
        {
            let mut state = self.shared.state.lock();
            if !flushed {
                let discarded = state.queue.clear() as u64;
                if discarded > 0 {
                    self.counters.dropped.fetch_add(discarded, Ordering::Relaxed);
                    log::warn!("discarding {discarded} queued history writes at shutdown");
                }
            }
            state.shutdown = true;
        }
        self.shared.work.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Start a new session; its records are exempt from pruning until the
    /// session closes. A failed session-line write is a storage failure:
    /// logged and counted, the session still opens in memory.
    pub fn open_session(&self) -> SessionInfo {
        let session = SessionInfo::open(Utc::now());
        *self.session.write() = Some(session.clone());
        if let Err(err) = self.append_session_line(&session) {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            log::error!("failed to persist session open: {err}");
        } else {
            log::info!("history session {} opened", session.session_id);
        }
        session
    }

    /// Close the current session, recording its end timestamp and final
    /// counters. No-op when no session is open.
    pub fn close_session(&self, decisions: u64, anomalies: u64) -> Option<SessionInfo> {
        let mut guard = self.session.write();
        let mut session = guard.take()?;
        session.ended_at = Some(Utc::now());
        session.decisions = decisions;
        session.anomalies = anomalies;
        if let Err(err) = self.append_session_line(&session) {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            log::error!("failed to persist session close: {err}");
        } else {
            log::info!(
                "history session {} closed ({} decisions, {} anomalies)",
                session.session_id,
                decisions,
                anomalies
            );
        }
        Some(session)
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.session.read().as_ref().map(|s| s.session_id.clone())
    }

    /// All known sessions, newest first. The last line per id wins.
    pub fn sessions(&self) -> Result<Vec<SessionInfo>, HistoryError> {
        let mut by_id: BTreeMap<String, SessionInfo> = BTreeMap::new();
        let path = self.dir.join(SESSIONS_FILE);
        if path.exists() {
            for line in BufReader::new(File::open(&path)?).lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                if let Ok(session) = serde_json::from_str::<SessionInfo>(&line) {
                    by_id.insert(session.session_id.clone(), session);
                }
            }
        }
        let mut sessions: Vec<SessionInfo> = by_id.into_values().collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    fn append_session_line(&self, session: &SessionInfo) -> Result<(), HistoryError> {
        let path = self.dir.join(SESSIONS_FILE);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(session.to_jsonl().as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Records in the range, ordered and limited. Only persisted records
    /// are visible; call `flush` first when exactness matters.
    pub fn query(
        &self,
        range: TimeRange,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut records = read_decision_records(&self.dir, &self.malformed)?;
        records.retain(|r| range.contains(r.timestamp));
        records.sort_by(|a, b| (a.timestamp, a.sequence_id).cmp(&(b.timestamp, b.sequence_id)));
        if order == QueryOrder::NewestFirst {
            records.reverse();
        }
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Aggregates over the range, with an hourly anomaly timeline.
    pub fn stats(&self, range: TimeRange) -> Result<HistoryStats, HistoryError> {
        let records = self.query(range, QueryOrder::OldestFirst, None)?;
        let total = records.len() as u64;
        let anomaly_count = records.iter().filter(|r| r.is_anomaly).count() as u64;
        let mean_score = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.combined_score).sum::<f32>() / records.len() as f32
        };

        let mut buckets: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
        for record in records.iter().filter(|r| r.is_anomaly) {
            let bucket = record
                .timestamp
                .duration_trunc(ChronoDuration::hours(1))
                .unwrap_or(record.timestamp);
            *buckets.entry(bucket).or_insert(0) += 1;
        }

        Ok(HistoryStats {
            total,
            anomaly_count,
            anomaly_rate: if total > 0 {
                anomaly_count as f32 / total as f32
            } else {
                0.0
            },
            mean_score,
            timeline: buckets
                .into_iter()
                .map(|(bucket_start, anomalies)| TimelineBucket {
                    bucket_start,
                    anomalies,
                })
                .collect(),
        })
    }

    pub fn counters(&self) -> HistoryCounters {
        HistoryCounters {
            records_written: self.counters.written.load(Ordering::Relaxed),
            records_dropped: self.counters.dropped.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            malformed_records: self.malformed.load(Ordering::Relaxed),
            queued: self.shared.state.lock().queue.len() as u64,
        }
    }

    // ------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------

    /// Delete records older than `now - retention_days`.
    pub fn prune(&self, retention_days: u32) -> Result<PruneReport, HistoryError> {
        self.prune_at(retention_days, Utc::now())
    }

    /// Prune against an injected `now`. Records of the currently open
    /// session are always exempt, whatever their age; lines that cannot be
    /// parsed are kept (pruning only removes records it can date).
    pub fn prune_at(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<PruneReport, HistoryError> {
        let cutoff = now - ChronoDuration::days(retention_days as i64);
        let active = self.current_session_id();
        let mut report = PruneReport::default();

        for path in decision_files(&self.dir)? {
            let mut kept: Vec<String> = Vec::new();
            let mut removed = 0u64;
            for line in BufReader::new(File::open(&path)?).lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<HistoryRecord>(&line) {
                    Ok(record) => {
                        let exempt = active.as_deref() == Some(record.session_id.as_str());
                        if exempt || record.timestamp >= cutoff {
                            kept.push(line);
                        } else {
                            removed += 1;
                        }
                    }
                    Err(_) => kept.push(line),
                }
            }
            if removed == 0 {
                continue;
            }
            report.removed_records += removed;
            if kept.is_empty() {
                fs::remove_file(&path)?;
            } else {
                rewrite_file(&path, &kept)?;
            }
        }

        report.removed_sessions = self.prune_sessions(cutoff, active.as_deref())?;
        if report.removed_records > 0 || report.removed_sessions > 0 {
            log::info!(
                "pruned {} records and {} sessions older than {}",
                report.removed_records,
                report.removed_sessions,
                cutoff
            );
        }
        Ok(report)
    }

    fn prune_sessions(
        &self,
        cutoff: DateTime<Utc>,
        active: Option<&str>,
    ) -> Result<u64, HistoryError> {
        let sessions = self.sessions()?;
        let path = self.dir.join(SESSIONS_FILE);
        if sessions.is_empty() {
            return Ok(0);
        }
        let (kept, pruned): (Vec<_>, Vec<_>) = sessions.into_iter().partition(|s| {
            active == Some(s.session_id.as_str())
                || s.ended_at.unwrap_or(s.started_at) >= cutoff
        });
        if pruned.is_empty() {
            return Ok(0);
        }
        let lines: Vec<String> = kept.iter().map(|s| s.to_jsonl()).collect();
        if lines.is_empty() {
            fs::remove_file(&path)?;
        } else {
            rewrite_file(&path, &lines)?;
        }
        Ok(pruned.len() as u64)
    }
}

impl Drop for DecisionHistoryStore {
    fn drop(&mut self) {
        // Idempotent; a no-op when shutdown already ran.
        self.shutdown(DEFAULT_FLUSH_TIMEOUT);
    }
}

// ============================================================================
// FILE HELPERS
// ============================================================================

fn decision_files(dir: &Path) -> Result<Vec<PathBuf>, HistoryError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with(DECISIONS_PREFIX) && name.ends_with(DECISIONS_EXT) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every parseable record; malformed lines are skipped and the pass
/// total is stored in `malformed`.
fn read_decision_records(
    dir: &Path,
    malformed: &AtomicU64,
) -> Result<Vec<HistoryRecord>, HistoryError> {
    let mut records = Vec::new();
    let mut bad = 0u64;
    for path in decision_files(dir)? {
        for line in BufReader::new(File::open(&path)?).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    bad += 1;
                    log::debug!("skipping malformed history line in {:?}: {err}", path);
                }
            }
        }
    }
    malformed.store(bad, Ordering::Relaxed);
    Ok(records)
}

/// Replace a file's contents atomically (temp + rename).
fn rewrite_file(path: &Path, lines: &[String]) -> Result<(), HistoryError> {
    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for line in lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================================
// WRITER THREAD
// ============================================================================

fn writer_loop(shared: Arc<Shared>, counters: Arc<Counters>, mut sink: LogSink) {
    loop {
        let batch = {
            let mut state = shared.state.lock();
            while state.queue.is_empty() && !state.shutdown {
                shared.work.wait(&mut state);
            }
            if state.queue.is_empty() {
                shared.idle.notify_all();
                return;
            }
            state.writing = true;
            state.queue.drain_all()
        };

        for record in &batch {
            let line = record.to_jsonl();
            let mut attempts = 0;
            loop {
                match sink.write_line(&line) {
                    Ok(()) => {
                        counters.written.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Err(err) => {
                        attempts += 1;
                        counters.write_failures.fetch_add(1, Ordering::Relaxed);
                        if attempts >= WRITE_RETRIES {
                            counters.dropped.fetch_add(1, Ordering::Relaxed);
                            log::error!(
                                "history write failed after {WRITE_RETRIES} attempts, \
                                 record {} dropped: {err}",
                                record.sequence_id
                            );
                            break;
                        }
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
        }

        let mut state = shared.state.lock();
        state.writing = false;
        if state.queue.is_empty() {
            shared.idle.notify_all();
            if state.shutdown {
                return;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::TempDir;

    use super::*;

    fn decision(session_id: &str, ts: &str, score: f32, anomaly: bool) -> Decision {
        Decision {
            timestamp: ts.parse().unwrap(),
            combined_score: score,
            is_anomaly: anomaly,
            alert: anomaly,
            reasons: if anomaly {
                vec!["suspicious_port".to_string()]
            } else {
                Vec::new()
            },
            src_ip: "10.0.0.1".to_string(),
            src_port: Some(4444),
            dst_ip: "10.0.0.2".to_string(),
            dst_port: Some(23),
            session_id: session_id.to_string(),
        }
    }

    fn flushed_store(dir: &TempDir) -> DecisionHistoryStore {
        DecisionHistoryStore::open(dir.path(), 64).unwrap()
    }

    #[test]
    fn test_append_persists_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = flushed_store(&dir);
        let d = decision("s-1", "2026-08-08T10:00:00Z", 0.9, true);
        let seq = store.append(&d);
        assert!(store.flush(Duration::from_secs(5)));

        let records = store.query(TimeRange::all(), QueryOrder::OldestFirst, None).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.sequence_id, seq);
        assert_eq!(*record, HistoryRecord::from_decision(&d, seq));
    }

    #[test]
    fn test_malformed_line_is_skipped_and_counted() {
        let dir = TempDir::new().unwrap();
        {
            let store = flushed_store(&dir);
            store.append(&decision("s-1", "2026-08-08T10:00:00Z", 0.1, false));
            store.append(&decision("s-1", "2026-08-08T11:00:00Z", 0.2, false));
            store.flush(Duration::from_secs(5));
        }
        // Corrupt the log with a half-written line.
        let path = decision_files(dir.path()).unwrap().pop().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"sequence_id\": 99, \"truncated").unwrap();

        let store = flushed_store(&dir);
        let records = store.query(TimeRange::all(), QueryOrder::OldestFirst, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(store.counters().malformed_records, 1);
    }

    #[test]
    fn test_query_order_limit_and_range() {
        let dir = TempDir::new().unwrap();
        let store = flushed_store(&dir);
        for hour in 0..5 {
            store.append(&decision(
                "s-1",
                &format!("2026-08-08T{:02}:00:00Z", 10 + hour),
                0.1 * hour as f32,
                false,
            ));
        }
        store.flush(Duration::from_secs(5));

        let newest = store
            .query(TimeRange::all(), QueryOrder::NewestFirst, Some(2))
            .unwrap();
        assert_eq!(newest.len(), 2);
        assert!(newest[0].timestamp > newest[1].timestamp);

        let windowed = store
            .query(
                TimeRange::between(
                    "2026-08-08T11:00:00Z".parse().unwrap(),
                    "2026-08-08T13:00:00Z".parse().unwrap(),
                ),
                QueryOrder::OldestFirst,
                None,
            )
            .unwrap();
        assert_eq!(windowed.len(), 3);
        assert!(windowed.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_stats_rate_and_timeline() {
        let dir = TempDir::new().unwrap();
        let store = flushed_store(&dir);
        store.append(&decision("s-1", "2026-08-08T10:05:00Z", 1.0, true));
        store.append(&decision("s-1", "2026-08-08T10:25:00Z", 1.0, true));
        store.append(&decision("s-1", "2026-08-08T11:10:00Z", 1.0, true));
        store.append(&decision("s-1", "2026-08-08T11:20:00Z", 0.0, false));
        store.flush(Duration::from_secs(5));

        let stats = store.stats(TimeRange::all()).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.anomaly_count, 3);
        assert!((stats.anomaly_rate - 0.75).abs() < 1e-6);
        assert!((stats.mean_score - 0.75).abs() < 1e-6);
        assert_eq!(
            stats.timeline,
            vec![
                TimelineBucket {
                    bucket_start: "2026-08-08T10:00:00Z".parse().unwrap(),
                    anomalies: 2,
                },
                TimelineBucket {
                    bucket_start: "2026-08-08T11:00:00Z".parse().unwrap(),
                    anomalies: 1,
                },
            ]
        );
    }

    #[test]
    fn test_prune_exempts_open_session() {
        let dir = TempDir::new().unwrap();
        let store = flushed_store(&dir);
        let session = store.open_session();

        // Old records from a previous run plus fresh ones from the open
        // session, all older than the injected "now".
        store.append(&decision("old-session", "2026-08-01T10:00:00Z", 0.2, false));
        store.append(&decision("old-session", "2026-08-02T10:00:00Z", 0.9, true));
        store.append(&decision(&session.session_id, "2026-08-03T10:00:00Z", 0.4, false));
        store.flush(Duration::from_secs(5));

        let future_now = "2026-09-01T00:00:00Z".parse().unwrap();
        let report = store.prune_at(0, future_now).unwrap();
        assert_eq!(report.removed_records, 2);

        let survivors = store.query(TimeRange::all(), QueryOrder::OldestFirst, None).unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].session_id, session.session_id);
    }

    #[test]
    fn test_sequence_ids_resume_across_reopen() {
        let dir = TempDir::new().unwrap();
        let last_seq = {
            let store = flushed_store(&dir);
            store.append(&decision("s-1", "2026-08-08T10:00:00Z", 0.1, false));
            let seq = store.append(&decision("s-1", "2026-08-08T10:01:00Z", 0.1, false));
            store.flush(Duration::from_secs(5));
            store.shutdown(Duration::from_secs(5));
            seq
        };

        let store = flushed_store(&dir);
        let seq = store.append(&decision("s-2", "2026-08-08T10:02:00Z", 0.1, false));
        assert_eq!(seq, last_seq + 1);
    }

    #[test]
    fn test_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = flushed_store(&dir);
        let opened = store.open_session();
        assert_eq!(store.current_session_id(), Some(opened.session_id.clone()));

        let closed = store.close_session(42, 7).unwrap();
        assert_eq!(closed.session_id, opened.session_id);
        assert!(closed.ended_at.is_some());
        assert_eq!((closed.decisions, closed.anomalies), (42, 7));
        assert_eq!(store.current_session_id(), None);

        let sessions = store.sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0], closed);
    }

    #[test]
    fn test_shutdown_flushes_queued_writes() {
        let dir = TempDir::new().unwrap();
        let store = flushed_store(&dir);
        for i in 0..20 {
            store.append(&decision(
                "s-1",
                &format!("2026-08-08T10:00:{i:02}Z"),
                0.1,
                false,
            ));
        }
        store.shutdown(Duration::from_secs(5));
        assert_eq!(store.counters().records_written, 20);
        assert_eq!(store.counters().records_dropped, 0);
    }
}
