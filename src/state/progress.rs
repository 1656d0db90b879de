//! Audit trail of phase lifecycle events for one pipeline run.
//!
//! Every mutation reads the whole record, updates one phase entry and writes
//! the whole record back. Storage and time are injected so the log can be
//! driven deterministically in tests.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::phase::Phase;

pub const PROGRESS_FILE: &str = "migration-progress.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    InProgress,
    Completed,
    Failed,
}

impl PhaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseState::InProgress => "in_progress",
            PhaseState::Completed => "completed",
            PhaseState::Failed => "failed",
        }
    }
}

/// One external-agent invocation, kept for auditing only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub session_id: String,
    pub model: String,
    pub turns: u32,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    /// Absent when the entry was only touched by a session log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<SessionLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub project: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub phases: BTreeMap<Phase, PhaseStatus>,
}

impl ProgressRecord {
    pub fn new(project: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            project: project.to_string(),
            started_at,
            phases: BTreeMap::new(),
        }
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseStatus> {
        self.phases.get(&phase)
    }

    pub fn state_of(&self, phase: Phase) -> Option<PhaseState> {
        self.phase(phase).and_then(|p| p.status)
    }

    /// True once every pipeline phase is recorded as completed.
    pub fn is_complete(&self) -> bool {
        Phase::ALL
            .iter()
            .all(|p| self.state_of(*p) == Some(PhaseState::Completed))
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where the progress record lives.
pub trait ProgressStorage: Send + Sync {
    fn load(&self) -> Result<Option<ProgressRecord>>;
    fn store(&self, record: &ProgressRecord) -> Result<()>;
}

/// JSON document in the working directory, rewritten on every store.
#[derive(Debug, Clone)]
pub struct FileProgressStorage {
    path: PathBuf,
}

impl FileProgressStorage {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            path: work_dir.join(PROGRESS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressStorage for FileProgressStorage {
    fn load(&self) -> Result<Option<ProgressRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read progress file {}", self.path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse progress file {}", self.path.display()))?;
        Ok(Some(record))
    }

    fn store(&self, record: &ProgressRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create working directory")?;
        }
        let json = serde_json::to_string_pretty(record).context("Failed to serialize progress")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write progress file {}", self.path.display()))?;
        Ok(())
    }
}

/// Volatile storage for runs that should leave nothing on disk.
#[derive(Debug, Default)]
pub struct MemoryProgressStorage {
    record: Mutex<Option<ProgressRecord>>,
}

impl ProgressStorage for MemoryProgressStorage {
    fn load(&self) -> Result<Option<ProgressRecord>> {
        let guard = self
            .record
            .lock()
            .map_err(|_| anyhow::anyhow!("Progress storage lock poisoned"))?;
        Ok(guard.clone())
    }

    fn store(&self, record: &ProgressRecord) -> Result<()> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| anyhow::anyhow!("Progress storage lock poisoned"))?;
        *guard = Some(record.clone());
        Ok(())
    }
}

pub struct ProgressLog {
    storage: Box<dyn ProgressStorage>,
    clock: Arc<dyn Clock>,
}

impl ProgressLog {
    /// File-backed log in `work_dir` using wall-clock time.
    pub fn open(work_dir: &Path) -> Self {
        Self::with_parts(Box::new(FileProgressStorage::new(work_dir)), Arc::new(SystemClock))
    }

    pub fn with_parts(storage: Box<dyn ProgressStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Start a fresh record for `project`, discarding any previous history.
    pub fn init(&self, project: &str) -> Result<()> {
        let record = ProgressRecord::new(project, self.clock.now());
        self.storage.store(&record)
    }

    pub fn read(&self) -> Result<Option<ProgressRecord>> {
        self.storage.load()
    }

    pub fn mark_started(&self, phase: Phase) -> Result<()> {
        let now = self.clock.now();
        self.update(phase, |entry| {
            entry.status = Some(PhaseState::InProgress);
            entry.started_at = Some(now);
            entry.completed_at = None;
            entry.summary = None;
            entry.failed_at = None;
            entry.error = None;
        })
    }

    pub fn mark_completed(&self, phase: Phase, summary: &str) -> Result<()> {
        let now = self.clock.now();
        self.update(phase, |entry| {
            entry.status = Some(PhaseState::Completed);
            entry.completed_at = Some(now);
            entry.summary = Some(summary.to_string());
            entry.failed_at = None;
            entry.error = None;
        })
    }

    pub fn mark_failed(&self, phase: Phase, error: &str) -> Result<()> {
        let now = self.clock.now();
        self.update(phase, |entry| {
            entry.status = Some(PhaseState::Failed);
            entry.failed_at = Some(now);
            entry.error = Some(error.to_string());
            entry.completed_at = None;
            entry.summary = None;
        })
    }

    pub fn add_session_log(
        &self,
        phase: Phase,
        session_id: &str,
        model: &str,
        turns: u32,
    ) -> Result<()> {
        let logged_at = self.clock.now();
        self.update(phase, |entry| {
            entry.sessions.push(SessionLog {
                session_id: session_id.to_string(),
                model: model.to_string(),
                turns,
                logged_at,
            });
        })
    }

    fn update<F>(&self, phase: Phase, f: F) -> Result<()>
    where
        F: FnOnce(&mut PhaseStatus),
    {
        let mut record = match self.storage.load()? {
            Some(record) => record,
            None => ProgressRecord::new("", self.clock.now()),
        };
        f(record.phases.entry(phase).or_default());
        self.storage.store(&record)?;
        debug!(phase = %phase, "progress updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    /// Clock that advances one second per reading.
    struct StepClock {
        base: DateTime<Utc>,
        ticks: Mutex<i64>,
    }

    impl StepClock {
        fn new() -> Self {
            Self {
                base: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                ticks: Mutex::new(0),
            }
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            let mut ticks = self.ticks.lock().unwrap();
            *ticks += 1;
            self.base + chrono::Duration::seconds(*ticks)
        }
    }

    fn memory_log() -> ProgressLog {
        ProgressLog::with_parts(
            Box::new(MemoryProgressStorage::default()),
            Arc::new(StepClock::new()),
        )
    }

    #[test]
    fn test_read_without_init_returns_none() {
        let dir = tempdir().unwrap();
        let log = ProgressLog::open(dir.path());
        assert!(log.read().unwrap().is_none());
    }

    #[test]
    fn test_init_yields_empty_phase_map() {
        let log = memory_log();
        log.init("test-migration").unwrap();
        let record = log.read().unwrap().unwrap();
        assert_eq!(record.project, "test-migration");
        assert!(record.phases.is_empty());
    }

    #[test]
    fn test_started_then_completed_keeps_both_timestamps() {
        let log = memory_log();
        log.init("p").unwrap();
        log.mark_started(Phase::Discovery).unwrap();
        let record = log.read().unwrap().unwrap();
        assert_eq!(record.state_of(Phase::Discovery), Some(PhaseState::InProgress));

        log.mark_completed(Phase::Discovery, "ok").unwrap();
        let record = log.read().unwrap().unwrap();
        let entry = record.phase(Phase::Discovery).unwrap();
        assert_eq!(entry.status, Some(PhaseState::Completed));
        assert_eq!(entry.summary.as_deref(), Some("ok"));
        let started = entry.started_at.unwrap();
        let completed = entry.completed_at.unwrap();
        assert!(completed > started);
    }

    #[test]
    fn test_mark_failed_records_error_text() {
        let log = memory_log();
        log.init("p").unwrap();
        log.mark_started(Phase::Discovery).unwrap();
        log.mark_failed(Phase::Discovery, "boom").unwrap();
        let record = log.read().unwrap().unwrap();
        let entry = record.phase(Phase::Discovery).unwrap();
        assert_eq!(entry.status, Some(PhaseState::Failed));
        assert_eq!(entry.error.as_deref(), Some("boom"));
        assert!(entry.failed_at.is_some());
        assert!(entry.started_at.is_some());
    }

    #[test]
    fn test_restart_clears_terminal_fields() {
        let log = memory_log();
        log.init("p").unwrap();
        log.mark_started(Phase::Narrowing).unwrap();
        log.mark_failed(Phase::Narrowing, "boom").unwrap();
        log.mark_started(Phase::Narrowing).unwrap();
        let record = log.read().unwrap().unwrap();
        let entry = record.phase(Phase::Narrowing).unwrap();
        assert_eq!(entry.status, Some(PhaseState::InProgress));
        assert!(entry.error.is_none());
        assert!(entry.failed_at.is_none());
    }

    #[test]
    fn test_session_logs_append() {
        let log = memory_log();
        log.init("p").unwrap();
        log.mark_started(Phase::Discovery).unwrap();
        log.add_session_log(Phase::Discovery, "session_123", "claude-sonnet-4-5", 7)
            .unwrap();
        log.add_session_log(Phase::Discovery, "session_456", "claude-sonnet-4-5", 2)
            .unwrap();
        let record = log.read().unwrap().unwrap();
        let sessions = &record.phase(Phase::Discovery).unwrap().sessions;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "session_123");
        assert_eq!(sessions[0].turns, 7);
        assert_eq!(sessions[1].session_id, "session_456");
        assert_eq!(
            record.state_of(Phase::Discovery),
            Some(PhaseState::InProgress)
        );
    }

    #[test]
    fn test_session_log_creates_entry_without_status() {
        let log = memory_log();
        log.init("p").unwrap();
        log.add_session_log(Phase::Migration, "s", "m", 0).unwrap();
        let record = log.read().unwrap().unwrap();
        let entry = record.phase(Phase::Migration).unwrap();
        assert!(entry.status.is_none());
        assert_eq!(entry.sessions.len(), 1);
    }

    #[test]
    fn test_init_discards_previous_history() {
        let log = memory_log();
        log.init("p").unwrap();
        log.mark_started(Phase::Discovery).unwrap();
        log.init("p").unwrap();
        assert!(log.read().unwrap().unwrap().phases.is_empty());
    }

    #[test]
    fn test_mark_without_init_synthesizes_record() {
        let log = memory_log();
        log.mark_started(Phase::Generation).unwrap();
        let record = log.read().unwrap().unwrap();
        assert_eq!(record.project, "");
        assert_eq!(
            record.state_of(Phase::Generation),
            Some(PhaseState::InProgress)
        );
    }

    #[test]
    fn test_file_persistence_across_instances() {
        let dir = tempdir().unwrap();
        {
            let log = ProgressLog::open(dir.path());
            log.init("test-project").unwrap();
            log.mark_started(Phase::Discovery).unwrap();
        }
        let log = ProgressLog::open(dir.path());
        let record = log.read().unwrap().unwrap();
        assert_eq!(record.project, "test-project");
        assert!(record.phases.contains_key(&Phase::Discovery));
    }

    #[test]
    fn test_file_format_is_json_keyed_by_phase_name() {
        let dir = tempdir().unwrap();
        let log = ProgressLog::open(dir.path());
        log.init("p").unwrap();
        log.mark_started(Phase::Discovery).unwrap();
        log.mark_completed(Phase::Discovery, "10 endpoints found").unwrap();

        let content = fs::read_to_string(dir.path().join(PROGRESS_FILE)).unwrap();
        let data: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(data["project"], "p");
        assert_eq!(data["phases"]["discovery"]["status"], "completed");
        assert_eq!(data["phases"]["discovery"]["summary"], "10 endpoints found");
        assert!(data["started_at"].is_string());
    }

    #[test]
    fn test_is_complete_requires_every_phase() {
        let log = memory_log();
        log.init("p").unwrap();
        for phase in Phase::ALL {
            log.mark_started(phase).unwrap();
            log.mark_completed(phase, "done").unwrap();
        }
        assert!(log.read().unwrap().unwrap().is_complete());

        log.mark_failed(Phase::Validation, "tests failed").unwrap();
        assert!(!log.read().unwrap().unwrap().is_complete());
    }
}
