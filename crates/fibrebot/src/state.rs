//! Run state persisted between invocations
//!
//! Loaded once when an invocation starts and written back on every exit
//! path through [`StateSession`], which flushes on drop if the owner never
//! got the chance to.

use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::errors::AutomationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedSample {
    pub project: u64,
    pub sample: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSample {
    pub project: u64,
    pub sample: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    pub current_project: Option<u64>,
    /// Offset into the current project's sample list; equal to its length
    /// once the project is exhausted
    pub current_sample_index: usize,
    /// In completion order, without duplicates
    pub completed_projects: Vec<u64>,
    pub processed_samples: Vec<ProcessedSample>,
    pub failed_samples: Vec<FailedSample>,
    /// Set only when a save is confirmed
    pub last_sample_time: Option<DateTime<Utc>>,
    pub current_interval_minutes: Option<u32>,
    pub total_samples_processed: u64,
    /// When the scheduler last looked. Diagnostic only, never persisted.
    #[serde(skip)]
    pub last_checked_time: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn is_completed(&self, project: u64) -> bool {
        self.completed_projects.contains(&project)
    }

    pub fn mark_completed(&mut self, project: u64) {
        if !self.is_completed(project) {
            self.completed_projects.push(project);
        }
    }

    pub fn record_success(&mut self, project: u64, sample: u32, at: DateTime<Utc>) {
        self.processed_samples.push(ProcessedSample {
            project,
            sample,
            timestamp: at,
        });
        self.total_samples_processed += 1;
        self.last_sample_time = Some(at);
    }

    /// Failures never touch `last_sample_time`, so the next invocation may
    /// act immediately.
    pub fn record_failure(
        &mut self,
        project: u64,
        sample: u32,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.failed_samples.push(FailedSample {
            project,
            sample,
            reason: reason.into(),
            timestamp: at,
        });
    }
}

/// Durable home of the run state.
pub trait StateStore: Send + Sync {
    /// Stored state, or the defaults when nothing was stored yet.
    fn load(&self) -> Result<RunState, AutomationError>;

    fn save(&self, state: &RunState) -> Result<(), AutomationError>;
}

/// JSON file store. Writes go to a temporary sibling and are renamed into
/// place, so a crash never leaves a truncated file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<RunState, AutomationError> {
        if !self.path.exists() {
            info!("No state file at {}, starting fresh", self.path.display());
            return Ok(RunState::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            AutomationError::State(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let state: RunState = serde_json::from_str(&content).map_err(|e| {
            AutomationError::State(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        debug!(
            "State loaded: project {:?}, index {}, {} processed",
            state.current_project, state.current_sample_index, state.total_samples_processed
        );
        Ok(state)
    }

    fn save(&self, state: &RunState) -> Result<(), AutomationError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(state)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| {
            AutomationError::State(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        debug!("State saved to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store that counts saves.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<RunState>>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RunState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Option<RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<RunState, AutomationError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    fn save(&self, state: &RunState) -> Result<(), AutomationError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

/// Loaded state bound to its store. Dereferences to [`RunState`]; any
/// mutable access marks it dirty, and a dirty session is saved on drop.
pub struct StateSession {
    store: Arc<dyn StateStore>,
    state: RunState,
    dirty: bool,
}

impl StateSession {
    pub fn open(store: Arc<dyn StateStore>) -> Result<Self, AutomationError> {
        let state = store.load()?;
        Ok(Self {
            store,
            state,
            // Always write at least once, so a first run leaves a file behind
            dirty: true,
        })
    }

    /// Save now. The session stays usable.
    pub fn flush(&mut self) -> Result<(), AutomationError> {
        self.store.save(&self.state)?;
        self.dirty = false;
        Ok(())
    }
}

impl Deref for StateSession {
    type Target = RunState;

    fn deref(&self) -> &RunState {
        &self.state
    }
}

impl DerefMut for StateSession {
    fn deref_mut(&mut self) -> &mut RunState {
        self.dirty = true;
        &mut self.state
    }
}

impl Drop for StateSession {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.store.save(&self.state) {
                error!("Failed to save state on exit: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_state() -> RunState {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 9, 30, 0).unwrap();
        let mut state = RunState {
            current_project: Some(100),
            current_sample_index: 2,
            current_interval_minutes: Some(18),
            ..Default::default()
        };
        state.mark_completed(42);
        state.record_success(100, 1, at);
        state.record_failure(100, 2, "Timed out waiting for save", at);
        state
    }

    #[test]
    fn json_round_trip_preserves_persisted_fields() {
        let mut state = sample_state();
        state.last_checked_time = Some(Utc::now());

        let json = serde_json::to_string_pretty(&state).unwrap();
        let restored: RunState = serde_json::from_str(&json).unwrap();

        assert!(restored.last_checked_time.is_none());
        state.last_checked_time = None;
        assert_eq!(restored, state);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("automation_state.json"));
        assert_eq!(store.load().unwrap(), RunState::default());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("nested").join("state.json"));
        let state = sample_state();
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileStateStore::new(path).load(),
            Err(AutomationError::State(_))
        ));
    }

    #[test]
    fn legacy_fields_are_ignored() {
        let json = r#"{
            "current_project": 7,
            "current_sample_index": 1,
            "processed_samples": [],
            "failed_samples": [],
            "completed_projects": [3],
            "last_run_time": null,
            "total_samples_processed": 4
        }"#;
        let state: RunState = serde_json::from_str(json).unwrap();
        assert_eq!(state.current_project, Some(7));
        assert_eq!(state.completed_projects, vec![3]);
        assert_eq!(state.last_sample_time, None);
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let mut state = RunState::default();
        state.mark_completed(5);
        state.mark_completed(5);
        assert_eq!(state.completed_projects, vec![5]);
    }

    #[test]
    fn failures_do_not_move_last_sample_time() {
        let mut state = RunState::default();
        state.record_failure(1, 1, "boom", Utc::now());
        assert!(state.last_sample_time.is_none());
        assert_eq!(state.total_samples_processed, 0);
    }

    #[test]
    fn session_saves_on_drop() {
        let store = Arc::new(MemoryStateStore::new());
        {
            let mut session = StateSession::open(store.clone()).unwrap();
            session.current_project = Some(9);
        }
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().unwrap().current_project, Some(9));
    }

    #[test]
    fn session_skips_redundant_save_after_flush() {
        let store = Arc::new(MemoryStateStore::new());
        {
            let mut session = StateSession::open(store.clone()).unwrap();
            session.current_sample_index = 3;
            session.flush().unwrap();
        }
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn session_saves_when_unwinding_from_an_error_path() {
        fn failing_step(store: Arc<MemoryStateStore>) -> Result<(), AutomationError> {
            let mut session = StateSession::open(store)?;
            session.current_sample_index += 1;
            Err(AutomationError::Browser("crashed".into()))
        }
        let store = Arc::new(MemoryStateStore::new());
        assert!(failing_step(store.clone()).is_err());
        assert_eq!(store.snapshot().unwrap().current_sample_index, 1);
    }
}
