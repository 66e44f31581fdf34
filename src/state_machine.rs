//! Per-exercise analysis lifecycle: IDLE/RUNNING/PAUSED/DONE/ERROR, behind
//! a pluggable [`StatusStore`].

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;

use crate::models::{AnalysisStage, AnalysisState, AnalysisStatus};

const STATE_DIR: &str = ".cqi-state";

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("analysis already running for exercise {0}")]
    AlreadyRunning(String),
    #[error("no analysis in progress for exercise {0}")]
    NotRunning(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(String),
}

/// Abstracts where [`AnalysisStatus`] is persisted, one record per exercise.
pub trait StatusStore: Send + Sync {
    fn load(&self, exercise_id: &str) -> Result<Option<AnalysisStatus>, StoreError>;
    fn save(&self, exercise_id: &str, status: &AnalysisStatus) -> Result<(), StoreError>;
    fn all(&self) -> Result<HashMap<String, AnalysisStatus>, StoreError>;
}

/// JSON-file-backed store, one file per exercise under a configurable
/// state directory.
pub struct FileStatusStore {
    state_dir: PathBuf,
}

impl FileStatusStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn path_for(&self, exercise_id: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", exercise_id))
    }
}

impl Default for FileStatusStore {
    fn default() -> Self {
        let dir = env::var("CQI_STATE_DIR").unwrap_or_else(|_| STATE_DIR.to_string());
        Self::new(PathBuf::from(dir))
    }
}

impl StatusStore for FileStatusStore {
    fn load(&self, exercise_id: &str) -> Result<Option<AnalysisStatus>, StoreError> {
        let path = self.path_for(exercise_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::Json(e.to_string()))
    }

    fn save(&self, exercise_id: &str, status: &AnalysisStatus) -> Result<(), StoreError> {
        fs::create_dir_all(&self.state_dir)?;
        let json = serde_json::to_string_pretty(status).map_err(|e| StoreError::Json(e.to_string()))?;
        fs::write(self.path_for(exercise_id), json)?;
        Ok(())
    }

    fn all(&self) -> Result<HashMap<String, AnalysisStatus>, StoreError> {
        let mut out = HashMap::new();
        if !self.state_dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.state_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let exercise_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let json = fs::read_to_string(&path)?;
            if let Ok(status) = serde_json::from_str(&json) {
                out.insert(exercise_id, status);
            }
        }
        Ok(out)
    }
}

/// In-memory store for tests: never touches the filesystem.
#[derive(Default)]
pub struct InMemoryStatusStore {
    inner: Mutex<HashMap<String, AnalysisStatus>>,
}

impl StatusStore for InMemoryStatusStore {
    fn load(&self, exercise_id: &str) -> Result<Option<AnalysisStatus>, StoreError> {
        Ok(self.inner.lock().unwrap().get(exercise_id).cloned())
    }

    fn save(&self, exercise_id: &str, status: &AnalysisStatus) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .insert(exercise_id.to_string(), status.clone());
        Ok(())
    }

    fn all(&self) -> Result<HashMap<String, AnalysisStatus>, StoreError> {
        Ok(self.inner.lock().unwrap().clone())
    }
}

/// Drives [`AnalysisStatus`] transitions for every exercise through a single
/// [`StatusStore`]. All transitions lock the per-call mutex, so readers
/// never observe a half-written status.
pub struct AnalysisStateMachine<S: StatusStore> {
    store: S,
    lock: Mutex<()>,
}

impl<S: StatusStore> AnalysisStateMachine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Must run once at process start, before any `start_analysis` call:
    /// promotes every persisted RUNNING status to PAUSED so a crash mid-run
    /// doesn't strand the exercise in a state nothing can resume from.
    pub fn recover_on_startup(&self) -> Result<(), StateMachineError> {
        let _guard = self.lock.lock().unwrap();
        for (exercise_id, mut status) in self.store.all()? {
            if status.state == AnalysisState::Running {
                status.state = AnalysisState::Paused;
                status.last_updated_at = Utc::now();
                self.store.save(&exercise_id, &status)?;
            }
        }
        Ok(())
    }

    pub fn status(&self, exercise_id: &str) -> Result<AnalysisStatus, StateMachineError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .store
            .load(exercise_id)?
            .unwrap_or_else(|| AnalysisStatus::idle(Utc::now())))
    }

    pub fn start_analysis(
        &self,
        exercise_id: &str,
        total_teams: u32,
    ) -> Result<AnalysisStatus, StateMachineError> {
        let _guard = self.lock.lock().unwrap();
        let existing = self.store.load(exercise_id)?;
        let now = Utc::now();

        let status = match existing {
            Some(status) if status.state == AnalysisState::Running => {
                return Err(StateMachineError::AlreadyRunning(exercise_id.to_string()));
            }
            Some(mut status) if status.state == AnalysisState::Paused => {
                status.state = AnalysisState::Running;
                status.last_updated_at = now;
                status
            }
            _ => AnalysisStatus {
                state: AnalysisState::Running,
                total_teams,
                processed_teams: 0,
                current_team_name: None,
                current_stage: None,
                started_at: Some(now),
                last_updated_at: now,
                error_message: None,
            },
        };
        self.store.save(exercise_id, &status)?;
        Ok(status)
    }

    pub fn update_progress(
        &self,
        exercise_id: &str,
        team_name: &str,
        stage: AnalysisStage,
        processed_teams: u32,
    ) -> Result<(), StateMachineError> {
        let _guard = self.lock.lock().unwrap();
        let mut status = self
            .store
            .load(exercise_id)?
            .ok_or_else(|| StateMachineError::NotRunning(exercise_id.to_string()))?;
        if status.state != AnalysisState::Running {
            return Err(StateMachineError::NotRunning(exercise_id.to_string()));
        }
        status.current_team_name = Some(team_name.to_string());
        status.current_stage = Some(stage);
        status.processed_teams = processed_teams;
        status.last_updated_at = Utc::now();
        self.store.save(exercise_id, &status)?;
        Ok(())
    }

    pub fn complete_analysis(&self, exercise_id: &str) -> Result<(), StateMachineError> {
        self.transition_to(exercise_id, AnalysisState::Done, None)
    }

    pub fn pause_analysis(&self, exercise_id: &str) -> Result<(), StateMachineError> {
        self.transition_to(exercise_id, AnalysisState::Paused, None)
    }

    pub fn cancel_analysis(&self, exercise_id: &str) -> Result<(), StateMachineError> {
        self.transition_to(exercise_id, AnalysisState::Paused, None)
    }

    pub fn fail_analysis(&self, exercise_id: &str, error: impl Into<String>) -> Result<(), StateMachineError> {
        self.transition_to(exercise_id, AnalysisState::Error, Some(error.into()))
    }

    fn transition_to(
        &self,
        exercise_id: &str,
        state: AnalysisState,
        error_message: Option<String>,
    ) -> Result<(), StateMachineError> {
        let _guard = self.lock.lock().unwrap();
        let mut status = self
            .store
            .load(exercise_id)?
            .unwrap_or_else(|| AnalysisStatus::idle(Utc::now()));
        status.state = state;
        status.last_updated_at = Utc::now();
        if error_message.is_some() {
            status.error_message = error_message;
        }
        self.store.save(exercise_id, &status)?;
        Ok(())
    }

    pub fn is_running(&self, exercise_id: &str) -> bool {
        self.status(exercise_id)
            .map(|s| s.state == AnalysisState::Running)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_from_idle_initializes_counters() {
        let machine = AnalysisStateMachine::new(InMemoryStatusStore::default());
        let status = machine.start_analysis("ex-1", 5).unwrap();
        assert_eq!(status.state, AnalysisState::Running);
        assert_eq!(status.total_teams, 5);
        assert_eq!(status.processed_teams, 0);
    }

    #[test]
    fn start_while_running_errors() {
        let machine = AnalysisStateMachine::new(InMemoryStatusStore::default());
        machine.start_analysis("ex-1", 5).unwrap();
        assert!(matches!(
            machine.start_analysis("ex-1", 5),
            Err(StateMachineError::AlreadyRunning(_))
        ));
    }

    #[test]
    fn pause_then_start_resumes_without_resetting_counters() {
        let machine = AnalysisStateMachine::new(InMemoryStatusStore::default());
        machine.start_analysis("ex-1", 5).unwrap();
        machine
            .update_progress("ex-1", "team-a", AnalysisStage::Downloading, 2)
            .unwrap();
        machine.pause_analysis("ex-1").unwrap();
        let resumed = machine.start_analysis("ex-1", 5).unwrap();
        assert_eq!(resumed.state, AnalysisState::Running);
        assert_eq!(resumed.processed_teams, 2);
    }

    #[test]
    fn recover_on_startup_promotes_running_to_paused() {
        let machine = AnalysisStateMachine::new(InMemoryStatusStore::default());
        machine.start_analysis("ex-1", 5).unwrap();
        machine.recover_on_startup().unwrap();
        let status = machine.status("ex-1").unwrap();
        assert_eq!(status.state, AnalysisState::Paused);
    }

    #[test]
    fn update_progress_requires_running_state() {
        let machine = AnalysisStateMachine::new(InMemoryStatusStore::default());
        let result = machine.update_progress("ex-1", "team-a", AnalysisStage::Downloading, 1);
        assert!(matches!(result, Err(StateMachineError::NotRunning(_))));
    }
}
