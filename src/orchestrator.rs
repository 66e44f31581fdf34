//! Drives one exercise run end-to-end with live streaming, fanning teams out
//! to a bounded worker pool using a `chunks(K)` + `thread::spawn` +
//! join-before-next-batch pattern.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::Config;
use crate::contracts::{AttendanceSource, ContractError, EmailDirectory, ParticipationSource, TeamResultStore};
use crate::fairness::{FairnessError, FairnessService, PairScheduleContext, TeamContext};
use crate::git::{Git, GitError};
use crate::models::{
    AnalysisMetadata, AnalysisStage, CqiComponents, CqiResult, CqiWeights, FairnessFlag,
    FairnessReport, TeamResult, TokenTotals,
};
use crate::rater::EffortRater;
use crate::state_machine::{AnalysisStateMachine, StateMachineError, StatusStore};

#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    Start { total: u32 },
    Update { data: TeamResult },
    Done,
    Error { message: String },
    AlreadyRunning,
}

#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("client disconnected")]
    Disconnected,
    #[error("event sink error: {0}")]
    Other(String),
}

/// A single mutex around each subscriber's underlying stream, so a message
/// is never interleaved mid-write even when multiple teams finish at once.
pub trait EventSink: Send + Sync {
    fn send(&self, event: AnalysisEvent) -> Result<(), EventSinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("failed to fetch participations: {0}")]
    Participations(ContractError),
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
}

/// Hand-written in-memory sink for tests: records every event it receives.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<AnalysisEvent>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<AnalysisEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for InMemoryEventSink {
    fn send(&self, event: AnalysisEvent) -> Result<(), EventSinkError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Disconnects after `fail_after` sends, simulating a client that dropped
/// the stream mid-run.
pub struct DisconnectingEventSink {
    fail_after: usize,
    sent: Mutex<usize>,
}

impl DisconnectingEventSink {
    pub fn new(fail_after: usize) -> Self {
        Self {
            fail_after,
            sent: Mutex::new(0),
        }
    }
}

impl EventSink for DisconnectingEventSink {
    fn send(&self, _event: AnalysisEvent) -> Result<(), EventSinkError> {
        let mut sent = self.sent.lock().unwrap();
        *sent += 1;
        if *sent > self.fail_after {
            Err(EventSinkError::Disconnected)
        } else {
            Ok(())
        }
    }
}

pub struct PipelineOrchestrator<S: StatusStore> {
    participation_source: Arc<dyn ParticipationSource>,
    attendance_source: Arc<dyn AttendanceSource>,
    team_result_store: Arc<dyn TeamResultStore>,
    email_directory: Arc<dyn EmailDirectory>,
    state_machine: Arc<AnalysisStateMachine<S>>,
    event_sink: Arc<dyn EventSink>,
    config: Arc<Config>,
    rater: Arc<EffortRater>,
}

impl<S: StatusStore> PipelineOrchestrator<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        participation_source: Arc<dyn ParticipationSource>,
        attendance_source: Arc<dyn AttendanceSource>,
        team_result_store: Arc<dyn TeamResultStore>,
        email_directory: Arc<dyn EmailDirectory>,
        state_machine: Arc<AnalysisStateMachine<S>>,
        event_sink: Arc<dyn EventSink>,
        config: Arc<Config>,
        rater: Arc<EffortRater>,
    ) -> Self {
        Self {
            participation_source,
            attendance_source,
            team_result_store,
            email_directory,
            state_machine,
            event_sink,
            config,
            rater,
        }
    }

    fn emit(&self, event: AnalysisEvent) {
        if let Err(EventSinkError::Disconnected) = self.event_sink.send(event) {
            log::trace!("event sink disconnected; continuing analysis in the background");
        }
    }

    pub fn run_exercise(&self, exercise_id: &str) -> Result<(), OrchestratorError> {
        let participations = self
            .participation_source
            .participations(exercise_id)
            .map_err(OrchestratorError::Participations)?;

        let mut teams_to_analyze = Vec::new();
        for participation in participations {
            if participation.repository_uri.is_empty() {
                continue;
            }
            let already_done = self
                .team_result_store
                .load(exercise_id, &participation.team_name)
                .ok()
                .flatten()
                .is_some();
            if !already_done {
                teams_to_analyze.push(participation);
            }
        }

        match self
            .state_machine
            .start_analysis(exercise_id, teams_to_analyze.len() as u32)
        {
            Ok(_) => {}
            Err(StateMachineError::AlreadyRunning(_)) => {
                self.emit(AnalysisEvent::AlreadyRunning);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        self.emit(AnalysisEvent::Start {
            total: teams_to_analyze.len() as u32,
        });

        let processed = Arc::new(Mutex::new(0u32));
        let workers = self.config.orchestrator_workers.max(1);

        for batch in teams_to_analyze.chunks(workers) {
            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|participation| {
                    let exercise_id = exercise_id.to_string();
                    let orchestrator = OrchestratorWorker {
                        attendance_source: Arc::clone(&self.attendance_source),
                        team_result_store: Arc::clone(&self.team_result_store),
                        email_directory: Arc::clone(&self.email_directory),
                        state_machine: Arc::clone(&self.state_machine),
                        event_sink: Arc::clone(&self.event_sink),
                        config: Arc::clone(&self.config),
                        rater: Arc::clone(&self.rater),
                        processed: Arc::clone(&processed),
                    };

                    thread::spawn(move || orchestrator.run_team(&exercise_id, participation))
                })
                .collect();

            for handle in handles {
                let _ = handle.join();
            }
        }

        self.state_machine.complete_analysis(exercise_id)?;
        self.emit(AnalysisEvent::Done);
        Ok(())
    }
}

struct OrchestratorWorker<S: StatusStore> {
    attendance_source: Arc<dyn AttendanceSource>,
    team_result_store: Arc<dyn TeamResultStore>,
    email_directory: Arc<dyn EmailDirectory>,
    state_machine: Arc<AnalysisStateMachine<S>>,
    event_sink: Arc<dyn EventSink>,
    config: Arc<Config>,
    rater: Arc<EffortRater>,
    processed: Arc<Mutex<u32>>,
}

impl<S: StatusStore> OrchestratorWorker<S> {
    fn emit(&self, event: AnalysisEvent) {
        if let Err(EventSinkError::Disconnected) = self.event_sink.send(event) {
            log::trace!("event sink disconnected; continuing analysis in the background");
        }
    }

    fn run_team(&self, exercise_id: &str, participation: crate::contracts::TeamParticipation) {
        if !self.state_machine.is_running(exercise_id) {
            log::debug!("exercise {} no longer running; worker exiting", exercise_id);
            return;
        }

        let result = match self.analyze_one(exercise_id, &participation) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("team {} analysis failed: {}", participation.team_name, err);
                self.error_result(&participation)
            }
        };

        if let Err(err) = self.team_result_store.save(exercise_id, &result) {
            log::warn!("failed to persist result for {}: {}", participation.team_name, err);
        }

        let mut processed = self.processed.lock().unwrap();
        *processed += 1;
        let _ = self.state_machine.update_progress(
            exercise_id,
            &participation.team_name,
            AnalysisStage::Done,
            *processed,
        );
        drop(processed);

        // Progress must reach DONE before the client observes this team's
        // result, so a subscriber reading AnalysisStatus off an UPDATE event
        // never sees a stale AI_ANALYZING stage.
        self.emit(AnalysisEvent::Update { data: result });
    }

    /// A zero-scored, flagged result for a team whose analysis could not
    /// complete (clone failure, git-history read failure, state-machine
    /// error). Keeps the team in the result set rather than dropping it
    /// silently, so other teams still finish the run.
    fn error_result(&self, participation: &crate::contracts::TeamParticipation) -> TeamResult {
        TeamResult {
            team_name: participation.team_name.clone(),
            report: FairnessReport {
                team_id: participation.team_name.clone(),
                balance_score: 0.0,
                effort_by_author: Default::default(),
                effort_share_by_author: Default::default(),
                flags: vec![FairnessFlag::AnalysisError],
                requires_manual_review: true,
                author_details: Default::default(),
                analysis_metadata: AnalysisMetadata {
                    analyzed_at: chrono::Utc::now(),
                    token_totals: TokenTotals::default(),
                },
                analyzed_chunks: Vec::new(),
                cqi_result: CqiResult {
                    cqi: 0.0,
                    components: CqiComponents {
                        effort_balance: 0.0,
                        loc_balance: 0.0,
                        temporal_spread: 0.0,
                        ownership_spread: 0.0,
                        pair_programming: None,
                    },
                    weights: CqiWeights {
                        effort: self.config.cqi_weights.effort,
                        loc: self.config.cqi_weights.loc,
                        temporal: self.config.cqi_weights.temporal,
                        ownership: self.config.cqi_weights.ownership,
                        pair_programming: None,
                    },
                    penalties: Vec::new(),
                    base_score: 0.0,
                    penalty_multiplier: 1.0,
                    filter_summary: None,
                },
            },
        }
    }

    fn analyze_one(
        &self,
        exercise_id: &str,
        participation: &crate::contracts::TeamParticipation,
    ) -> Result<TeamResult, TeamAnalysisError> {
        let mut processed = self.processed.lock().unwrap();
        let current = *processed;
        drop(processed);

        self.state_machine.update_progress(
            exercise_id,
            &participation.team_name,
            AnalysisStage::Downloading,
            current,
        )?;
        let cache_dir = PathBuf::from(&self.config.git_cache_dir).join(&participation.team_name);
        let git = Git::sync_repo(&participation.repository_uri, &cache_dir)?;

        self.state_machine.update_progress(
            exercise_id,
            &participation.team_name,
            AnalysisStage::GitAnalyzing,
            current,
        )?;

        let authors: HashMap<String, i64> = HashMap::new();
        let mut team_member_emails = std::collections::HashSet::new();
        for email in &participation.member_emails {
            team_member_emails.insert(email.clone());
            let _ = self.email_directory.resolve(email);
        }

        let paired_session_dates = if participation.member_emails.len() == 2 {
            self.attendance_source
                .paired_session_dates(&participation.team_name)
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let pair_programming_schedule = if participation.member_emails.len() == 2 {
            Some(PairScheduleContext {
                author_a_email: participation.member_emails[0].clone(),
                author_b_email: participation.member_emails[1].clone(),
                paired_session_dates,
            })
        } else {
            None
        };

        let ctx = TeamContext {
            team_id: participation.team_name.clone(),
            team_size: participation.member_emails.len(),
            team_member_emails,
            project_start: chrono::Utc::now() - chrono::Duration::weeks(6),
            project_end: chrono::Utc::now(),
            pair_programming_schedule,
        };

        self.state_machine.update_progress(
            exercise_id,
            &participation.team_name,
            AnalysisStage::AiAnalyzing,
            current,
        )?;

        let service = FairnessService::new(&self.config, Arc::clone(&self.rater));
        let report = service.analyze(&git, &participation.base_ref, &participation.head_ref, &authors, &ctx)?;

        Ok(TeamResult {
            team_name: participation.team_name.clone(),
            report,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TeamAnalysisError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Fairness(#[from] FairnessError),
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
}
