//! Narrow traits standing in for every external collaborator this pipeline
//! doesn't own (the exercise platform's REST client, credential handling,
//! attendance spreadsheet parsing, relational persistence, export
//! formatting, the web UI). Only in-memory or fixed test implementations
//! are provided here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::TeamResult;

#[derive(Debug, Clone)]
pub struct TeamParticipation {
    pub team_name: String,
    pub repository_uri: String,
    pub member_emails: Vec<String>,
    /// Pre-resolved analysis range, e.g. the default branch's root commit and
    /// the commit nearest the submission deadline — resolution of those refs
    /// against the exercise platform happens upstream of this pipeline.
    pub base_ref: String,
    pub head_ref: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("upstream collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Stands in for the exercise-platform REST client.
pub trait ParticipationSource: Send + Sync {
    fn participations(&self, exercise_id: &str) -> Result<Vec<TeamParticipation>, ContractError>;
}

/// Stands in for the attendance spreadsheet parser.
pub trait AttendanceSource: Send + Sync {
    fn paired_session_dates(&self, team_name: &str) -> Result<Vec<DateTime<Utc>>, ContractError>;
}

/// Stands in for the relational persistence layer.
pub trait TeamResultStore: Send + Sync {
    fn save(&self, exercise_id: &str, result: &TeamResult) -> Result<(), ContractError>;
    fn load(&self, exercise_id: &str, team_name: &str) -> Result<Option<TeamResult>, ContractError>;
    fn all(&self, exercise_id: &str) -> Result<Vec<TeamResult>, ContractError>;
}

/// Stands in for the email-remapping admin flow.
pub trait EmailDirectory: Send + Sync {
    fn resolve(&self, email: &str) -> Option<i64>;
}

#[derive(Debug, Clone, Default)]
pub struct FixedParticipationSource {
    pub participations: Vec<TeamParticipation>,
}

impl ParticipationSource for FixedParticipationSource {
    fn participations(&self, _exercise_id: &str) -> Result<Vec<TeamParticipation>, ContractError> {
        Ok(self.participations.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedAttendanceSource {
    pub sessions_by_team: HashMap<String, Vec<DateTime<Utc>>>,
}

impl AttendanceSource for FixedAttendanceSource {
    fn paired_session_dates(&self, team_name: &str) -> Result<Vec<DateTime<Utc>>, ContractError> {
        Ok(self.sessions_by_team.get(team_name).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryTeamResultStore {
    inner: std::sync::Mutex<HashMap<String, Vec<TeamResult>>>,
}

impl TeamResultStore for InMemoryTeamResultStore {
    fn save(&self, exercise_id: &str, result: &TeamResult) -> Result<(), ContractError> {
        let mut guard = self.inner.lock().unwrap();
        let entries = guard.entry(exercise_id.to_string()).or_default();
        entries.retain(|r| r.team_name != result.team_name);
        entries.push(result.clone());
        Ok(())
    }

    fn load(&self, exercise_id: &str, team_name: &str) -> Result<Option<TeamResult>, ContractError> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .get(exercise_id)
            .and_then(|entries| entries.iter().find(|r| r.team_name == team_name).cloned()))
    }

    fn all(&self, exercise_id: &str) -> Result<Vec<TeamResult>, ContractError> {
        let guard = self.inner.lock().unwrap();
        Ok(guard.get(exercise_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedEmailDirectory {
    pub ids_by_email: HashMap<String, i64>,
}

impl EmailDirectory for FixedEmailDirectory {
    fn resolve(&self, email: &str) -> Option<i64> {
        self.ids_by_email.get(email).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisMetadata, AuthorDetail, CqiComponents, CqiResult, CqiWeights, FairnessReport};
    use std::collections::BTreeMap;

    fn sample_result(team_name: &str) -> TeamResult {
        TeamResult {
            team_name: team_name.to_string(),
            report: FairnessReport {
                team_id: team_name.to_string(),
                balance_score: 80.0,
                effort_by_author: BTreeMap::new(),
                effort_share_by_author: BTreeMap::new(),
                flags: vec![],
                requires_manual_review: false,
                author_details: BTreeMap::<String, AuthorDetail>::new(),
                analysis_metadata: AnalysisMetadata {
                    analyzed_at: Utc::now(),
                    token_totals: Default::default(),
                },
                analyzed_chunks: vec![],
                cqi_result: CqiResult {
                    cqi: 80.0,
                    components: CqiComponents {
                        effort_balance: 80.0,
                        loc_balance: 80.0,
                        temporal_spread: 80.0,
                        ownership_spread: 80.0,
                        pair_programming: None,
                    },
                    weights: CqiWeights {
                        effort: 0.4,
                        loc: 0.25,
                        temporal: 0.2,
                        ownership: 0.15,
                        pair_programming: None,
                    },
                    penalties: vec![],
                    base_score: 80.0,
                    penalty_multiplier: 1.0,
                    filter_summary: None,
                },
            },
        }
    }

    #[test]
    fn in_memory_store_overwrites_by_team_name() {
        let store = InMemoryTeamResultStore::default();
        store.save("ex-1", &sample_result("team-a")).unwrap();
        store.save("ex-1", &sample_result("team-a")).unwrap();
        assert_eq!(store.all("ex-1").unwrap().len(), 1);
    }

    #[test]
    fn fixed_participation_source_returns_configured_list() {
        let source = FixedParticipationSource {
            participations: vec![TeamParticipation {
                team_name: "team-a".to_string(),
                repository_uri: "git://host/team-a".to_string(),
                member_emails: vec!["a@x.com".to_string()],
                base_ref: "root".to_string(),
                head_ref: "HEAD".to_string(),
            }],
        };
        assert_eq!(source.participations("ex-1").unwrap().len(), 1);
    }
}
