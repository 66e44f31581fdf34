//! End-to-end scenarios against [`cqi_pipeline::fairness::FairnessService`]:
//! a fake git history goes in, a `FairnessReport` comes out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use cqi_pipeline::config::Config;
use cqi_pipeline::fairness::{FairnessService, TeamContext};
use cqi_pipeline::git::{GitError, GitOps};
use cqi_pipeline::llm::test_support::FixedLlmClient;
use cqi_pipeline::models::{Commit, FileChange, PenaltyKind};
use cqi_pipeline::rater::EffortRater;

struct FakeGit {
    commits: Vec<Commit>,
}

impl GitOps for FakeGit {
    fn resolve_ref(&self, ref_name: &str) -> Result<String, GitError> {
        Ok(ref_name.to_string())
    }
    fn read_commits(
        &self,
        _base: &str,
        _head: &str,
        _authors: &HashMap<String, i64>,
    ) -> Result<Vec<Commit>, GitError> {
        Ok(self.commits.clone())
    }
}

fn project_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn project_end() -> DateTime<Utc> {
    project_start() + Duration::weeks(5)
}

fn commit_at(sha: &str, author_email: &str, added: u32, at: DateTime<Utc>) -> Commit {
    Commit {
        sha: sha.to_string(),
        author_id: None,
        author_email: author_email.to_string(),
        message: "add feature work".to_string(),
        timestamp: at,
        files: vec![FileChange {
            path: "src/lib.rs".to_string(),
            added_lines: added,
            deleted_lines: 0,
            diff_text: "+fn x() {}".to_string(),
        }],
        is_merge: false,
        is_rename_only: false,
        is_format_only: false,
    }
}

fn team_ctx(size: usize, members: &[&str]) -> TeamContext {
    TeamContext {
        team_id: "team-under-test".to_string(),
        team_size: size,
        team_member_emails: members.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
        project_start: project_start(),
        project_end: project_end(),
        pair_programming_schedule: None,
    }
}

fn feature_response(effort: u32) -> String {
    format!(
        r#"{{"effortScore":{e},"complexity":8,"novelty":8,"type":"FEATURE","confidence":0.9,"reasoning":"ok"}}"#,
        e = effort
    )
}

fn trivial_response(effort: u32) -> String {
    format!(
        r#"{{"effortScore":{e},"complexity":2,"novelty":1,"type":"TRIVIAL","confidence":0.9,"reasoning":"ok"}}"#,
        e = effort
    )
}

#[test]
fn scenario_perfect_balance_scores_at_least_eighty() {
    let config = Config::default();
    let rater = Arc::new(EffortRater::new(
        Arc::new(FixedLlmClient::new(feature_response(8))),
        "gpt-4o-mini",
    ));
    let service = FairnessService::new(&config, rater);

    let mut commits = Vec::new();
    let start = project_start();
    for i in 0..4 {
        commits.push(commit_at("a", "a@team.com", 50, start + Duration::days(i * 6)));
        commits.push(commit_at("b", "b@team.com", 50, start + Duration::days(i * 6 + 3)));
    }
    let git = FakeGit { commits };
    let ctx = team_ctx(2, &["a@team.com", "b@team.com"]);

    let report = service
        .analyze(&git, "base", "head", &HashMap::new(), &ctx)
        .unwrap();

    assert!(report.cqi_result.cqi >= 80.0, "cqi was {}", report.cqi_result.cqi);
    assert!(report.cqi_result.penalties.is_empty());
    assert!(report.flags.is_empty());
}

#[test]
fn scenario_solo_contributor_zeroes_out_cqi() {
    let config = Config {
        cqi_penalties_enabled: true,
        ..Config::default()
    };
    let rater = Arc::new(EffortRater::new(
        Arc::new(FixedLlmClient::new(feature_response(9))),
        "gpt-4o-mini",
    ));
    let service = FairnessService::new(&config, rater);

    let start = project_start();
    let mut commits: Vec<Commit> = (0..10)
        .map(|i| commit_at(&format!("a{i}"), "a@team.com", 40, start + Duration::days(i)))
        .collect();
    commits.push(commit_at("b0", "b@team.com", 5, start + Duration::days(11)));

    let git = FakeGit { commits };
    let ctx = team_ctx(2, &["a@team.com", "b@team.com"]);

    let report = service
        .analyze(&git, "base", "head", &HashMap::new(), &ctx)
        .unwrap();

    let share_a = report.effort_share_by_author.values().cloned().fold(0.0_f64, f64::max);
    assert!(share_a > 0.85, "share was {}", share_a);
    assert!(report
        .cqi_result
        .penalties
        .iter()
        .any(|p| p.kind == PenaltyKind::SoloDevelopment));
    assert_eq!(report.cqi_result.cqi, 0.0);
}

#[test]
fn scenario_late_dump_triggers_late_work_penalty() {
    let config = Config {
        cqi_penalties_enabled: true,
        ..Config::default()
    };
    let rater = Arc::new(EffortRater::new(
        Arc::new(FixedLlmClient::new(feature_response(8))),
        "gpt-4o-mini",
    ));
    let service = FairnessService::new(&config, rater);

    let start = project_start();
    let end = project_end();
    let mut commits: Vec<Commit> = (0..4)
        .map(|i| commit_at(&format!("a{i}"), "a@team.com", 10, start + Duration::days(i * 5)))
        .collect();
    for i in 0..4 {
        commits.push(commit_at(
            &format!("late{i}"),
            "a@team.com",
            200,
            end - Duration::hours(11) + Duration::minutes(i * 5),
        ));
    }
    commits.push(commit_at("b0", "b@team.com", 5, end - Duration::minutes(5)));

    let git = FakeGit { commits };
    let ctx = team_ctx(2, &["a@team.com", "b@team.com"]);

    let report = service
        .analyze(&git, "base", "head", &HashMap::new(), &ctx)
        .unwrap();

    assert!(report
        .cqi_result
        .penalties
        .iter()
        .any(|p| p.kind == PenaltyKind::LateWork));
    assert!(report.flags.contains(&cqi_pipeline::models::FairnessFlag::LateWorkConcentration));
}

/// Running the same pipeline twice against an unchanged history, with a
/// rater that always returns the same rating, must produce the same CQI.
#[test]
fn running_analysis_twice_is_deterministic() {
    let config = Config::default();
    let make_service = || {
        FairnessService::new(
            &config,
            Arc::new(EffortRater::new(
                Arc::new(FixedLlmClient::new(feature_response(7))),
                "gpt-4o-mini",
            )),
        )
    };

    let start = project_start();
    let commits = vec![
        commit_at("a", "a@team.com", 40, start),
        commit_at("b", "b@team.com", 40, start + Duration::days(1)),
    ];
    let git = FakeGit { commits };
    let ctx = team_ctx(2, &["a@team.com", "b@team.com"]);

    let first = make_service()
        .analyze(&git, "base", "head", &HashMap::new(), &ctx)
        .unwrap();
    let second = make_service()
        .analyze(&git, "base", "head", &HashMap::new(), &ctx)
        .unwrap();

    assert_eq!(first.cqi_result.cqi, second.cqi_result.cqi);
    assert_eq!(first.effort_share_by_author, second.effort_share_by_author);
}

/// teamSize=1 always yields CQI=0 regardless of commit history.
#[test]
fn single_member_team_always_yields_zero_cqi() {
    let config = Config::default();
    let rater = Arc::new(EffortRater::new(
        Arc::new(FixedLlmClient::new(feature_response(9))),
        "gpt-4o-mini",
    ));
    let service = FairnessService::new(&config, rater);

    let start = project_start();
    let commits = vec![commit_at("a", "a@team.com", 400, start)];
    let git = FakeGit { commits };
    let ctx = team_ctx(1, &["a@team.com"]);

    let report = service
        .analyze(&git, "base", "head", &HashMap::new(), &ctx)
        .unwrap();
    assert_eq!(report.cqi_result.cqi, 0.0);
}

#[test]
fn high_trivial_ratio_is_flagged() {
    let config = Config::default();
    let rater = Arc::new(EffortRater::new(
        Arc::new(FixedLlmClient::new(trivial_response(2))),
        "gpt-4o-mini",
    ));
    let service = FairnessService::new(&config, rater);

    let start = project_start();
    let commits: Vec<Commit> = (0..6)
        .map(|i| commit_at(&format!("a{i}"), "a@team.com", 40, start + Duration::days(i)))
        .collect();
    let git = FakeGit { commits };
    let ctx = team_ctx(2, &["a@team.com", "b@team.com"]);

    let report = service
        .analyze(&git, "base", "head", &HashMap::new(), &ctx)
        .unwrap();
    assert!(report.flags.contains(&cqi_pipeline::models::FairnessFlag::HighTrivialRatio));
}
