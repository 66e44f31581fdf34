//! Exercises [`cqi_pipeline::orchestrator::PipelineOrchestrator`] against a
//! real on-disk git repository, driving it through `Git`/`GitOps` rather
//! than a fake.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use cqi_pipeline::config::Config;
use cqi_pipeline::contracts::{
    FixedAttendanceSource, FixedEmailDirectory, FixedParticipationSource, InMemoryTeamResultStore,
    TeamParticipation, TeamResultStore,
};
use cqi_pipeline::llm::test_support::FixedLlmClient;
use cqi_pipeline::orchestrator::{AnalysisEvent, InMemoryEventSink, PipelineOrchestrator};
use cqi_pipeline::rater::EffortRater;
use cqi_pipeline::state_machine::{AnalysisStateMachine, InMemoryStatusStore};

struct TestRepo {
    path: PathBuf,
}

impl TestRepo {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("cqi-pipeline-test-{}-{}", name, std::process::id()));
        if path.exists() {
            let _ = fs::remove_dir_all(&path);
        }
        fs::create_dir_all(&path).unwrap();
        run(&path, &["init", "-b", "main"]);
        run(&path, &["config", "user.email", "test@example.com"]);
        run(&path, &["config", "user.name", "Test User"]);
        Self { path }
    }

    fn commit(&self, author_email: &str, file: &str, content: &str, message: &str) -> String {
        fs::write(self.path.join(file), content).unwrap();
        run(&self.path, &["add", "-A"]);
        run(
            &self.path,
            &["-c", &format!("user.email={}", author_email), "commit", "-m", message],
        );
        run(&self.path, &["rev-parse", "HEAD"]).trim().to_string()
    }

    fn root(&self) -> String {
        run(&self.path, &["rev-list", "--max-parents=0", "HEAD"])
            .trim()
            .to_string()
    }
}

impl Drop for TestRepo {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run(dir: &std::path::Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn orchestrator_for(
    repo: &TestRepo,
    participations: Vec<TeamParticipation>,
    team_result_store: Arc<InMemoryTeamResultStore>,
    event_sink: Arc<InMemoryEventSink>,
    cache_dir: PathBuf,
) -> PipelineOrchestrator<InMemoryStatusStore> {
    let _ = repo;
    let config = Arc::new(Config {
        git_cache_dir: cache_dir.to_string_lossy().to_string(),
        ..Config::default()
    });
    let response = r#"{"effortScore":6,"complexity":6,"novelty":6,"type":"FEATURE","confidence":0.9,"reasoning":"ok"}"#;
    let rater = Arc::new(EffortRater::new(Arc::new(FixedLlmClient::new(response)), "gpt-4o-mini"));

    PipelineOrchestrator::new(
        Arc::new(FixedParticipationSource { participations }),
        Arc::new(FixedAttendanceSource::default()),
        team_result_store,
        Arc::new(FixedEmailDirectory::default()),
        Arc::new(AnalysisStateMachine::new(InMemoryStatusStore::default())),
        event_sink,
        config,
        rater,
    )
}

/// Running analysis twice for the same exercise, with no new commits,
/// must not re-analyze a team it already has a stored result for, and
/// the second run is a clean no-op (Start{0} -> Done).
#[test]
fn second_run_skips_already_analyzed_team() {
    let repo = TestRepo::new("resume");
    repo.commit("a@team.com", "a.rs", "fn a() {}\n", "add a");
    let head = repo.commit("b@team.com", "b.rs", "fn b() {}\n", "add b");
    let root = repo.root();

    let participation = TeamParticipation {
        team_name: "team-resume".to_string(),
        repository_uri: repo.path.to_string_lossy().to_string(),
        member_emails: vec!["a@team.com".to_string(), "b@team.com".to_string()],
        base_ref: root,
        head_ref: head,
    };

    let cache_root = std::env::temp_dir().join(format!("cqi-pipeline-cache-{}", std::process::id()));
    let _ = fs::remove_dir_all(&cache_root);
    let team_result_store = Arc::new(InMemoryTeamResultStore::default());

    let sink1 = Arc::new(InMemoryEventSink::default());
    let orchestrator1 = orchestrator_for(
        &repo,
        vec![participation.clone()],
        Arc::clone(&team_result_store),
        Arc::clone(&sink1),
        cache_root.clone(),
    );
    orchestrator1.run_exercise("ex-resume").unwrap();

    let first_events = sink1.events();
    assert!(matches!(first_events[0], AnalysisEvent::Start { total: 1 }));
    assert!(first_events
        .iter()
        .any(|e| matches!(e, AnalysisEvent::Update { .. })));
    assert_eq!(
        team_result_store.all("ex-resume").unwrap().len(),
        1,
        "exactly one team result should be stored after the first run"
    );

    let sink2 = Arc::new(InMemoryEventSink::default());
    let orchestrator2 = orchestrator_for(
        &repo,
        vec![participation],
        Arc::clone(&team_result_store),
        Arc::clone(&sink2),
        cache_root.clone(),
    );
    orchestrator2.run_exercise("ex-resume").unwrap();

    let second_events = sink2.events();
    assert!(
        matches!(second_events[0], AnalysisEvent::Start { total: 0 }),
        "an already-analyzed team must not be re-queued"
    );
    assert!(!second_events
        .iter()
        .any(|e| matches!(e, AnalysisEvent::Update { .. })));
    assert_eq!(
        team_result_store.all("ex-resume").unwrap().len(),
        1,
        "a team must never be counted twice across resumed runs"
    );

    let _ = fs::remove_dir_all(&cache_root);
}
