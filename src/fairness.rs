//! Binds loader → chunker → prefilter → rater → calculator for one team,
//! producing a [`FairnessReport`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};

use crate::chunker::chunk_commits;
use crate::config::Config;
use crate::cqi::{self, CqiInputs, PairProgrammingInput};
use crate::git::{GitError, GitOps};
use crate::models::{
    AnalysisMetadata, AnalyzedChunk, AuthorDetail, Chunk, FairnessFlag, FairnessReport,
    FilterSummary, TokenTotals,
};
use crate::pair_programming::{self, PairProgrammingStatus};
use crate::prefilter::pre_filter;
use crate::rater::EffortRater;

const HIGH_TRIVIAL_RATIO: f64 = 0.5;
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;
const LOW_CONFIDENCE_RATIO: f64 = 0.4;
const SOLO_SHARE: f64 = 0.85;
const UNEVEN_SHARE: f64 = 0.70;

#[derive(Debug, thiserror::Error)]
pub enum FairnessError {
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Static per-team facts the service needs besides git history.
pub struct TeamContext {
    pub team_id: String,
    pub team_size: usize,
    pub team_member_emails: HashSet<String>,
    pub project_start: DateTime<Utc>,
    pub project_end: DateTime<Utc>,
    /// Present only for two-person teams with a known tutorial schedule.
    pub pair_programming_schedule: Option<PairScheduleContext>,
}

pub struct PairScheduleContext {
    pub author_a_email: String,
    pub author_b_email: String,
    pub paired_session_dates: Vec<DateTime<Utc>>,
}

pub struct FairnessService<'a> {
    config: &'a Config,
    rater: Arc<EffortRater>,
}

impl<'a> FairnessService<'a> {
    pub fn new(config: &'a Config, rater: Arc<EffortRater>) -> Self {
        Self { config, rater }
    }

    /// Runs the full pipeline for one team against an already-resolved
    /// commit range.
    pub fn analyze<G: GitOps>(
        &self,
        git: &G,
        base_sha: &str,
        head_sha: &str,
        authors: &HashMap<String, i64>,
        ctx: &TeamContext,
    ) -> Result<FairnessReport, FairnessError> {
        let commits = git.read_commits(base_sha, head_sha, authors)?;
        let chunks = chunk_commits(&commits, &self.config.chunker);
        let pre_filtered = pre_filter(chunks, &self.config.prefilter_generated_file_patterns);

        let analyzed = self.rate_in_parallel(pre_filtered.chunks_to_analyze, ctx);

        let pair_result = ctx.pair_programming_schedule.as_ref().map(|sched| {
            let result = pair_programming::calculate(
                ctx.team_size,
                &sched.author_a_email,
                &sched.author_b_email,
                &sched.paired_session_dates,
                true,
                &commits,
            );
            (result, sched)
        });

        let pair_input = pair_result.as_ref().and_then(|(result, sched)| {
            if result.status != PairProgrammingStatus::Found {
                return None;
            }
            let covered = (result.score.unwrap_or(0.0) / 100.0
                * sched.paired_session_dates.len() as f64)
                .round() as usize;
            Some(PairProgrammingInput {
                score: result.score.unwrap_or(0.0),
                covered_sessions: covered,
                total_sessions: sched.paired_session_dates.len(),
            })
        });

        let cqi_inputs = CqiInputs {
            rated_chunks: &analyzed,
            team_size: ctx.team_size,
            project_start: ctx.project_start,
            project_end: ctx.project_end,
            filter_summary: Some(pre_filtered.summary.clone()),
            team_known: ctx.pair_programming_schedule.is_some(),
            pair_programming: pair_input,
        };
        let cqi_result = cqi::calculate(&cqi_inputs, &self.config.cqi_weights, self.config.cqi_penalties_enabled);

        Ok(self.build_report(ctx, analyzed, pre_filtered.summary, cqi_result))
    }

    fn rate_in_parallel(&self, chunks: Vec<Chunk>, ctx: &TeamContext) -> Vec<AnalyzedChunk> {
        let workers = self.config.ai_workers.max(1);
        let total = chunks.len();
        let results: Arc<Mutex<Vec<(usize, AnalyzedChunk)>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));

        for batch in chunks.into_iter().enumerate().collect::<Vec<_>>().chunks(workers) {
            let handles: Vec<_> = batch
                .iter()
                .map(|(position, chunk)| {
                    let rater = Arc::clone(&self.rater);
                    let results = Arc::clone(&results);
                    let chunk = chunk.clone();
                    let position = *position;
                    let is_external = !ctx.team_member_emails.contains(&chunk.author_email);

                    thread::spawn(move || {
                        let (rating, usage) = rater.rate(&chunk);
                        let analyzed = AnalyzedChunk {
                            chunk,
                            rating,
                            is_external_contributor: is_external,
                            usage,
                        };
                        results.lock().unwrap().push((position, analyzed));
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        }

        let mut ordered = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
        ordered.sort_by_key(|(position, _)| *position);
        ordered.into_iter().map(|(_, analyzed)| analyzed).collect()
    }

    fn build_report(
        &self,
        ctx: &TeamContext,
        analyzed: Vec<AnalyzedChunk>,
        filter_summary: FilterSummary,
        cqi_result: crate::models::CqiResult,
    ) -> FairnessReport {
        let mut effort_by_author: BTreeMap<String, f64> = BTreeMap::new();
        let mut author_details: BTreeMap<String, AuthorDetail> = BTreeMap::new();
        let mut token_totals = TokenTotals::default();

        for chunk in &analyzed {
            let key = chunk
                .chunk
                .author_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| chunk.chunk.author_email.clone());
            *effort_by_author.entry(key.clone()).or_insert(0.0) += chunk.rating.weighted_effort();
            let detail = author_details.entry(key).or_default();
            detail.chunk_count += 1;
            detail.lines_added += chunk.chunk.lines_added;
            detail.lines_deleted += chunk.chunk.lines_deleted;
            token_totals.record(&chunk.usage);
        }

        let total_effort: f64 = effort_by_author.values().sum();
        let effort_share_by_author: BTreeMap<String, f64> = effort_by_author
            .iter()
            .map(|(k, v)| (k.clone(), if total_effort > 0.0 { v / total_effort } else { 0.0 }))
            .collect();

        let flags = derive_flags(&analyzed, &effort_share_by_author, &cqi_result);
        let requires_manual_review = !flags.is_empty();

        FairnessReport {
            team_id: ctx.team_id.clone(),
            balance_score: cqi_result.components.effort_balance,
            effort_by_author,
            effort_share_by_author,
            flags,
            requires_manual_review,
            author_details,
            analysis_metadata: AnalysisMetadata {
                analyzed_at: Utc::now(),
                token_totals,
            },
            analyzed_chunks: analyzed,
            cqi_result,
        }
    }
}

fn derive_flags(
    analyzed: &[AnalyzedChunk],
    effort_share_by_author: &BTreeMap<String, f64>,
    cqi_result: &crate::models::CqiResult,
) -> Vec<FairnessFlag> {
    let mut flags = Vec::new();

    if analyzed.iter().any(|c| c.rating.is_error) {
        flags.push(FairnessFlag::AnalysisError);
    }

    let max_share = effort_share_by_author.values().copied().fold(0.0_f64, f64::max);
    if max_share > SOLO_SHARE {
        flags.push(FairnessFlag::SoloContributor);
    } else if max_share > UNEVEN_SHARE {
        flags.push(FairnessFlag::UnevenDistribution);
    }

    let total = analyzed.len();
    if total > 0 {
        let trivial = analyzed
            .iter()
            .filter(|c| c.rating.label == crate::models::EffortLabel::Trivial)
            .count();
        if trivial as f64 / total as f64 > HIGH_TRIVIAL_RATIO {
            flags.push(FairnessFlag::HighTrivialRatio);
        }

        let low_confidence = analyzed
            .iter()
            .filter(|c| c.rating.confidence < LOW_CONFIDENCE_THRESHOLD)
            .count();
        if low_confidence as f64 / total as f64 > LOW_CONFIDENCE_RATIO {
            flags.push(FairnessFlag::LowConfidenceRatings);
        }
    }

    if cqi_result
        .penalties
        .iter()
        .any(|p| p.kind == crate::models::PenaltyKind::LateWork)
    {
        flags.push(FairnessFlag::LateWorkConcentration);
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::test_support::FixedLlmClient;
    use crate::models::FileChange;
    use chrono::{Duration, TimeZone};

    struct FakeGit {
        commits: Vec<crate::models::Commit>,
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
        ) -> Result<Vec<crate::models::Commit>, GitError> {
            Ok(self.commits.clone())
        }
    }

    fn commit(sha: &str, author: &str, added: u32, day: i64) -> crate::models::Commit {
        crate::models::Commit {
            sha: sha.to_string(),
            author_id: Some(if author == "a@x.com" { 1 } else { 2 }),
            author_email: author.to_string(),
            message: "add feature work".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
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

    #[test]
    fn full_pipeline_produces_report_with_both_authors() {
        let config = Config::default();
        let response = r#"{"effortScore":7,"complexity":6,"novelty":5,"type":"FEATURE","confidence":0.9,"reasoning":"ok"}"#;
        let rater = Arc::new(EffortRater::new(Arc::new(FixedLlmClient::new(response)), "gpt-4o-mini"));
        let service = FairnessService::new(&config, rater);

        let git = FakeGit {
            commits: vec![
                commit("a1", "a@x.com", 40, 0),
                commit("b1", "b@x.com", 40, 1),
            ],
        };
        let ctx = TeamContext {
            team_id: "team-1".to_string(),
            team_size: 2,
            team_member_emails: ["a@x.com".to_string(), "b@x.com".to_string()].into_iter().collect(),
            project_start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            project_end: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            pair_programming_schedule: None,
        };

        let report = service.analyze(&git, "base", "head", &HashMap::new(), &ctx).unwrap();
        assert_eq!(report.effort_by_author.len(), 2);
        assert_eq!(report.analyzed_chunks.len(), 2);
        assert!(report.analysis_metadata.token_totals.llm_calls > 0);
    }

    #[test]
    fn external_contributor_is_tagged() {
        let config = Config::default();
        let response = r#"{"effortScore":3,"complexity":3,"novelty":3,"type":"TRIVIAL","confidence":0.9,"reasoning":"ok"}"#;
        let rater = Arc::new(EffortRater::new(Arc::new(FixedLlmClient::new(response)), "gpt-4o-mini"));
        let service = FairnessService::new(&config, rater);

        let git = FakeGit {
            commits: vec![commit("a1", "outsider@x.com", 40, 0)],
        };
        let ctx = TeamContext {
            team_id: "team-2".to_string(),
            team_size: 2,
            team_member_emails: ["a@x.com".to_string(), "b@x.com".to_string()].into_iter().collect(),
            project_start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            project_end: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            pair_programming_schedule: None,
        };

        let report = service.analyze(&git, "base", "head", &HashMap::new(), &ctx).unwrap();
        assert!(report.analyzed_chunks[0].is_external_contributor);
    }
}
