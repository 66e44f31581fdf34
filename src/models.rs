//! Core data model for the collaboration analysis pipeline.
//!
//! These types flow commit -> chunk -> rating -> report; each is produced by
//! exactly one pipeline stage and handed immutably to the next.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file touched by a commit, with line-level diff stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub added_lines: u32,
    pub deleted_lines: u32,
    pub diff_text: String,
}

impl FileChange {
    pub fn total_lines(&self) -> u32 {
        self.added_lines + self.deleted_lines
    }
}

/// A commit read from git history, before bundling or splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub author_id: Option<i64>,
    pub author_email: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<FileChange>,
    pub is_merge: bool,
    pub is_rename_only: bool,
    pub is_format_only: bool,
}

impl Commit {
    pub fn lines_added(&self) -> u32 {
        self.files.iter().map(|f| f.added_lines).sum()
    }

    pub fn lines_deleted(&self) -> u32 {
        self.files.iter().map(|f| f.deleted_lines).sum()
    }

    pub fn total_lines_changed(&self) -> u32 {
        self.lines_added() + self.lines_deleted()
    }
}

/// A unit of commit content sent to the rater: either a bundled group of
/// small commits, or a slice of one large commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub sha: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub author_id: Option<i64>,
    pub author_email: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<FileChange>,
    pub diff_text: String,
    pub lines_added: u32,
    pub lines_deleted: u32,
    pub is_bundled: bool,
    pub bundled_shas: Vec<String>,
}

impl Chunk {
    pub fn total_lines_changed(&self) -> u32 {
        self.lines_added + self.lines_deleted
    }
}

/// A commit classification label produced by the effort rater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffortLabel {
    Feature,
    BugFix,
    Test,
    Refactor,
    Trivial,
}

/// The rating produced for a single chunk, whether by the model or by a
/// recovered failure path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffortRating {
    pub effort_score: f64,
    pub complexity: f64,
    pub novelty: f64,
    pub label: EffortLabel,
    pub confidence: f64,
    pub reasoning: String,
    pub is_error: bool,
    pub error_message: Option<String>,
}

impl EffortRating {
    pub fn disabled() -> Self {
        Self {
            effort_score: 5.0,
            complexity: 5.0,
            novelty: 5.0,
            label: EffortLabel::Trivial,
            confidence: 0.0,
            reasoning: "AI disabled".to_string(),
            is_error: false,
            error_message: None,
        }
    }

    pub fn trivial(reason: impl Into<String>) -> Self {
        Self {
            effort_score: 1.0,
            complexity: 1.0,
            novelty: 1.0,
            label: EffortLabel::Trivial,
            confidence: 0.0,
            reasoning: reason.into(),
            is_error: false,
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            effort_score: 0.0,
            complexity: 0.0,
            novelty: 0.0,
            label: EffortLabel::Trivial,
            confidence: 0.0,
            reasoning: "analysis error".to_string(),
            is_error: true,
            error_message: Some(message),
        }
    }

    /// `effortScore x (0.5 + 0.3*complexity/10 + 0.2*novelty/10)`, bounded to `[0,10]`.
    pub fn weighted_effort(&self) -> f64 {
        let weighted =
            self.effort_score * (0.5 + 0.3 * self.complexity / 10.0 + 0.2 * self.novelty / 10.0);
        weighted.clamp(0.0, 10.0)
    }
}

/// Token accounting for a single LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub usage_available: bool,
}

impl TokenUsage {
    pub fn unavailable(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            usage_available: false,
        }
    }
}

/// Accumulated token usage across many calls. A monoid under [`TokenTotals::merge`]:
/// associative, with the all-zero value as identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenTotals {
    pub llm_calls: u64,
    pub calls_with_usage: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenTotals {
    pub fn merge(&self, other: &TokenTotals) -> TokenTotals {
        TokenTotals {
            llm_calls: self.llm_calls + other.llm_calls,
            calls_with_usage: self.calls_with_usage + other.calls_with_usage,
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }

    pub fn record(&mut self, usage: &TokenUsage) {
        self.llm_calls += 1;
        if usage.usage_available {
            self.calls_with_usage += 1;
            self.prompt_tokens += usage.prompt_tokens;
            self.completion_tokens += usage.completion_tokens;
            self.total_tokens += usage.total_tokens;
        }
    }
}

/// A chunk after rating: the unit the CQI calculator consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedChunk {
    pub chunk: Chunk,
    pub rating: EffortRating,
    pub is_external_contributor: bool,
    pub usage: TokenUsage,
}

/// A flag raised on a team's fairness report, driving manual-review routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FairnessFlag {
    LateWorkConcentration,
    SoloContributor,
    UnevenDistribution,
    HighTrivialRatio,
    LowConfidenceRatings,
    AnalysisError,
}

/// Counts of commits filtered out before rating, by reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSummary {
    pub empty: u32,
    pub merge_commit: u32,
    pub revert_commit: u32,
    pub generated_files_only: u32,
    pub rename_only: u32,
    pub format_only: u32,
    pub mass_reformat: u32,
    pub trivial_message: u32,
    pub small_trivial_commit: u32,
}

/// A weighted-component breakdown of a CQI score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CqiComponents {
    pub effort_balance: f64,
    pub loc_balance: f64,
    pub temporal_spread: f64,
    pub ownership_spread: f64,
    pub pair_programming: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CqiWeights {
    pub effort: f64,
    pub loc: f64,
    pub temporal: f64,
    pub ownership: f64,
    pub pair_programming: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenaltyKind {
    SoloDevelopment,
    SevereImbalance,
    HighTrivial,
    LowConfidence,
    LateWork,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Penalty {
    pub kind: PenaltyKind,
    pub multiplier: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CqiResult {
    pub cqi: f64,
    pub components: CqiComponents,
    pub weights: CqiWeights,
    pub penalties: Vec<Penalty>,
    pub base_score: f64,
    pub penalty_multiplier: f64,
    pub filter_summary: Option<FilterSummary>,
}

/// Full per-team result: balance, flags, per-author breakdown, and the CQI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessReport {
    pub team_id: String,
    pub balance_score: f64,
    pub effort_by_author: BTreeMap<String, f64>,
    pub effort_share_by_author: BTreeMap<String, f64>,
    pub flags: Vec<FairnessFlag>,
    pub requires_manual_review: bool,
    pub author_details: BTreeMap<String, AuthorDetail>,
    pub analysis_metadata: AnalysisMetadata,
    pub analyzed_chunks: Vec<AnalyzedChunk>,
    pub cqi_result: CqiResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorDetail {
    pub chunk_count: u32,
    pub lines_added: u32,
    pub lines_deleted: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analyzed_at: DateTime<Utc>,
    pub token_totals: TokenTotals,
}

/// Per-exercise lifecycle state. See the transition graph in the state
/// machine module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    Idle,
    Running,
    Paused,
    Done,
    Error,
}

/// Orchestrator-visible label on the current per-team stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStage {
    Downloading,
    GitAnalyzing,
    AiAnalyzing,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub state: AnalysisState,
    pub total_teams: u32,
    pub processed_teams: u32,
    pub current_team_name: Option<String>,
    pub current_stage: Option<AnalysisStage>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl AnalysisStatus {
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            state: AnalysisState::Idle,
            total_teams: 0,
            processed_teams: 0,
            current_team_name: None,
            current_stage: None,
            started_at: None,
            last_updated_at: now,
            error_message: None,
        }
    }
}

/// The final, persisted outcome for one team in one exercise run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResult {
    pub team_name: String,
    pub report: FairnessReport,
}
