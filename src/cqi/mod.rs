//! Aggregates per-author effort/LoC and combines five weighted components
//! plus a penalty model into a single 0-100 collaboration score.

pub mod gini;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::CqiWeightsConfig;
use crate::models::{
    AnalyzedChunk, CqiComponents, CqiResult, CqiWeights, EffortLabel, FilterSummary, Penalty,
    PenaltyKind,
};

const SOLO_SHARE_THRESHOLD: f64 = 0.85;
const SEVERE_IMBALANCE_THRESHOLD: f64 = 0.70;
const HIGH_TRIVIAL_RATIO_THRESHOLD: f64 = 0.50;
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;
const LOW_CONFIDENCE_SHARE_THRESHOLD: f64 = 0.40;
const LATE_WORK_WINDOW_FRACTION: f64 = 0.20;
const LATE_WORK_SHARE_THRESHOLD: f64 = 0.50;
const SIGNIFICANT_FILE_MIN_COMMITS: usize = 3;
const EFFECTIVE_TEAM_SIZE_CAP: usize = 4;

/// Pre-computed pair-programming result, supplied by the caller since it
/// depends on attendance data outside the rated chunks.
#[derive(Debug, Clone)]
pub struct PairProgrammingInput {
    pub score: f64,
    pub covered_sessions: usize,
    pub total_sessions: usize,
}

pub struct CqiInputs<'a> {
    pub rated_chunks: &'a [AnalyzedChunk],
    pub team_size: usize,
    pub project_start: DateTime<Utc>,
    pub project_end: DateTime<Utc>,
    pub filter_summary: Option<FilterSummary>,
    pub team_known: bool,
    pub pair_programming: Option<PairProgrammingInput>,
}

fn author_key(chunk: &AnalyzedChunk) -> String {
    chunk
        .chunk
        .author_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| chunk.chunk.author_email.clone())
}

fn zero_result(weights: &CqiWeightsConfig, filter_summary: Option<FilterSummary>) -> CqiResult {
    CqiResult {
        cqi: 0.0,
        components: CqiComponents {
            effort_balance: 0.0,
            loc_balance: 0.0,
            temporal_spread: 0.0,
            ownership_spread: 0.0,
            pair_programming: None,
        },
        weights: CqiWeights {
            effort: weights.effort,
            loc: weights.loc,
            temporal: weights.temporal,
            ownership: weights.ownership,
            pair_programming: None,
        },
        penalties: Vec::new(),
        base_score: 0.0,
        penalty_multiplier: 1.0,
        filter_summary,
    }
}

/// `calculate(ratedChunks, teamSize, projectStart, projectEnd, filterSummary?, teamName?) -> CQIResult`
pub fn calculate(
    inputs: &CqiInputs,
    weights: &CqiWeightsConfig,
    penalties_enabled: bool,
) -> CqiResult {
    if inputs.team_size <= 1 {
        return zero_result(weights, inputs.filter_summary.clone());
    }
    if inputs.rated_chunks.is_empty() {
        return zero_result(weights, inputs.filter_summary.clone());
    }
    if inputs.team_known {
        if let Some(pp) = &inputs.pair_programming {
            if pp.total_sessions > 0 && pp.covered_sessions < 2 {
                return zero_result(weights, inputs.filter_summary.clone());
            }
        }
    }

    let mut effort_by_author: HashMap<String, f64> = HashMap::new();
    let mut loc_by_author: HashMap<String, f64> = HashMap::new();
    for chunk in inputs.rated_chunks {
        let key = author_key(chunk);
        *effort_by_author.entry(key.clone()).or_insert(0.0) += chunk.rating.weighted_effort();
        *loc_by_author.entry(key).or_insert(0.0) += chunk.chunk.total_lines_changed() as f64;
    }

    if effort_by_author.len() <= 1 {
        return zero_result(weights, inputs.filter_summary.clone());
    }

    let effort_values: Vec<f64> = effort_by_author.values().copied().collect();
    let loc_values: Vec<f64> = loc_by_author.values().copied().collect();

    let effort_balance = 100.0 * (1.0 - gini::gini(&effort_values));
    let loc_balance = 100.0 * (1.0 - gini::gini(&loc_values));
    let temporal_spread = temporal_spread_score(inputs);
    let ownership_spread = ownership_spread_score(inputs);

    let mut base_score = weights.effort * effort_balance
        + weights.loc * loc_balance
        + weights.temporal * temporal_spread
        + weights.ownership * ownership_spread;

    let pair_component = inputs.pair_programming.as_ref().map(|pp| pp.score);
    let applied_weights = if pair_component.is_some() {
        base_score += weights.pair_programming * pair_component.unwrap();
        CqiWeights {
            effort: weights.effort,
            loc: weights.loc,
            temporal: weights.temporal,
            ownership: weights.ownership,
            pair_programming: Some(weights.pair_programming),
        }
    } else {
        CqiWeights {
            effort: weights.effort,
            loc: weights.loc,
            temporal: weights.temporal,
            ownership: weights.ownership,
            pair_programming: None,
        }
    };

    let total_effort: f64 = effort_values.iter().sum();
    let penalties = compute_penalties(inputs, &effort_by_author, total_effort);
    let penalty_multiplier = penalties.iter().fold(1.0, |acc, p| acc * p.multiplier);

    let effective_multiplier = if penalties_enabled { penalty_multiplier } else { 1.0 };
    let cqi = (base_score * effective_multiplier).clamp(0.0, 100.0);

    CqiResult {
        cqi,
        components: CqiComponents {
            effort_balance,
            loc_balance,
            temporal_spread,
            ownership_spread,
            pair_programming: pair_component,
        },
        weights: applied_weights,
        penalties,
        base_score,
        penalty_multiplier,
        filter_summary: inputs.filter_summary.clone(),
    }
}

fn temporal_spread_score(inputs: &CqiInputs) -> f64 {
    let days = (inputs.project_end - inputs.project_start).num_days().max(1);
    let bucket_count = ((days as f64) / 7.0).ceil().max(1.0) as i64;
    let bucket_span = (inputs.project_end - inputs.project_start) / bucket_count.max(1) as i32;
    if bucket_span.num_seconds() <= 0 {
        return 50.0;
    }

    let mut buckets = vec![0.0_f64; bucket_count as usize];
    for chunk in inputs.rated_chunks {
        let offset = chunk.chunk.timestamp - inputs.project_start;
        let bucket_index = (offset.num_seconds() / bucket_span.num_seconds().max(1))
            .clamp(0, bucket_count - 1) as usize;
        buckets[bucket_index] += chunk.rating.weighted_effort();
    }

    let mean = buckets.iter().sum::<f64>() / buckets.len() as f64;
    if mean <= 0.0 {
        return 50.0;
    }
    let variance =
        buckets.iter().map(|b| (b - mean).powi(2)).sum::<f64>() / buckets.len() as f64;
    let stdev = variance.sqrt();
    let cv = stdev / mean;
    100.0 * (1.0 - cv.min(2.0) / 2.0).clamp(0.0, 1.0)
}

fn ownership_spread_score(inputs: &CqiInputs) -> f64 {
    let mut file_authors: HashMap<&str, HashSet<String>> = HashMap::new();
    let mut file_sha_pairs: HashSet<(&str, &str)> = HashSet::new();
    let mut file_commit_counts: HashMap<&str, usize> = HashMap::new();

    for chunk in inputs.rated_chunks {
        let author = author_key(chunk);
        for file in &chunk.chunk.files {
            file_authors
                .entry(file.path.as_str())
                .or_default()
                .insert(author.clone());
            if file_sha_pairs.insert((file.path.as_str(), chunk.chunk.sha.as_str())) {
                *file_commit_counts.entry(file.path.as_str()).or_insert(0) += 1;
            }
        }
    }

    let significant_files: Vec<&str> = file_commit_counts
        .iter()
        .filter(|(_, count)| **count >= SIGNIFICANT_FILE_MIN_COMMITS)
        .map(|(path, _)| *path)
        .collect();

    if significant_files.is_empty() {
        return 75.0;
    }

    let effective_team_size = inputs.team_size.min(EFFECTIVE_TEAM_SIZE_CAP);
    let numerator: usize = significant_files
        .iter()
        .map(|f| file_authors.get(f).map(|a| a.len()).unwrap_or(0).min(effective_team_size.max(1)))
        .sum();
    let denominator = significant_files.len() * EFFECTIVE_TEAM_SIZE_CAP;
    100.0 * numerator as f64 / denominator as f64
}

fn compute_penalties(
    inputs: &CqiInputs,
    effort_by_author: &HashMap<String, f64>,
    total_effort: f64,
) -> Vec<Penalty> {
    let mut penalties = Vec::new();
    if total_effort <= 0.0 {
        return penalties;
    }

    let max_share = effort_by_author
        .values()
        .map(|v| v / total_effort)
        .fold(0.0_f64, f64::max);

    let mut solo = false;
    if max_share > SOLO_SHARE_THRESHOLD {
        solo = true;
        penalties.push(Penalty {
            kind: PenaltyKind::SoloDevelopment,
            multiplier: 0.0,
            reason: format!("one author carried {:.0}% of effort", max_share * 100.0),
        });
    }
    if !solo && max_share > SEVERE_IMBALANCE_THRESHOLD {
        penalties.push(Penalty {
            kind: PenaltyKind::SevereImbalance,
            multiplier: 0.7,
            reason: format!("one author carried {:.0}% of effort", max_share * 100.0),
        });
    }

    let total = inputs.rated_chunks.len();
    let trivial_count = inputs
        .rated_chunks
        .iter()
        .filter(|c| c.rating.label == EffortLabel::Trivial)
        .count();
    if total > 0 && trivial_count as f64 / total as f64 > HIGH_TRIVIAL_RATIO_THRESHOLD {
        penalties.push(Penalty {
            kind: PenaltyKind::HighTrivial,
            multiplier: 0.85,
            reason: "majority of chunks rated trivial".to_string(),
        });
    }

    let low_confidence_count = inputs
        .rated_chunks
        .iter()
        .filter(|c| c.rating.confidence < LOW_CONFIDENCE_THRESHOLD)
        .count();
    if total > 0 && low_confidence_count as f64 / total as f64 > LOW_CONFIDENCE_SHARE_THRESHOLD {
        penalties.push(Penalty {
            kind: PenaltyKind::LowConfidence,
            multiplier: 0.9,
            reason: "many ratings had low model confidence".to_string(),
        });
    }

    let period = inputs.project_end - inputs.project_start;
    let late_window_span = chrono::Duration::seconds(
        (period.num_seconds() as f64 * LATE_WORK_WINDOW_FRACTION) as i64,
    );
    let late_window_start = inputs.project_end - late_window_span;
    let late_effort: f64 = inputs
        .rated_chunks
        .iter()
        .filter(|c| c.chunk.timestamp >= late_window_start)
        .map(|c| c.rating.weighted_effort())
        .sum();
    if total_effort > 0.0 && late_effort / total_effort > LATE_WORK_SHARE_THRESHOLD {
        penalties.push(Penalty {
            kind: PenaltyKind::LateWork,
            multiplier: 0.8,
            reason: "over half of effort landed in the final 20% of the period".to_string(),
        });
    }

    penalties
}

/// Used when the LLM is unavailable: LoC balance alone.
pub fn calculate_fallback(
    chunks: &[crate::models::Chunk],
    team_size: usize,
    filter_summary: Option<FilterSummary>,
) -> CqiResult {
    if team_size <= 1 || chunks.is_empty() {
        return zero_result(&CqiWeightsConfig::default(), filter_summary);
    }
    let mut loc_by_author: HashMap<String, f64> = HashMap::new();
    for chunk in chunks {
        let key = chunk
            .author_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| chunk.author_email.clone());
        *loc_by_author.entry(key).or_insert(0.0) += chunk.total_lines_changed() as f64;
    }
    let loc_balance = 100.0 * (1.0 - gini::gini(&loc_by_author.values().copied().collect::<Vec<_>>()));
    CqiResult {
        cqi: loc_balance,
        components: CqiComponents {
            effort_balance: 0.0,
            loc_balance,
            temporal_spread: 0.0,
            ownership_spread: 0.0,
            pair_programming: None,
        },
        weights: CqiWeights {
            effort: 0.0,
            loc: 1.0,
            temporal: 0.0,
            ownership: 0.0,
            pair_programming: None,
        },
        penalties: Vec::new(),
        base_score: loc_balance,
        penalty_multiplier: 1.0,
        filter_summary,
    }
}

/// `calculateGitOnlyComponents` equivalent: LoC/Temporal/Ownership computed
/// straight from raw chunks, with Effort Balance forced to zero since no
/// rating exists yet. Used to stream a partial score to a client while the
/// rater is still working through a team's chunks.
pub fn calculate_git_only(
    chunks: &[crate::models::Chunk],
    team_size: usize,
    project_start: DateTime<Utc>,
    project_end: DateTime<Utc>,
    filter_summary: Option<FilterSummary>,
    pair_programming: Option<PairProgrammingInput>,
) -> CqiResult {
    let weights = CqiWeightsConfig::default();
    if team_size <= 1 || chunks.is_empty() {
        return zero_result(&weights, filter_summary);
    }

    let mut loc_by_author: HashMap<String, f64> = HashMap::new();
    for chunk in chunks {
        let key = chunk
            .author_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| chunk.author_email.clone());
        *loc_by_author.entry(key).or_insert(0.0) += chunk.total_lines_changed() as f64;
    }
    if loc_by_author.len() <= 1 {
        return zero_result(&weights, filter_summary);
    }

    let loc_balance =
        100.0 * (1.0 - gini::gini(&loc_by_author.values().copied().collect::<Vec<_>>()));
    let temporal_spread = git_only_temporal_spread(chunks, project_start, project_end);
    let ownership_spread = git_only_ownership_spread(chunks, team_size);

    let mut base_score = weights.loc * loc_balance
        + weights.temporal * temporal_spread
        + weights.ownership * ownership_spread;

    let pair_component = pair_programming.as_ref().map(|pp| pp.score);
    let applied_weights = if pair_component.is_some() {
        base_score += weights.pair_programming * pair_component.unwrap();
        CqiWeights {
            effort: weights.effort,
            loc: weights.loc,
            temporal: weights.temporal,
            ownership: weights.ownership,
            pair_programming: Some(weights.pair_programming),
        }
    } else {
        CqiWeights {
            effort: weights.effort,
            loc: weights.loc,
            temporal: weights.temporal,
            ownership: weights.ownership,
            pair_programming: None,
        }
    };

    CqiResult {
        cqi: base_score.clamp(0.0, 100.0),
        components: CqiComponents {
            effort_balance: 0.0,
            loc_balance,
            temporal_spread,
            ownership_spread,
            pair_programming: pair_component,
        },
        weights: applied_weights,
        penalties: Vec::new(),
        base_score,
        penalty_multiplier: 1.0,
        filter_summary,
    }
}

fn git_only_temporal_spread(
    chunks: &[crate::models::Chunk],
    project_start: DateTime<Utc>,
    project_end: DateTime<Utc>,
) -> f64 {
    let days = (project_end - project_start).num_days().max(1);
    let bucket_count = ((days as f64) / 7.0).ceil().max(1.0) as i64;
    let bucket_span = (project_end - project_start) / bucket_count.max(1) as i32;
    if bucket_span.num_seconds() <= 0 {
        return 50.0;
    }

    let mut buckets = vec![0.0_f64; bucket_count as usize];
    for chunk in chunks {
        let offset = chunk.timestamp - project_start;
        let bucket_index = (offset.num_seconds() / bucket_span.num_seconds().max(1))
            .clamp(0, bucket_count - 1) as usize;
        buckets[bucket_index] += chunk.total_lines_changed() as f64;
    }

    let mean = buckets.iter().sum::<f64>() / buckets.len() as f64;
    if mean <= 0.0 {
        return 50.0;
    }
    let variance = buckets.iter().map(|b| (b - mean).powi(2)).sum::<f64>() / buckets.len() as f64;
    let stdev = variance.sqrt();
    let cv = stdev / mean;
    100.0 * (1.0 - cv.min(2.0) / 2.0).clamp(0.0, 1.0)
}

fn git_only_ownership_spread(chunks: &[crate::models::Chunk], team_size: usize) -> f64 {
    let mut file_authors: HashMap<&str, HashSet<String>> = HashMap::new();
    let mut file_sha_pairs: HashSet<(&str, &str)> = HashSet::new();
    let mut file_commit_counts: HashMap<&str, usize> = HashMap::new();

    for chunk in chunks {
        let author = chunk
            .author_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| chunk.author_email.clone());
        for file in &chunk.files {
            file_authors
                .entry(file.path.as_str())
                .or_default()
                .insert(author.clone());
            if file_sha_pairs.insert((file.path.as_str(), chunk.sha.as_str())) {
                *file_commit_counts.entry(file.path.as_str()).or_insert(0) += 1;
            }
        }
    }

    let significant_files: Vec<&str> = file_commit_counts
        .iter()
        .filter(|(_, count)| **count >= SIGNIFICANT_FILE_MIN_COMMITS)
        .map(|(path, _)| *path)
        .collect();

    if significant_files.is_empty() {
        return 75.0;
    }

    let effective_team_size = team_size.min(EFFECTIVE_TEAM_SIZE_CAP);
    let numerator: usize = significant_files
        .iter()
        .map(|f| {
            file_authors
                .get(f)
                .map(|a| a.len())
                .unwrap_or(0)
                .min(effective_team_size.max(1))
        })
        .sum();
    let denominator = significant_files.len() * EFFECTIVE_TEAM_SIZE_CAP;
    100.0 * numerator as f64 / denominator as f64
}
