//! Computes the fraction of paired class sessions where both members of a
//! two-person team committed.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::Commit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairProgrammingStatus {
    NotApplicable,
    NotFound,
    Found,
}

#[derive(Debug, Clone)]
pub struct PairProgrammingResult {
    pub status: PairProgrammingStatus,
    pub score: Option<f64>,
}

fn normalize_name(name: &str) -> String {
    name.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim()
        .to_string()
}

fn commit_dates_by_author(commits: &[Commit]) -> std::collections::HashMap<String, HashSet<NaiveDate>> {
    let mut map: std::collections::HashMap<String, HashSet<NaiveDate>> =
        std::collections::HashMap::new();
    for commit in commits {
        let key = normalize_name(&commit.author_email);
        map.entry(key).or_default().insert(commit.timestamp.date_naive());
    }
    map
}

/// `team_size` must be 2 for a score to be computed; otherwise returns
/// [`PairProgrammingStatus::NotApplicable`].
pub fn calculate(
    team_size: usize,
    author_a: &str,
    author_b: &str,
    paired_session_dates: &[DateTime<Utc>],
    schedule_known: bool,
    commits: &[Commit],
) -> PairProgrammingResult {
    if team_size != 2 {
        return PairProgrammingResult {
            status: PairProgrammingStatus::NotApplicable,
            score: None,
        };
    }
    if !schedule_known {
        return PairProgrammingResult {
            status: PairProgrammingStatus::NotFound,
            score: None,
        };
    }
    if paired_session_dates.is_empty() {
        return PairProgrammingResult {
            status: PairProgrammingStatus::Found,
            score: Some(0.0),
        };
    }

    let dates_by_author = commit_dates_by_author(commits);
    let a_key = normalize_name(author_a);
    let b_key = normalize_name(author_b);
    let empty = HashSet::new();
    let a_dates = dates_by_author.get(&a_key).unwrap_or(&empty);
    let b_dates = dates_by_author.get(&b_key).unwrap_or(&empty);

    let covered = paired_session_dates
        .iter()
        .filter(|d| {
            let date = d.date_naive();
            a_dates.contains(&date) && b_dates.contains(&date)
        })
        .count();

    let score = 100.0 * covered as f64 / paired_session_dates.len() as f64;
    PairProgrammingResult {
        status: PairProgrammingStatus::Found,
        score: Some(score),
    }
}
