//! Drops chunks that cannot carry signal before they reach the rater.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Chunk, FilterSummary};

/// Reason a chunk was dropped before rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Empty,
    MergeCommit,
    RevertCommit,
    GeneratedFilesOnly,
    RenameOnly,
    FormatOnly,
    MassReformat,
    TrivialMessage,
    SmallTrivialCommit,
}

pub struct PreFilterResult {
    pub chunks_to_analyze: Vec<Chunk>,
    pub filtered_chunks: Vec<(Chunk, FilterReason)>,
    pub summary: FilterSummary,
}

const GENERATED_FILE_GLOBS: &[&str] = &[
    "*-lock.json",
    "yarn.lock",
    "*.lock",
    "Cargo.lock",
    "go.sum",
    "*.min.js",
    "*.min.css",
    "dist/*",
    "build/*",
    "target/*",
    "node_modules/*",
];

static MERGE_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(merge branch|merge pull request|merge remote-tracking|merge '|merged )")
        .unwrap()
});
static REVERT_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^revert|this reverts commit").unwrap());
static RENAME_MESSAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(rename|move|renamed)\b").unwrap());
static FORMAT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(format|formatting|prettier|eslint|checkstyle|spotless|black|indent|whitespace|style)\b")
        .unwrap()
});
static TRIVIAL_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^([[:punct:]]|wip|temp|test|oops|stuff|changes|init|initial commit|first commit|typos?|fix typo|fix lint|fix nit|nit|lint|chore\(deps\)|\[bot\]|auto-format|update dependencies)$",
    )
    .unwrap()
});

fn glob_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path.starts_with(prefix) && path[prefix.len()..].starts_with('/');
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return path.ends_with(suffix);
    }
    path == pattern
}

fn is_generated_file(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| glob_matches(p, path))
}

fn is_trivial_message(message: &str) -> bool {
    TRIVIAL_MESSAGE.is_match(message.trim())
}

fn classify(chunk: &Chunk, generated_patterns: &[String]) -> Option<FilterReason> {
    if chunk.lines_added == 0 && chunk.lines_deleted == 0 {
        return Some(FilterReason::Empty);
    }
    if MERGE_MESSAGE.is_match(&chunk.message) {
        return Some(FilterReason::MergeCommit);
    }
    if REVERT_MESSAGE.is_match(&chunk.message) {
        return Some(FilterReason::RevertCommit);
    }
    if !chunk.files.is_empty()
        && chunk
            .files
            .iter()
            .all(|f| is_generated_file(&f.path, generated_patterns))
    {
        return Some(FilterReason::GeneratedFilesOnly);
    }
    if RENAME_MESSAGE.is_match(&chunk.message) && chunk.total_lines_changed() <= 5 {
        return Some(FilterReason::RenameOnly);
    }
    if FORMAT_TOKEN.is_match(&chunk.message) {
        return Some(FilterReason::FormatOnly);
    }
    let file_count = chunk.files.len() as u32;
    if file_count >= 10 {
        let mean = chunk.total_lines_changed() as f64 / file_count as f64;
        if mean <= 3.0 && FORMAT_TOKEN.is_match(&chunk.message) {
            return Some(FilterReason::MassReformat);
        }
    }
    if is_trivial_message(&chunk.message) {
        return Some(FilterReason::TrivialMessage);
    }
    if chunk.total_lines_changed() <= 5 && is_trivial_message(&chunk.message) {
        return Some(FilterReason::SmallTrivialCommit);
    }
    None
}

/// Runs the ordered classifier tests over every chunk; the first matching
/// reason wins.
pub fn pre_filter(chunks: Vec<Chunk>, generated_patterns: &[String]) -> PreFilterResult {
    let mut chunks_to_analyze = Vec::new();
    let mut filtered_chunks = Vec::new();
    let mut summary = FilterSummary::default();

    for chunk in chunks {
        match classify(&chunk, generated_patterns) {
            None => chunks_to_analyze.push(chunk),
            Some(reason) => {
                match reason {
                    FilterReason::Empty => summary.empty += 1,
                    FilterReason::MergeCommit => summary.merge_commit += 1,
                    FilterReason::RevertCommit => summary.revert_commit += 1,
                    FilterReason::GeneratedFilesOnly => summary.generated_files_only += 1,
                    FilterReason::RenameOnly => summary.rename_only += 1,
                    FilterReason::FormatOnly => summary.format_only += 1,
                    FilterReason::MassReformat => summary.mass_reformat += 1,
                    FilterReason::TrivialMessage => summary.trivial_message += 1,
                    FilterReason::SmallTrivialCommit => summary.small_trivial_commit += 1,
                }
                filtered_chunks.push((chunk, reason));
            }
        }
    }

    PreFilterResult {
        chunks_to_analyze,
        filtered_chunks,
        summary,
    }
}

pub fn default_generated_patterns() -> Vec<String> {
    GENERATED_FILE_GLOBS.iter().map(|s| s.to_string()).collect()
}
