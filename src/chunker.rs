//! Bundles small same-author commits and splits oversize commits into
//! chunks the rater can consume.

use crate::config::ChunkerConfig;
use crate::models::{Chunk, Commit, FileChange};

/// Bundle small commits, then split the result into ≤`max_chunk_lines` chunks.
pub fn chunk_commits(commits: &[Commit], config: &ChunkerConfig) -> Vec<Chunk> {
    let bundled = bundle_small_commits(commits, config);
    bundled
        .into_iter()
        .flat_map(|(commit, is_bundled, bundled_shas)| {
            split_commit(&commit, is_bundled, bundled_shas, config)
        })
        .collect()
}

fn is_small(commit: &Commit, config: &ChunkerConfig) -> bool {
    commit.total_lines_changed() <= config.bundle_max_lines
}

/// Walks commits in order, merging consecutive small same-author commits
/// within the bundling window into one synthetic commit each.
fn bundle_small_commits(
    commits: &[Commit],
    config: &ChunkerConfig,
) -> Vec<(Commit, bool, Vec<String>)> {
    let mut out = Vec::new();
    let mut bundle: Vec<&Commit> = Vec::new();

    let flush = |bundle: &mut Vec<&Commit>, out: &mut Vec<(Commit, bool, Vec<String>)>| {
        if bundle.is_empty() {
            return;
        }
        if bundle.len() == 1 {
            out.push((bundle[0].clone(), false, Vec::new()));
        } else {
            out.push(merge_bundle(bundle));
        }
        bundle.clear();
    };

    for commit in commits {
        if !is_small(commit, config) {
            flush(&mut bundle, &mut out);
            out.push((commit.clone(), false, Vec::new()));
            continue;
        }

        let joins = match bundle.last() {
            None => true,
            Some(last) => {
                last.author_id == commit.author_id
                    && last.author_email == commit.author_email
                    && (commit.timestamp - last.timestamp).num_minutes()
                        <= config.bundle_window_min
            }
        };

        if !joins {
            flush(&mut bundle, &mut out);
        }
        bundle.push(commit);
    }
    flush(&mut bundle, &mut out);

    out
}

fn merge_bundle(bundle: &[&Commit]) -> (Commit, bool, Vec<String>) {
    let first = bundle[0];
    let messages: Vec<&str> = bundle.iter().map(|c| c.message.as_str()).collect();
    let mut files: Vec<FileChange> = Vec::new();
    for c in bundle {
        files.extend(c.files.iter().cloned());
    }
    let shas: Vec<String> = bundle.iter().map(|c| c.sha.clone()).collect();

    let merged = Commit {
        sha: first.sha.clone(),
        author_id: first.author_id,
        author_email: first.author_email.clone(),
        message: messages.join("\n---\n"),
        timestamp: first.timestamp,
        files,
        is_merge: false,
        is_rename_only: false,
        is_format_only: bundle.iter().all(|c| c.is_format_only),
    };
    (merged, true, shas)
}

/// If the commit is within budget, emit one chunk; otherwise walk the file
/// list, flushing a chunk whenever the next file would push it over budget.
fn split_commit(
    commit: &Commit,
    is_bundled: bool,
    bundled_shas: Vec<String>,
    config: &ChunkerConfig,
) -> Vec<Chunk> {
    if commit.total_lines_changed() <= config.max_chunk_lines || commit.files.is_empty() {
        return vec![to_chunk(
            commit,
            0,
            1,
            commit.files.clone(),
            is_bundled,
            bundled_shas,
        )];
    }

    let mut groups: Vec<Vec<FileChange>> = Vec::new();
    let mut current: Vec<FileChange> = Vec::new();
    let mut current_lines: u32 = 0;

    for file in &commit.files {
        let file_lines = file.total_lines();
        if !current.is_empty() && current_lines + file_lines > config.max_chunk_lines {
            groups.push(std::mem::take(&mut current));
            current_lines = 0;
        }
        current_lines += file_lines;
        current.push(file.clone());
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let total = groups.len();
    groups
        .into_iter()
        .enumerate()
        .map(|(index, files)| {
            to_chunk(
                commit,
                index,
                total,
                files,
                false,
                Vec::new(),
            )
        })
        .collect()
}

fn to_chunk(
    commit: &Commit,
    chunk_index: usize,
    total_chunks: usize,
    files: Vec<FileChange>,
    is_bundled: bool,
    bundled_shas: Vec<String>,
) -> Chunk {
    let lines_added = files.iter().map(|f| f.added_lines).sum();
    let lines_deleted = files.iter().map(|f| f.deleted_lines).sum();
    let diff_text = files
        .iter()
        .map(|f| f.diff_text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Chunk {
        sha: commit.sha.clone(),
        chunk_index,
        total_chunks,
        author_id: commit.author_id,
        author_email: commit.author_email.clone(),
        message: commit.message.clone(),
        timestamp: commit.timestamp,
        files,
        diff_text,
        lines_added,
        lines_deleted,
        is_bundled,
        bundled_shas,
    }
}
