//! Commit loading: walks local git history and emits raw [`Commit`](crate::models::Commit)
//! records with per-file diff stats.

use std::collections::HashMap;
use std::process::Command;

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{Commit, FileChange};

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Git command failed: {0}")]
    CommandFailed(String),
    #[error("Failed to execute git: {0}")]
    ExecutionFailed(#[from] std::io::Error),
    #[error("Failed to parse git output: {0}")]
    ParseError(String),
    #[error("Not a git repository")]
    NotARepository,
    #[error("No commits found in range {0}")]
    NoCommitsInRange(String),
}

const UNIT_SEP: char = '\u{1f}';

/// Trait for git history access, so the pipeline can be driven against a
/// fake repository in tests.
pub trait GitOps {
    /// Resolve a ref (branch name, tag, SHA prefix) to a full SHA.
    fn resolve_ref(&self, ref_name: &str) -> Result<String, GitError>;

    /// Read commits in `base..head` (exclusive base, inclusive head), oldest first.
    /// `authors` maps a commit sha to a known student id, when available.
    fn read_commits(
        &self,
        base: &str,
        head: &str,
        authors: &HashMap<String, i64>,
    ) -> Result<Vec<Commit>, GitError>;
}

/// Shells out to the `git` binary.
pub struct Git {
    work_dir: Option<std::path::PathBuf>,
}

impl Git {
    pub fn new() -> Self {
        Self { work_dir: None }
    }

    pub fn with_repo_root(work_dir: impl AsRef<std::path::Path>) -> Self {
        Self {
            work_dir: Some(work_dir.as_ref().to_path_buf()),
        }
    }

    fn run_git(&self, args: &[&str]) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        if let Some(ref dir) = self.work_dir {
            cmd.current_dir(dir);
        }
        cmd.args(args);

        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CommandFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn parent_count(&self, sha: &str) -> Result<usize, GitError> {
        let output = self.run_git(&["rev-list", "--parents", "-n", "1", sha])?;
        Ok(output.trim().split_whitespace().count().saturating_sub(1))
    }

    fn name_status(&self, sha: &str) -> Result<Vec<(char, String)>, GitError> {
        let output = self.run_git(&["show", "--no-color", "-M", "--name-status", "--format=", sha])?;
        let mut entries = Vec::new();
        for line in output.lines().filter(|l| !l.is_empty()) {
            let mut parts = line.split('\t');
            let status = parts.next().unwrap_or("");
            let status_char = status.chars().next().unwrap_or('M');
            let path = match status_char {
                'R' | 'C' => parts.nth(1).unwrap_or_default(),
                _ => parts.next().unwrap_or_default(),
            };
            entries.push((status_char, path.to_string()));
        }
        Ok(entries)
    }

    fn numstat(&self, sha: &str) -> Result<HashMap<String, (u32, u32)>, GitError> {
        let output = self.run_git(&["show", "--no-color", "-M", "--numstat", "--format=", sha])?;
        let mut stats = HashMap::new();
        for line in output.lines().filter(|l| !l.is_empty()) {
            let mut parts = line.splitn(3, '\t');
            let added = parts.next().unwrap_or("0");
            let deleted = parts.next().unwrap_or("0");
            let path = parts.next().unwrap_or_default();
            let path = path.split(" => ").last().unwrap_or(path).trim();
            let added: u32 = added.parse().unwrap_or(0);
            let deleted: u32 = deleted.parse().unwrap_or(0);
            stats.insert(path.to_string(), (added, deleted));
        }
        Ok(stats)
    }

    fn file_diff(&self, sha: &str, path: &str) -> Result<String, GitError> {
        self.run_git(&["show", "--no-color", "--format=", sha, "--", path])
    }
}

impl Default for Git {
    fn default() -> Self {
        Self::new()
    }
}

impl Git {
    /// Clone `repo_uri` into `local_path` if it isn't there yet, otherwise
    /// pull. A failed pull is non-fatal: the existing snapshot is analyzed.
    pub fn sync_repo(repo_uri: &str, local_path: &std::path::Path) -> Result<Git, GitError> {
        if !local_path.exists() {
            if let Some(parent) = local_path.parent() {
                std::fs::create_dir_all(parent).map_err(GitError::ExecutionFailed)?;
            }
            let output = Command::new("git")
                .args(["clone", repo_uri, &local_path.to_string_lossy()])
                .output()?;
            if !output.status.success() {
                return Err(GitError::CommandFailed(format!(
                    "git clone {} failed: {}",
                    repo_uri,
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
        } else {
            let git = Git::with_repo_root(local_path);
            if let Err(err) = git.run_git(&["pull", "--ff-only"]) {
                log::warn!("pull failed for {}, using existing snapshot: {}", repo_uri, err);
            }
        }
        Ok(Git::with_repo_root(local_path))
    }
}

impl GitOps for Git {
    fn resolve_ref(&self, ref_name: &str) -> Result<String, GitError> {
        let output = self.run_git(&["rev-parse", ref_name])?;
        Ok(output.trim().to_string())
    }

    fn read_commits(
        &self,
        base: &str,
        head: &str,
        authors: &HashMap<String, i64>,
    ) -> Result<Vec<Commit>, GitError> {
        let range = format!("{}..{}", base, head);
        let output = self.run_git(&["rev-list", "--reverse", &range])?;
        let shas: Vec<&str> = output.lines().filter(|s| !s.is_empty()).collect();
        if shas.is_empty() {
            return Err(GitError::NoCommitsInRange(range));
        }

        let mut commits = Vec::with_capacity(shas.len());
        for sha in shas {
            match self.load_one(sha, authors) {
                Ok(commit) => commits.push(commit),
                Err(err) => {
                    log::warn!("skipping unresolvable commit {}: {}", sha, err);
                }
            }
        }
        Ok(commits)
    }
}

impl Git {
    fn load_one(&self, sha: &str, authors: &HashMap<String, i64>) -> Result<Commit, GitError> {
        let meta = self.run_git(&[
            "log",
            "-1",
            &format!("--format=%ae{sep}%at{sep}%B", sep = UNIT_SEP),
            sha,
        ])?;
        let mut fields = meta.splitn(3, UNIT_SEP);
        let author_email = fields.next().unwrap_or_default().trim().to_string();
        let timestamp_raw = fields.next().unwrap_or("0").trim();
        let message = fields.next().unwrap_or_default().trim().to_string();

        let epoch: i64 = timestamp_raw
            .parse()
            .map_err(|_| GitError::ParseError(format!("bad timestamp for {}", sha)))?;
        let timestamp: DateTime<Utc> = Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| GitError::ParseError(format!("bad timestamp for {}", sha)))?;

        let is_merge = self.parent_count(sha)? >= 2;
        let statuses = self.name_status(sha)?;
        let stats = self.numstat(sha)?;

        let mut files = Vec::with_capacity(statuses.len());
        for (status, path) in &statuses {
            let (added, deleted) = stats.get(path).copied().unwrap_or((0, 0));
            let diff_text = self.file_diff(sha, path).unwrap_or_default();
            let _ = status;
            files.push(FileChange {
                path: path.clone(),
                added_lines: added,
                deleted_lines: deleted,
                diff_text,
            });
        }

        let is_rename_only = !statuses.is_empty()
            && statuses.iter().all(|(status, _)| *status == 'R')
            && files.iter().map(|f| f.total_lines()).sum::<u32>() <= 5;
        let is_format_only = !files.is_empty() && files.iter().all(|f| is_whitespace_only_diff(&f.diff_text));

        Ok(Commit {
            sha: sha.to_string(),
            author_id: authors.get(sha).copied(),
            author_email,
            message,
            timestamp,
            files,
            is_merge,
            is_rename_only,
            is_format_only,
        })
    }
}

/// Rough heuristic: every added/removed diff line, once whitespace is
/// stripped, matches some removed/added line — this is a reformat, not a
/// content change.
fn is_whitespace_only_diff(diff_text: &str) -> bool {
    let mut added: Vec<String> = Vec::new();
    let mut removed: Vec<String> = Vec::new();
    for line in diff_text.lines() {
        if let Some(rest) = line.strip_prefix('+') {
            if !rest.starts_with("++") {
                added.push(rest.split_whitespace().collect::<String>());
            }
        } else if let Some(rest) = line.strip_prefix('-') {
            if !rest.starts_with("--") {
                removed.push(rest.split_whitespace().collect::<String>());
            }
        }
    }
    if added.is_empty() && removed.is_empty() {
        return false;
    }
    let mut added_sorted = added.clone();
    let mut removed_sorted = removed.clone();
    added_sorted.sort();
    removed_sorted.sort();
    added_sorted == removed_sorted
}
