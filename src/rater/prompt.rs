//! Builds the rating prompt sent to the LLM for a single chunk.

use crate::models::Chunk;
use crate::utils::truncate_diff;

const MAX_DIFF_CHARS: usize = 10_000;

pub fn build_prompt(chunk: &Chunk) -> String {
    let files = chunk
        .files
        .iter()
        .map(|f| f.path.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let diff = truncate_diff(&chunk.diff_text, MAX_DIFF_CHARS);

    format!(
        "You are rating the engineering effort behind one commit in a student \
team repository.\n\nCommit message: {message}\nFiles changed: {files}\n\
Lines added: {added}\nLines deleted: {deleted}\n\nDiff:\n{diff}\n\n\
Respond with a JSON object with exactly these keys: effortScore (1-10), \
complexity (1-10), novelty (1-10), type (one of FEATURE, BUG_FIX, TEST, \
REFACTOR, TRIVIAL), confidence (0-1), reasoning (one short sentence). \
No markdown, no explanation outside the JSON object.",
        message = chunk.message,
        files = files,
        added = chunk.lines_added,
        deleted = chunk.lines_deleted,
        diff = diff,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileChange;
    use chrono::Utc;

    #[test]
    fn prompt_embeds_message_and_files() {
        let chunk = Chunk {
            sha: "a".into(),
            chunk_index: 0,
            total_chunks: 1,
            author_id: Some(1),
            author_email: "x@y.com".into(),
            message: "add search endpoint".into(),
            timestamp: Utc::now(),
            files: vec![FileChange {
                path: "src/search.rs".into(),
                added_lines: 40,
                deleted_lines: 2,
                diff_text: "+fn search() {}".into(),
            }],
            diff_text: "+fn search() {}".into(),
            lines_added: 40,
            lines_deleted: 2,
            is_bundled: false,
            bundled_shas: vec![],
        };
        let prompt = build_prompt(&chunk);
        assert!(prompt.contains("add search endpoint"));
        assert!(prompt.contains("src/search.rs"));
        assert!(prompt.to_lowercase().contains("no markdown"));
    }

    #[test]
    fn prompt_truncates_long_diffs() {
        let chunk = Chunk {
            sha: "a".into(),
            chunk_index: 0,
            total_chunks: 1,
            author_id: Some(1),
            author_email: "x@y.com".into(),
            message: "big".into(),
            timestamp: Utc::now(),
            files: vec![],
            diff_text: "x".repeat(20_000),
            lines_added: 1,
            lines_deleted: 0,
            is_bundled: false,
            bundled_shas: vec![],
        };
        let prompt = build_prompt(&chunk);
        assert!(prompt.contains("(truncated)"));
    }
}
