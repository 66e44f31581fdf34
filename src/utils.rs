/// Truncate a SHA to its first 8 characters for display.
pub fn short_sha(sha: &str) -> &str {
    &sha[..8.min(sha.len())]
}

const TRUNCATION_SENTINEL: &str = "… (truncated)";

/// Truncate diff text delivered to the LLM to at most `max_chars`
/// characters, appending a sentinel when truncation occurred.
pub fn truncate_diff(diff_text: &str, max_chars: usize) -> String {
    if diff_text.chars().count() <= max_chars {
        return diff_text.to_string();
    }
    let truncated: String = diff_text.chars().take(max_chars).collect();
    format!("{}{}", truncated, TRUNCATION_SENTINEL)
}

/// Extract JSON content from an LLM response.
///
/// Handles three formats:
/// 1. JSON in a ```json code fence
/// 2. JSON in a generic ``` code fence
/// 3. Raw JSON starting with `{`
///
/// Returns the extracted JSON string slice, or None if no JSON found.
pub fn extract_json_str(response: &str) -> Option<&str> {
    // Try ```json fence
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        let end = response[content_start..]
            .find("```")
            .map(|e| content_start + e)?;
        return Some(response[content_start..end].trim());
    }

    // Try generic ``` fence
    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        // Skip language identifier on same line
        let line_end = response[content_start..]
            .find('\n')
            .map(|n| content_start + n + 1)
            .unwrap_or(content_start);
        let end = response[line_end..].find("```").map(|e| line_end + e)?;
        return Some(response[line_end..end].trim());
    }

    // Try raw JSON
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if start <= end {
        Some(response[start..=end].trim())
    } else {
        None
    }
}
