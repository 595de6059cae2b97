use similar::TextDiff;

/// Unified diff between two prompt revisions, one rendered line per entry.
/// `None` when the prompts are identical.
pub fn prompt_diff(prev: &str, curr: &str) -> Option<Vec<String>> {
    if prev == curr {
        return None;
    }
    let diff = TextDiff::from_lines(prev, curr);
    let rendered = diff.unified_diff().header("prompt", "enhanced").to_string();
    Some(rendered.lines().map(str::to_string).collect())
}

pub fn normalize_prompt(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
