//! Prompt assembly for unit analysis calls.
//!
//! The wording here is a policy input, not architecture: the only contract
//! the pipeline relies on is the fixed output schema
//! `[{category, file, line, message, suggestion?}]`.

use crate::chunk::ReviewUnit;
use crate::provider::types::ChangeKind;

/// System instruction fixing the output schema.
pub const SYSTEM_INSTRUCTIONS: &str = "\
You are an expert code reviewer. Review ONLY the changed lines (+ lines) of \
the provided unified diff. Do not flag issues in unchanged context lines.

Respond with a JSON array (no prose) where each element is:
{\"category\": \"critical\" | \"high\" | \"suggestion\", \
\"file\": \"<path as given>\", \"line\": <new-file line number>, \
\"message\": \"<what is wrong and why>\", \"suggestion\": \"<optional fix>\"}

Return [] when the changes look fine.";

/// Stricter addendum for the single repair attempt after invalid output.
pub const STRICT_RETRY_SUFFIX: &str = "\

IMPORTANT: your previous answer was not valid JSON for the required schema. \
Output ONLY the JSON array, with double-quoted keys, categories from the \
closed set {critical, high, suggestion}, and integer line numbers. No \
markdown, no commentary.";

/// Build the per-unit user prompt: file header + fenced diff excerpt.
pub fn build_unit_prompt(unit: &ReviewUnit, excerpt: &str) -> String {
    let kind = match unit.kind {
        ChangeKind::Added => "added",
        ChangeKind::Modified => "modified",
        ChangeKind::Deleted => "deleted",
        ChangeKind::Renamed => "renamed",
    };
    format!(
        "### File: {path} ({kind}, language: {lang})\n```diff\n{excerpt}\n```\n",
        path = unit.path,
        kind = kind,
        lang = unit.language,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{LineRange, ReviewUnit};

    #[test]
    fn prompt_carries_path_language_and_excerpt() {
        let unit = ReviewUnit {
            id: 0,
            path: "src/app.py".into(),
            kind: ChangeKind::Modified,
            language: "python",
            excerpt: "@@ -1,1 +1,1 @@\n+x = 1\n".into(),
            covered: vec![LineRange { start: 1, end: 1 }],
            line_count: 1,
            oversized: false,
        };
        let p = build_unit_prompt(&unit, &unit.excerpt);
        assert!(p.contains("src/app.py"));
        assert!(p.contains("language: python"));
        assert!(p.contains("+x = 1"));
    }
}
