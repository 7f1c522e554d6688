//! Chunk Builder: group selected diff content into LLM-sized review units.
//!
//! Splitting policy:
//! - Units never split inside a hunk.
//! - A single hunk that alone exceeds the budget becomes its own unit with
//!   `oversized = true`; the invoker decides whether to accept it (and may
//!   retry a timed-out oversized unit with a shortened excerpt).
//! - The budget is measured in diff lines, independent of the model's token
//!   limit (an external concern layered on top by the endpoint).
//!
//! Each unit carries a language tag inferred from the file extension. Files
//! with unrecognized extensions get the generic `text` tag and reduced
//! analysis scope; that is documented behavior, not a failure.

use crate::provider::types::{ChangeKind, Hunk};
use crate::select::Selection;

/// Inclusive new-file line range covered by a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

/// A bounded slice of one file's diff, prepared for a single model call.
#[derive(Debug, Clone)]
pub struct ReviewUnit {
    /// Run-unique id; also the deterministic processing order within a file.
    pub id: usize,
    pub path: String,
    pub kind: ChangeKind,
    /// Language tag passed to the model as a hint.
    pub language: &'static str,
    /// Rendered unified-diff excerpt sent as model input.
    pub excerpt: String,
    /// New-file ranges the unit actually covers (one per hunk). Findings
    /// outside these are hallucinated locations and get dropped.
    pub covered: Vec<LineRange>,
    /// Diff line records in this unit.
    pub line_count: usize,
    pub oversized: bool,
}

impl ReviewUnit {
    /// True when `line` (new-file side) falls inside a covered range.
    pub fn covers(&self, line: u32) -> bool {
        self.covered.iter().any(|r| line >= r.start && line <= r.end)
    }

    /// First half of the excerpt, for the oversized-timeout retry.
    pub fn shortened_excerpt(&self) -> String {
        let total = self.excerpt.lines().count();
        let keep = (total / 2).max(1);
        self.excerpt
            .lines()
            .take(keep)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build review units for every selected file, in selection order.
///
/// `budget_lines` must be > 0; hunks are packed greedily in diff order.
pub fn build_units(selection: &Selection, budget_lines: usize) -> Vec<ReviewUnit> {
    let budget = budget_lines.max(1);
    let mut units = Vec::new();
    let mut next_id = 0usize;

    for sel in &selection.files {
        let language = language_for_path(&sel.diff.path);
        let mut batch: Vec<&Hunk> = Vec::new();
        let mut batch_lines = 0usize;

        for hunk in &sel.diff.hunks {
            let n = hunk.lines.len();
            if n > budget {
                // Oversized hunk: flush whatever is pending, then emit the
                // hunk alone, flagged.
                if !batch.is_empty() {
                    units.push(render_unit(
                        next_id, &sel.diff.path, sel.diff.kind, language, &batch, batch_lines,
                        false,
                    ));
                    next_id += 1;
                    batch.clear();
                    batch_lines = 0;
                }
                units.push(render_unit(
                    next_id,
                    &sel.diff.path,
                    sel.diff.kind,
                    language,
                    &[hunk],
                    n,
                    true,
                ));
                next_id += 1;
                continue;
            }
            if batch_lines + n > budget {
                units.push(render_unit(
                    next_id, &sel.diff.path, sel.diff.kind, language, &batch, batch_lines, false,
                ));
                next_id += 1;
                batch.clear();
                batch_lines = 0;
            }
            batch.push(hunk);
            batch_lines += n;
        }
        if !batch.is_empty() {
            units.push(render_unit(
                next_id, &sel.diff.path, sel.diff.kind, language, &batch, batch_lines, false,
            ));
            next_id += 1;
        }
    }
    units
}

fn render_unit(
    id: usize,
    path: &str,
    kind: ChangeKind,
    language: &'static str,
    hunks: &[&Hunk],
    line_count: usize,
    oversized: bool,
) -> ReviewUnit {
    let mut excerpt = String::new();
    let mut covered = Vec::with_capacity(hunks.len());
    for h in hunks {
        excerpt.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            h.old_start, h.old_lines, h.new_start, h.new_lines
        ));
        let mut lo = u32::MAX;
        let mut hi = 0u32;
        for l in &h.lines {
            use crate::provider::types::HunkLine::*;
            match l {
                Added { new_line, content } => {
                    excerpt.push_str(&format!("+{content}\n"));
                    lo = lo.min(*new_line);
                    hi = hi.max(*new_line);
                }
                Removed { content, .. } => {
                    excerpt.push_str(&format!("-{content}\n"));
                }
                Context {
                    new_line, content, ..
                } => {
                    excerpt.push_str(&format!(" {content}\n"));
                    lo = lo.min(*new_line);
                    hi = hi.max(*new_line);
                }
            }
        }
        if lo <= hi {
            covered.push(LineRange { start: lo, end: hi });
        }
    }

    ReviewUnit {
        id,
        path: path.to_string(),
        kind,
        language,
        excerpt,
        covered,
        line_count,
        oversized,
    }
}

/// Language tag from file extension. Unrecognized extensions fall back to
/// the generic `text` tag.
pub fn language_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "py" | "pyw" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "cs" => "csharp",
        "java" | "kt" | "scala" => "java",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "c" | "cpp" | "cc" | "cxx" | "h" | "hpp" => "cpp",
        "swift" => "swift",
        "php" => "php",
        "vue" | "svelte" => "frontend",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{ChangeKind, FileDiff, Hunk, HunkLine};
    use crate::select::select_files;

    fn hunk(new_start: u32, added: u32) -> Hunk {
        let lines = (0..added)
            .map(|i| HunkLine::Added {
                new_line: new_start + i,
                content: format!("l{}", new_start + i),
            })
            .collect();
        Hunk {
            old_start: new_start,
            old_lines: 0,
            new_start,
            new_lines: added,
            lines,
        }
    }

    fn file(path: &str, hunks: Vec<Hunk>) -> FileDiff {
        FileDiff {
            path: path.to_string(),
            kind: ChangeKind::Modified,
            is_binary: false,
            hunks,
            raw_unidiff: None,
        }
    }

    #[test]
    fn small_file_yields_one_unit() {
        // Scenario: one file, five added lines, nothing over budget.
        let sel = select_files(vec![file("a.rs", vec![hunk(10, 5)])], 50, 1000);
        let units = build_units(&sel, 300);
        assert_eq!(units.len(), 1);
        assert!(!units[0].oversized);
        assert_eq!(units[0].language, "rust");
        assert_eq!(units[0].covered, vec![LineRange { start: 10, end: 14 }]);
        assert!(units[0].covers(12));
        assert!(!units[0].covers(15));
    }

    #[test]
    fn hunks_are_never_split() {
        let sel = select_files(
            vec![file("a.py", vec![hunk(1, 4), hunk(20, 4), hunk(40, 4)])],
            50,
            1000,
        );
        let units = build_units(&sel, 8);
        // 4+4 fits, third hunk spills into a second unit.
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].covered.len(), 2);
        assert_eq!(units[1].covered.len(), 1);
        assert_eq!(units[1].covered[0].start, 40);
    }

    #[test]
    fn oversized_hunk_becomes_own_flagged_unit() {
        let sel = select_files(
            vec![file("a.go", vec![hunk(1, 3), hunk(10, 20), hunk(50, 3)])],
            50,
            1000,
        );
        let units = build_units(&sel, 10);
        assert_eq!(units.len(), 3);
        assert!(!units[0].oversized);
        assert!(units[1].oversized);
        assert_eq!(units[1].line_count, 20);
        assert!(!units[2].oversized);
    }

    #[test]
    fn shortened_excerpt_halves_lines() {
        let sel = select_files(vec![file("a.rs", vec![hunk(1, 20)])], 50, 1000);
        let units = build_units(&sel, 5);
        let short = units[0].shortened_excerpt();
        assert!(short.lines().count() < units[0].excerpt.lines().count());
    }

    #[test]
    fn unknown_extension_gets_generic_tag() {
        assert_eq!(language_for_path("README.weird"), "text");
        assert_eq!(language_for_path("noext"), "text");
        assert_eq!(language_for_path("src/main.rs"), "rust");
        assert_eq!(language_for_path("App.TSX"), "typescript");
    }
}
