//! File Selector: choose which files to analyze, and how much of each,
//! under a size budget.
//!
//! Policy:
//! - Priority is total changed-line count descending (more change, more
//!   likely to contain defects); ties break by path lexical order so the
//!   selection is deterministic.
//! - A file whose total diff line count (context + added + removed) exceeds
//!   `max_lines_per_file` keeps the first `max_lines_per_file` line records
//!   in hunk order and is marked `truncated`. Findings beyond the retained
//!   range are impossible by construction.
//! - Files past the `max_files` cap are recorded as `skipped_limit`, never
//!   silently dropped.

use crate::provider::types::{FileDiff, Hunk, HunkLine};

/// One file admitted for review, possibly truncated.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// The (possibly truncated) diff submitted downstream.
    pub diff: FileDiff,
    /// Line records retained after truncation.
    pub retained_lines: usize,
    pub truncated: bool,
}

/// Selector output: admitted files plus everything cut by the file cap.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub files: Vec<SelectedFile>,
    /// Paths beyond `max_files`, in the priority order they lost out.
    pub skipped_limit: Vec<String>,
}

/// Apply the selection and truncation policy.
///
/// `max_files = 0` or an empty input yields an empty selection and a
/// degenerate run downstream (verdict approve, not an error).
pub fn select_files(
    diffs: Vec<FileDiff>,
    max_files: usize,
    max_lines_per_file: usize,
) -> Selection {
    let mut ordered = diffs;
    ordered.sort_by(|a, b| {
        b.changed_line_count()
            .cmp(&a.changed_line_count())
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut out = Selection::default();
    for (i, diff) in ordered.into_iter().enumerate() {
        if i >= max_files {
            out.skipped_limit.push(diff.path);
            continue;
        }
        out.files.push(truncate_file(diff, max_lines_per_file));
    }
    out
}

/// Keep the first `limit` line records of the diff in hunk order.
fn truncate_file(mut diff: FileDiff, limit: usize) -> SelectedFile {
    let total = diff.total_line_count();
    if total <= limit {
        return SelectedFile {
            retained_lines: total,
            truncated: false,
            diff,
        };
    }

    let mut remaining = limit;
    let mut kept: Vec<Hunk> = Vec::new();
    for mut hunk in std::mem::take(&mut diff.hunks) {
        if remaining == 0 {
            break;
        }
        if hunk.lines.len() > remaining {
            hunk.lines.truncate(remaining);
            // Recompute side extents from what is actually left.
            hunk.new_lines = hunk
                .lines
                .iter()
                .filter(|l| l.new_line().is_some())
                .count() as u32;
            hunk.old_lines = hunk
                .lines
                .iter()
                .filter(|l| matches!(l, HunkLine::Removed { .. } | HunkLine::Context { .. }))
                .count() as u32;
        }
        remaining -= hunk.lines.len();
        kept.push(hunk);
    }
    diff.hunks = kept;

    SelectedFile {
        retained_lines: diff.total_line_count(),
        truncated: true,
        diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::ChangeKind;

    fn file(path: &str, added: u32) -> FileDiff {
        let lines = (1..=added)
            .map(|n| HunkLine::Added {
                new_line: n,
                content: format!("line {n}"),
            })
            .collect();
        FileDiff {
            path: path.to_string(),
            kind: ChangeKind::Modified,
            is_binary: false,
            hunks: vec![Hunk {
                old_start: 1,
                old_lines: 0,
                new_start: 1,
                new_lines: added,
                lines,
            }],
            raw_unidiff: None,
        }
    }

    #[test]
    fn bounds_hold_for_any_input() {
        let diffs: Vec<_> = (0..20).map(|i| file(&format!("f{i:02}.rs"), i + 1)).collect();
        let sel = select_files(diffs, 7, 5);
        assert!(sel.files.len() <= 7);
        for f in &sel.files {
            assert!(f.retained_lines <= 5);
        }
        assert_eq!(sel.skipped_limit.len(), 13);
    }

    #[test]
    fn orders_by_change_count_then_path() {
        let sel = select_files(
            vec![file("b.rs", 3), file("a.rs", 3), file("c.rs", 9)],
            10,
            100,
        );
        let paths: Vec<_> = sel.files.iter().map(|f| f.diff.path.as_str()).collect();
        assert_eq!(paths, ["c.rs", "a.rs", "b.rs"]);
    }

    #[test]
    fn sixty_files_cap_fifty_leaves_ten_skipped() {
        let diffs: Vec<_> = (0..60).map(|i| file(&format!("f{i:02}.rs"), 4)).collect();
        let sel = select_files(diffs, 50, 1000);
        assert_eq!(sel.files.len(), 50);
        assert_eq!(sel.skipped_limit.len(), 10);
    }

    #[test]
    fn zero_max_files_selects_nothing() {
        let sel = select_files(vec![file("a.rs", 2)], 0, 1000);
        assert!(sel.files.is_empty());
        assert_eq!(sel.skipped_limit, vec!["a.rs".to_string()]);
    }

    #[test]
    fn truncation_trims_in_hunk_order_and_flags() {
        let mut big = file("big.rs", 10);
        big.hunks.push(Hunk {
            old_start: 50,
            old_lines: 1,
            new_start: 50,
            new_lines: 1,
            lines: vec![HunkLine::Context {
                old_line: 50,
                new_line: 50,
                content: "ctx".into(),
            }],
        });
        let sel = select_files(vec![big], 1, 6);
        let f = &sel.files[0];
        assert!(f.truncated);
        assert_eq!(f.retained_lines, 6);
        // Second hunk fell past the budget entirely.
        assert_eq!(f.diff.hunks.len(), 1);
        assert_eq!(f.diff.hunks[0].new_lines, 6);
    }

    #[test]
    fn small_file_not_truncated() {
        let sel = select_files(vec![file("s.rs", 5)], 1, 1000);
        assert!(!sel.files[0].truncated);
        assert_eq!(sel.files[0].retained_lines, 5);
    }
}
