//! Run outcome aggregation.
//!
//! `RunOutcome` is assembled once at the end of the run and never mutated
//! after publication. It always lists skipped files, truncated files, and
//! degraded units by name, so a human can tell "no issues found" apart from
//! "couldn't analyze".

use serde::Serialize;

use crate::provider::types::FileIssue;
use crate::review::parse::Category;

/// Overall recommendation derived from all open findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Approve,
    ApproveWithComments,
    RequestChanges,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approve => "approve",
            Verdict::ApproveWithComments => "approve-with-comments",
            Verdict::RequestChanges => "request-changes",
        }
    }
}

/// Per-category totals over the open findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub critical: usize,
    pub high: usize,
    pub suggestion: usize,
}

impl CategoryCounts {
    pub fn add(&mut self, category: Category) {
        match category {
            Category::Critical => self.critical += 1,
            Category::High => self.high += 1,
            Category::Suggestion => self.suggestion += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.suggestion
    }
}

/// Compute the verdict from the findings that remain open after this run.
/// Resolved threads never count.
pub fn compute_verdict(counts: &CategoryCounts) -> Verdict {
    if counts.critical > 0 {
        Verdict::RequestChanges
    } else if counts.high > 0 || counts.suggestion > 0 {
        Verdict::ApproveWithComments
    } else {
        Verdict::Approve
    }
}

/// Aggregated result of a whole pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub verdict: Verdict,
    pub counts: CategoryCounts,

    /// Files the provider reported as changed.
    pub files_changed: usize,
    /// Files admitted by the selector.
    pub files_selected: usize,

    /// Binary / deleted / skip-pattern files excluded before selection.
    pub skipped: Vec<FileIssue>,
    /// Files cut by the `max_files` cap.
    pub skipped_limit: Vec<String>,
    /// Files whose diff exceeded `max_lines_per_file`.
    pub truncated: Vec<String>,
    /// Files whose diff failed to parse (per-file fatal).
    pub malformed: Vec<FileIssue>,
    /// Units degraded to "analysis unavailable", attributed to their file.
    pub degraded_units: Vec<FileIssue>,

    /// Findings dropped because no diff position exists for their line.
    pub unanchored: usize,
    /// Findings dropped because the model placed them outside their unit.
    pub dropped_out_of_unit: usize,
    /// Findings collapsed by fingerprint deduplication.
    pub duplicates: usize,

    pub threads_created: usize,
    pub threads_kept: usize,
    pub threads_resolved: usize,
    pub publish_conflicts: usize,

    /// Extra diagnostics, populated only when `debug` is set. No behavior
    /// depends on this.
    pub diagnostics: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_ladder() {
        let mut c = CategoryCounts::default();
        assert_eq!(compute_verdict(&c), Verdict::Approve);
        c.suggestion = 2;
        assert_eq!(compute_verdict(&c), Verdict::ApproveWithComments);
        c.high = 1;
        assert_eq!(compute_verdict(&c), Verdict::ApproveWithComments);
        c.critical = 1;
        assert_eq!(compute_verdict(&c), Verdict::RequestChanges);
    }

    #[test]
    fn adding_a_critical_always_requests_changes() {
        // Monotonicity: whatever the clean result was, one critical flips it.
        for (high, suggestion) in [(0, 0), (3, 0), (0, 5), (2, 2)] {
            let mut c = CategoryCounts {
                critical: 0,
                high,
                suggestion,
            };
            assert_ne!(compute_verdict(&c), Verdict::RequestChanges);
            c.add(Category::Critical);
            assert_eq!(compute_verdict(&c), Verdict::RequestChanges);
        }
    }
}
