//! Normalized data model for a pull request and its diffs.
//!
//! These types are the output of diff acquisition/normalization and are
//! read-only for every downstream stage (selection, chunking, mapping,
//! publishing). One pipeline run owns one `PullRequestContext` plus its
//! `FileDiff`s; nothing here is shared across concurrent runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unique reference to a pull request inside the host organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestId {
    /// Organization base URL, e.g. "https://dev.azure.com/acme".
    pub org_url: String,
    /// Project name.
    pub project: String,
    /// Repository identifier (GUID or name).
    pub repo: String,
    /// Pull request number.
    pub number: u64,
}

/// Immutable per-run context: identifiers, branches, and the commit pair the
/// diff was taken against. Created once at pipeline start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestContext {
    pub id: PullRequestId,
    /// Latest iteration of the PR; inline threads are bound to it.
    pub iteration_id: u64,
    pub source_branch: Option<String>,
    pub target_branch: Option<String>,
    /// Head commit of the source branch for this iteration.
    pub source_commit: String,
    /// Merge-base commit on the target branch.
    pub target_commit: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// File-level change kind as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One line inside a diff hunk.
///
/// Invariant (enforced by the parser): `Added` always carries a new-file
/// line number, `Removed` an old-file one, and numbers strictly increase
/// per side within a hunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HunkLine {
    Added {
        new_line: u32,
        content: String,
    },
    Removed {
        old_line: u32,
        content: String,
    },
    Context {
        old_line: u32,
        new_line: u32,
        content: String,
    },
}

impl HunkLine {
    /// New-file line number, present for `Added` and `Context` lines.
    /// Comments can only anchor to these (removed lines have no position in
    /// the new version).
    pub fn new_line(&self) -> Option<u32> {
        match self {
            HunkLine::Added { new_line, .. } | HunkLine::Context { new_line, .. } => {
                Some(*new_line)
            }
            HunkLine::Removed { .. } => None,
        }
    }
}

/// A diff hunk (contiguous block of changes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Number of added + removed line records.
    pub fn changed_line_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Context { .. }))
            .count()
    }
}

/// A changed file with its ordered hunks.
///
/// Renamed files are attributed to the new path only. Binary files carry
/// zero hunks and `is_binary = true`; the normalizer records them as skipped
/// before selection ever sees them. Files with empty diffs keep zero hunks
/// but stay listed so selection can see they were touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    /// Repository-relative path (new path for renames).
    pub path: String,
    pub kind: ChangeKind,
    pub is_binary: bool,
    pub hunks: Vec<Hunk>,
    /// Provider raw unified diff text (kept for debugging).
    pub raw_unidiff: Option<String>,
}

impl FileDiff {
    /// Total diff line records across hunks (context + added + removed).
    /// This is the quantity the per-file truncation limit applies to.
    pub fn total_line_count(&self) -> usize {
        self.hunks.iter().map(|h| h.lines.len()).sum()
    }

    /// Added + removed line records across hunks (selection priority).
    pub fn changed_line_count(&self) -> usize {
        self.hunks.iter().map(|h| h.changed_line_count()).sum()
    }
}

/// A file the normalizer could not turn into hunks, or excluded up front.
/// Always visible in the run outcome; nothing is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIssue {
    pub path: String,
    pub detail: String,
}

/// Normalized change set: parseable files plus everything set aside.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub files: Vec<FileDiff>,
    /// Files whose diff failed to parse (MalformedDiff, per-file fatal).
    pub malformed: Vec<FileIssue>,
    /// Binary / deleted / skip-pattern files excluded before selection.
    pub skipped: Vec<FileIssue>,
}

/// An existing comment thread on the PR, as listed by the provider.
///
/// The fingerprint is re-derived from a hidden marker in the body by the
/// publisher; threads without a marker belong to humans and are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    pub id: u64,
    /// Body of the first comment in the thread.
    pub body: String,
    pub resolved: bool,
}
