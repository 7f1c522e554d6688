//! Position Mapper & Deduplicator.
//!
//! Resolves each validated finding onto a diff-relative position through a
//! `LineMapping` built from the normalized hunks. Findings on lines that are
//! not `added`/`context` in any hunk (most commonly a removed line, or a
//! line outside every hunk) cannot be anchored; they are dropped and counted
//! as `unanchored`, never silently kept.
//!
//! Deduplication collapses findings with identical fingerprints, keeping the
//! first occurrence in diff order. Oversized hunks split upstream can cover
//! overlapping context, so the same defect may be reported more than once.

use std::collections::{BTreeMap, HashSet};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::provider::types::FileDiff;
use crate::review::parse::ReviewFinding;
use crate::review::{UnitOutcome, UnitReport};

/// Diff-relative position: which hunk, and the offset of the line record
/// inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffPosition {
    pub hunk_index: usize,
    pub offset: usize,
}

/// Derived index from (file path, new-line-number) → diff position.
/// Built only from `added`/`context` lines.
#[derive(Debug, Default)]
pub struct LineMapping {
    inner: BTreeMap<(String, u32), DiffPosition>,
}

impl LineMapping {
    /// Build the mapping from the full normalized diff (untruncated; the
    /// selector guarantees findings beyond any truncation cannot exist).
    pub fn build(diffs: &[FileDiff]) -> Self {
        let mut inner = BTreeMap::new();
        for diff in diffs {
            for (hunk_index, hunk) in diff.hunks.iter().enumerate() {
                for (offset, line) in hunk.lines.iter().enumerate() {
                    if let Some(new_line) = line.new_line() {
                        inner.insert(
                            (diff.path.clone(), new_line),
                            DiffPosition { hunk_index, offset },
                        );
                    }
                }
            }
        }
        Self { inner }
    }

    pub fn resolve(&self, path: &str, line: u32) -> Option<DiffPosition> {
        self.inner.get(&(path.to_string(), line)).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A finding with a resolved diff position and a stable fingerprint.
#[derive(Debug, Clone)]
pub struct AnchoredFinding {
    pub finding: ReviewFinding,
    pub position: DiffPosition,
    /// sha256(category|path|line|normalized message), 16 hex chars. Stable
    /// across runs; the deduplication and idempotent re-posting key.
    pub fingerprint: String,
}

/// Anchoring + dedup result for the whole run.
#[derive(Debug, Clone, Default)]
pub struct MapOutcome {
    /// Unique, anchored findings in diff order.
    pub anchored: Vec<AnchoredFinding>,
    /// Findings whose line could not be anchored to the new version.
    pub unanchored: usize,
    /// Findings collapsed into an earlier identical fingerprint.
    pub duplicates: usize,
}

/// Anchor every reviewed finding and collapse duplicates.
///
/// `reports` must be in unit-id order (the invoker guarantees this), which
/// makes the first-occurrence rule deterministic within a file.
pub fn anchor_and_dedup(mapping: &LineMapping, reports: &[UnitReport]) -> MapOutcome {
    let mut out = MapOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for report in reports {
        let UnitOutcome::Reviewed { findings, .. } = &report.outcome else {
            continue;
        };
        for finding in findings {
            let Some(position) = mapping.resolve(&finding.path, finding.line) else {
                debug!(
                    "map: unanchored finding {}:{} ({})",
                    finding.path, finding.line, finding.category.as_str()
                );
                out.unanchored += 1;
                continue;
            };
            let fingerprint = fingerprint(finding);
            if !seen.insert(fingerprint.clone()) {
                out.duplicates += 1;
                continue;
            }
            out.anchored.push(AnchoredFinding {
                finding: finding.clone(),
                position,
                fingerprint,
            });
        }
    }
    out
}

/// Stable fingerprint over category + path + line + normalized message.
pub fn fingerprint(f: &ReviewFinding) -> String {
    let mut hasher = Sha256::new();
    hasher.update(f.category.as_str());
    hasher.update("|");
    hasher.update(&f.path);
    hasher.update("|");
    hasher.update(f.line.to_string());
    hasher.update("|");
    hasher.update(normalize_message(&f.message));
    let digest = hasher.finalize();
    hex16(&digest)
}

/// Lowercase, whitespace-collapsed message; punctuation-insensitive at the
/// edges so trivial rewording does not break idempotency.
fn normalize_message(msg: &str) -> String {
    msg.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}

fn hex16(digest: &[u8]) -> String {
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{ChangeKind, Hunk, HunkLine};
    use crate::review::parse::Category;

    fn diff() -> FileDiff {
        FileDiff {
            path: "src/app.rs".into(),
            kind: ChangeKind::Modified,
            is_binary: false,
            hunks: vec![Hunk {
                old_start: 40,
                old_lines: 3,
                new_start: 40,
                new_lines: 3,
                lines: vec![
                    HunkLine::Context {
                        old_line: 40,
                        new_line: 40,
                        content: "fn f() {".into(),
                    },
                    HunkLine::Removed {
                        old_line: 41,
                        content: "    old();".into(),
                    },
                    HunkLine::Added {
                        new_line: 41,
                        content: "    new_call();".into(),
                    },
                    HunkLine::Context {
                        old_line: 42,
                        new_line: 42,
                        content: "}".into(),
                    },
                ],
            }],
            raw_unidiff: None,
        }
    }

    fn finding(line: u32, message: &str) -> ReviewFinding {
        ReviewFinding {
            category: Category::High,
            path: "src/app.rs".into(),
            line,
            message: message.into(),
            suggestion: None,
        }
    }

    fn reviewed(id: usize, findings: Vec<ReviewFinding>) -> UnitReport {
        UnitReport {
            unit_id: id,
            path: "src/app.rs".into(),
            outcome: UnitOutcome::Reviewed {
                findings,
                dropped_out_of_unit: 0,
            },
        }
    }

    #[test]
    fn added_and_context_lines_resolve() {
        let m = LineMapping::build(&[diff()]);
        assert!(m.resolve("src/app.rs", 40).is_some());
        assert_eq!(
            m.resolve("src/app.rs", 41),
            Some(DiffPosition {
                hunk_index: 0,
                offset: 2
            })
        );
    }

    #[test]
    fn removed_line_is_unanchored() {
        // Line 41 exists on the new side here, so use a line only present
        // as removed: new-side 43 is outside every hunk.
        let m = LineMapping::build(&[diff()]);
        let out = anchor_and_dedup(&m, &[reviewed(0, vec![finding(43, "dangling")])]);
        assert!(out.anchored.is_empty());
        assert_eq!(out.unanchored, 1);
    }

    #[test]
    fn identical_fingerprints_collapse_keeping_first() {
        let m = LineMapping::build(&[diff()]);
        let reports = vec![
            reviewed(0, vec![finding(41, "Unchecked result")]),
            reviewed(1, vec![finding(41, "unchecked   RESULT.")]),
        ];
        let out = anchor_and_dedup(&m, &reports);
        assert_eq!(out.anchored.len(), 1);
        assert_eq!(out.duplicates, 1);
        // First occurrence's message wins.
        assert_eq!(out.anchored[0].finding.message, "Unchecked result");
    }

    #[test]
    fn different_lines_are_distinct() {
        let m = LineMapping::build(&[diff()]);
        let reports = vec![reviewed(
            0,
            vec![finding(40, "same words"), finding(41, "same words")],
        )];
        let out = anchor_and_dedup(&m, &reports);
        assert_eq!(out.anchored.len(), 2);
        assert_eq!(out.duplicates, 0);
    }

    #[test]
    fn fingerprint_is_stable_and_normalized() {
        let a = fingerprint(&finding(41, "Null deref  here."));
        let b = fingerprint(&finding(41, "null deref here"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        let c = fingerprint(&finding(42, "null deref here"));
        assert_ne!(a, c);
    }

    #[test]
    fn degraded_reports_contribute_nothing() {
        let m = LineMapping::build(&[diff()]);
        let r = UnitReport {
            unit_id: 0,
            path: "src/app.rs".into(),
            outcome: UnitOutcome::Degraded {
                reason: "x".into(),
            },
        };
        let out = anchor_and_dedup(&m, &[r]);
        assert!(out.anchored.is_empty());
    }
}
