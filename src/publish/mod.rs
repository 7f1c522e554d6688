//! Publisher: idempotent thread management + summary + verdict.
//!
//! Given the final findings and the PR's existing threads, computes a
//! three-way plan:
//! - **create**  — fingerprints with no existing thread;
//! - **keep**    — fingerprints whose thread is already open;
//! - **resolve** — open marker threads whose fingerprint no longer appears
//!                 (the issue was fixed).
//!
//! Idempotency relies on a hidden HTML marker embedded in every body we
//! post; fingerprints are re-derived from those markers on the next run, so
//! the durable state lives in the provider, not in this process. Threads
//! without a marker belong to humans and are never touched.
//!
//! The publisher runs single-threaded after all workers complete, keeping
//! the create/resolve decision free of races. Only a failure to post the
//! summary comment is run-fatal; everything else is logged and counted.

use std::collections::HashMap;

use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use crate::errors::{Error, RvResult};
use crate::map::AnchoredFinding;
use crate::outcome::{CategoryCounts, Verdict, compute_verdict};
use crate::provider::types::{CommentThread, PullRequestContext};
use crate::provider::ProviderClient;
use crate::review::parse::Category;

/// An existing marker thread matched by fingerprint.
#[derive(Debug, Clone)]
pub struct PlannedKeep {
    pub thread_id: u64,
    pub finding: AnchoredFinding,
}

/// An open marker thread whose issue is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedResolve {
    pub thread_id: u64,
    pub fingerprint: String,
}

/// Three-way diff between current findings and existing threads.
#[derive(Debug, Clone, Default)]
pub struct PublishPlan {
    pub create: Vec<AnchoredFinding>,
    pub keep: Vec<PlannedKeep>,
    pub resolve: Vec<PlannedResolve>,
    /// Findings whose thread was resolved externally; not recreated and not
    /// counted toward the verdict (the issue was acknowledged).
    pub suppressed: Vec<AnchoredFinding>,
}

impl PublishPlan {
    /// Category totals over the findings that remain open after this plan.
    pub fn open_counts(&self) -> CategoryCounts {
        let mut counts = CategoryCounts::default();
        for f in &self.create {
            counts.add(f.finding.category);
        }
        for k in &self.keep {
            counts.add(k.finding.finding.category);
        }
        counts
    }
}

/// Result of executing a plan against the provider.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub verdict: Verdict,
    pub counts: CategoryCounts,
    pub created: usize,
    pub kept: usize,
    pub resolved: usize,
    pub suppressed: usize,
    /// Resolve attempts that hit an external conflict (logged and skipped).
    pub conflicts: usize,
    /// Inline creates that failed (logged; the run goes on).
    pub failed_creates: usize,
    pub summary_posted: bool,
}

/// Compute the three-way plan. Pure; all provider I/O happens later.
pub fn plan_threads(findings: &[AnchoredFinding], existing: &[CommentThread]) -> PublishPlan {
    // Index existing marker threads by fingerprint. Later threads with the
    // same fingerprint are duplicates from pre-marker eras; first one wins.
    let mut by_fp: HashMap<String, &CommentThread> = HashMap::new();
    for t in existing {
        if let Some(fp) = extract_fingerprint(&t.body) {
            by_fp.entry(fp).or_insert(t);
        }
    }

    let mut plan = PublishPlan::default();
    let mut planned: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for f in findings {
        if !planned.insert(&f.fingerprint) {
            continue;
        }
        match by_fp.remove(&f.fingerprint) {
            Some(t) if !t.resolved => plan.keep.push(PlannedKeep {
                thread_id: t.id,
                finding: f.clone(),
            }),
            Some(_) => plan.suppressed.push(f.clone()),
            None => plan.create.push(f.clone()),
        }
    }
    // Whatever is left open no longer matches a finding: the issue is fixed.
    for (fp, t) in by_fp {
        if !t.resolved {
            plan.resolve.push(PlannedResolve {
                thread_id: t.id,
                fingerprint: fp,
            });
        }
    }
    plan.resolve.sort_by_key(|r| r.thread_id);
    plan
}

/// Execute the plan: summary first (fatal on failure), then inline creates
/// and resolves (tolerated per-thread).
pub async fn publish(
    client: &ProviderClient,
    ctx: &PullRequestContext,
    plan: &PublishPlan,
    existing: &[CommentThread],
    summary: &SummaryInput<'_>,
) -> RvResult<PublishReport> {
    let counts = plan.open_counts();
    let verdict = compute_verdict(&counts);

    let mut report = PublishReport {
        verdict,
        counts,
        created: 0,
        kept: plan.keep.len(),
        resolved: 0,
        suppressed: plan.suppressed.len(),
        conflicts: 0,
        failed_creates: 0,
        summary_posted: false,
    };

    // Summary comment: skipped when an identical one is already there, so a
    // re-run against an unchanged diff posts nothing.
    let summary_body = render_summary(&counts, verdict, summary);
    let summary_hash = body_hash(&summary_body);
    let already_posted = existing
        .iter()
        .any(|t| extract_summary_hash(&t.body).as_deref() == Some(summary_hash.as_str()));
    if already_posted {
        info!("publish: summary unchanged, skipping");
    } else {
        // The only publisher failure that is run-fatal.
        client
            .create_summary_thread(&ctx.id, &summary_body)
            .await?;
        report.summary_posted = true;
    }

    for f in &plan.create {
        let body = render_inline_body(f);
        match client
            .create_inline_thread(ctx, &f.finding.path, f.finding.line, &body)
            .await
        {
            Ok(_) => report.created += 1,
            Err(e) => {
                warn!(
                    "publish: inline create failed for {}:{}: {}",
                    f.finding.path, f.finding.line, e
                );
                report.failed_creates += 1;
            }
        }
    }

    for r in &plan.resolve {
        match client.resolve_thread(&ctx.id, r.thread_id).await {
            Ok(()) => report.resolved += 1,
            Err(Error::PublishConflict(id)) => {
                warn!("publish: thread {} resolved/locked externally, skipping", id);
                report.conflicts += 1;
            }
            Err(e) => {
                warn!("publish: resolve failed for thread {}: {}", r.thread_id, e);
                report.conflicts += 1;
            }
        }
    }

    info!(
        "publish: done created={} kept={} resolved={} suppressed={} conflicts={} verdict={}",
        report.created,
        report.kept,
        report.resolved,
        report.suppressed,
        report.conflicts,
        verdict.as_str()
    );
    Ok(report)
}

/// Context rendered into the summary footer.
#[derive(Debug, Clone)]
pub struct SummaryInput<'a> {
    pub files_reviewed: usize,
    pub files_skipped_limit: usize,
    pub files_truncated: usize,
    pub degraded_units: usize,
    pub model: &'a str,
}

/// Hidden marker for inline threads: the re-derivable fingerprint.
fn inline_marker(fingerprint: &str) -> String {
    format!("<!-- pr-reviewer:fp={fingerprint};ver=1 -->")
}

/// Hidden marker for summary threads: a hash of the rendered body, so an
/// unchanged re-run is a no-op while a changed diff posts a fresh summary.
fn summary_marker(hash: &str) -> String {
    format!("<!-- pr-reviewer:summary={hash};ver=1 -->")
}

/// Extract an inline fingerprint from a thread body, if the body is ours.
pub fn extract_fingerprint(body: &str) -> Option<String> {
    let re = Regex::new(r"<!--\s*pr-reviewer:fp=([0-9a-f]{16});ver=\d+\s*-->").unwrap();
    re.captures(body).map(|c| c[1].to_string())
}

fn extract_summary_hash(body: &str) -> Option<String> {
    let re = Regex::new(r"<!--\s*pr-reviewer:summary=([0-9a-f]{16});ver=\d+\s*-->").unwrap();
    re.captures(body).map(|c| c[1].to_string())
}

fn body_hash(body: &str) -> String {
    use sha2::{Digest, Sha256};
    // Hash only the content above the footer so the timestamp line does not
    // defeat idempotency.
    let content = body.split("\n---\n").next().unwrap_or(body);
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Render one inline thread body (severity tag, message, optional fix,
/// hidden marker).
pub fn render_inline_body(f: &AnchoredFinding) -> String {
    let tag = match f.finding.category {
        Category::Critical => "CRITICAL",
        Category::High => "HIGH",
        Category::Suggestion => "Suggestion",
    };
    let mut body = format!("**{tag}**: {}\n", f.finding.message);
    if let Some(fix) = &f.finding.suggestion {
        body.push_str(&format!("\nProposed fix:\n```\n{fix}\n```\n"));
    }
    body.push_str(&format!("\n{}", inline_marker(&f.fingerprint)));
    body
}

/// Render the summary body: verdict, category counts, visibility stats, and
/// the generation footer.
pub fn render_summary(counts: &CategoryCounts, verdict: Verdict, s: &SummaryInput<'_>) -> String {
    let mut body = format!(
        "## Code Review Summary\n\n**Overall assessment**: {}\n\n\
         | Category | Count |\n|---|---|\n\
         | Critical | {} |\n| High | {} |\n| Suggestion | {} |\n",
        verdict.as_str(),
        counts.critical,
        counts.high,
        counts.suggestion
    );
    if s.files_skipped_limit > 0 {
        body.push_str(&format!(
            "\n{} file(s) were skipped by the file limit and not analyzed.\n",
            s.files_skipped_limit
        ));
    }
    if s.files_truncated > 0 {
        body.push_str(&format!("\n{} file(s) were truncated.\n", s.files_truncated));
    }
    if s.degraded_units > 0 {
        body.push_str(&format!(
            "\n{} unit(s) could not be analyzed.\n",
            s.degraded_units
        ));
    }
    let hash = body_hash(&body);
    body.push_str(&format!(
        "\n---\n**Files reviewed:** {} | **Model:** {} | {}\n{}\n",
        s.files_reviewed,
        s.model,
        Utc::now().format("%Y-%m-%d %H:%M UTC"),
        summary_marker(&hash)
    ));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{AnchoredFinding, DiffPosition, fingerprint};
    use crate::review::parse::{Category, ReviewFinding};

    fn anchored(category: Category, line: u32, message: &str) -> AnchoredFinding {
        let finding = ReviewFinding {
            category,
            path: "src/app.rs".into(),
            line,
            message: message.into(),
            suggestion: None,
        };
        let fp = fingerprint(&finding);
        AnchoredFinding {
            finding,
            position: DiffPosition {
                hunk_index: 0,
                offset: 0,
            },
            fingerprint: fp,
        }
    }

    fn thread_for(f: &AnchoredFinding, id: u64, resolved: bool) -> CommentThread {
        CommentThread {
            id,
            body: render_inline_body(f),
            resolved,
        }
    }

    #[test]
    fn fresh_findings_all_create() {
        let findings = vec![anchored(Category::High, 10, "a"), anchored(Category::Critical, 11, "b")];
        let plan = plan_threads(&findings, &[]);
        assert_eq!(plan.create.len(), 2);
        assert!(plan.keep.is_empty());
        assert!(plan.resolve.is_empty());
    }

    #[test]
    fn second_run_with_same_findings_creates_nothing() {
        let findings = vec![anchored(Category::High, 10, "a"), anchored(Category::Suggestion, 12, "c")];
        // First run created these threads.
        let existing: Vec<_> = findings
            .iter()
            .enumerate()
            .map(|(i, f)| thread_for(f, i as u64 + 1, false))
            .collect();
        let plan = plan_threads(&findings, &existing);
        assert!(plan.create.is_empty());
        assert_eq!(plan.keep.len(), 2);
        assert!(plan.resolve.is_empty());
    }

    #[test]
    fn fixed_issue_resolves_and_leaves_verdict() {
        // Run 1 posted a critical; run 2 no longer reports it.
        let old = anchored(Category::Critical, 10, "overflow");
        let existing = vec![thread_for(&old, 7, false)];
        let still = vec![anchored(Category::Suggestion, 20, "style")];
        let plan = plan_threads(&still, &existing);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(
            plan.resolve,
            vec![PlannedResolve {
                thread_id: 7,
                fingerprint: old.fingerprint.clone()
            }]
        );
        // The resolved critical does not count toward the new verdict.
        assert_eq!(compute_verdict(&plan.open_counts()), Verdict::ApproveWithComments);
    }

    #[test]
    fn externally_resolved_thread_suppresses_recreation() {
        let f = anchored(Category::High, 10, "a");
        let existing = vec![thread_for(&f, 3, true)];
        let plan = plan_threads(&[f], &existing);
        assert!(plan.create.is_empty());
        assert!(plan.keep.is_empty());
        assert_eq!(plan.suppressed.len(), 1);
        assert_eq!(plan.open_counts().total(), 0);
    }

    #[test]
    fn human_threads_are_never_touched() {
        let existing = vec![CommentThread {
            id: 42,
            body: "Please rename this variable".into(),
            resolved: false,
        }];
        let plan = plan_threads(&[], &existing);
        assert!(plan.resolve.is_empty());
    }

    #[test]
    fn one_thread_per_fingerprint() {
        // Dedup collapses duplicates upstream, but the planner is defensive
        // about raw input too.
        let f = anchored(Category::High, 10, "dup");
        let plan = plan_threads(&[f.clone(), f.clone()], &[]);
        assert_eq!(plan.create.len(), 1);
    }

    #[test]
    fn marker_roundtrip() {
        let f = anchored(Category::Critical, 5, "m");
        let body = render_inline_body(&f);
        assert_eq!(extract_fingerprint(&body), Some(f.fingerprint.clone()));
        assert!(extract_fingerprint("no marker here").is_none());
    }

    #[test]
    fn summary_hash_survives_timestamp() {
        let counts = CategoryCounts {
            critical: 1,
            high: 0,
            suggestion: 2,
        };
        let s = SummaryInput {
            files_reviewed: 3,
            files_skipped_limit: 0,
            files_truncated: 1,
            degraded_units: 0,
            model: "m",
        };
        let a = render_summary(&counts, Verdict::RequestChanges, &s);
        let b = render_summary(&counts, Verdict::RequestChanges, &s);
        // Timestamps may differ; the embedded hash must not.
        assert_eq!(extract_summary_hash(&a), extract_summary_hash(&b));
        assert!(a.contains("request-changes"));
    }
}
