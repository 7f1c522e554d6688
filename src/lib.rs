//! Public entry for the pr-reviewer pipeline.
//!
//! Single high-level function to run the whole diff-to-review pipeline for a
//! pull request.
//!
//! 1) **Step 1 — Diff acquisition + normalization**
//!    - Fetch PR metadata and the latest iteration
//!    - Fetch change entries and normalize into hunks/lines
//!    - Binary/deleted/skip-pattern files set aside, malformed diffs recorded
//!
//! 2) **Step 2 — Selection**
//!    - Order files by changed-line count, cap at `max_files`
//!    - Truncate oversized files to `max_lines_per_file` in hunk order
//!
//! 3) **Step 3 — Chunking**
//!    - Pack hunks into review units under the line budget
//!    - Oversized hunks become their own flagged unit
//!
//! 4) **Step 4 — Invocation + parsing**
//!    - Bounded worker pool, per-unit retry policy, overall deadline
//!    - Strict schema validation with one repair attempt per unit
//!
//! 5) **Step 5 — Mapping + dedup**
//!    - Anchor findings onto diff positions, count the unanchorable
//!    - Collapse identical fingerprints, first occurrence wins
//!
//! 6) **Step 6 — Publication**
//!    - Three-way thread plan (create / keep / resolve), summary + verdict
//!
//! The pipeline uses `tracing` for debug logging and avoids `async-trait`
//! and heap trait objects (no `Box<dyn ...>`). It relies on plain `async fn`
//! and enum dispatch over thin provider/LLM clients.

pub mod chunk;
pub mod config;
pub mod errors;
pub mod map;
pub mod outcome;
pub mod parser;
pub mod provider;
pub mod publish;
pub mod review;
pub mod select;

use std::time::Instant;

use tracing::debug;

use config::ReviewConfig;
use errors::{Error, RvResult};
use outcome::RunOutcome;
use provider::types::{FileIssue, PullRequestId};
use provider::{ProviderClient, ProviderConfig};
use review::llm::{LlmClient, LlmConfig};
use review::{InvokerConfig, UnitOutcome};

/// Run the whole pipeline for a single pull request.
///
/// Only two failures are run-fatal: the diff being unavailable at the start
/// (`SourceUnavailable`) and the publisher failing to post even the summary.
/// Everything scoped to one file or one unit is recorded in the returned
/// [`RunOutcome`] and never aborts the run.
pub async fn run_review(
    provider_cfg: ProviderConfig,
    pr: PullRequestId,
    llm_cfg: LlmConfig,
    cfg: ReviewConfig,
) -> RvResult<RunOutcome> {
    // ---------------------------
    // Step 1: acquisition + normalization
    // ---------------------------
    let t0 = Instant::now();
    debug!("step1: init provider client");
    let client = ProviderClient::from_config(provider_cfg)?;

    debug!("step1: fetch context (latest iteration)");
    let ctx = client
        .fetch_context(&pr)
        .await
        .map_err(as_source_unavailable)?;
    debug!(
        "step1: context ok iteration={} source={}",
        ctx.iteration_id,
        &ctx.source_commit[..ctx.source_commit.len().min(8)]
    );

    debug!("step1: fetch + normalize changes");
    let changes = client
        .fetch_changes(&ctx)
        .await
        .map_err(as_source_unavailable)?;
    let files_changed = changes.files.len() + changes.skipped.len() + changes.malformed.len();
    debug!(
        "step1: normalized files={} skipped={} malformed={} ({} ms)",
        changes.files.len(),
        changes.skipped.len(),
        changes.malformed.len(),
        t0.elapsed().as_millis()
    );

    // ---------------------------
    // Step 2: selection
    // ---------------------------
    let t2 = Instant::now();
    // The line mapping anchors against the full normalized diff; the
    // selector only limits what the model gets to see.
    let mapping = map::LineMapping::build(&changes.files);
    let selection = select::select_files(changes.files, cfg.max_files, cfg.max_lines_per_file);
    let truncated: Vec<String> = selection
        .files
        .iter()
        .filter(|f| f.truncated)
        .map(|f| f.diff.path.clone())
        .collect();
    debug!(
        "step2: selected={} skipped_limit={} truncated={} ({} ms)",
        selection.files.len(),
        selection.skipped_limit.len(),
        truncated.len(),
        t2.elapsed().as_millis()
    );

    // ---------------------------
    // Step 3: chunking
    // ---------------------------
    let units = chunk::build_units(&selection, cfg.unit_budget_lines);
    debug!(
        "step3: units={} oversized={}",
        units.len(),
        units.iter().filter(|u| u.oversized).count()
    );

    // ---------------------------
    // Step 4: invocation + parsing
    // ---------------------------
    let t4 = Instant::now();
    let llm = LlmClient::new(llm_cfg)?;
    let invoker = InvokerConfig {
        concurrency: cfg.concurrency,
        max_rate_limit_attempts: 4,
        deadline: cfg.deadline_secs.map(std::time::Duration::from_secs),
    };
    let reports = review::review_units(&llm, &units, &invoker).await;
    let degraded_units: Vec<FileIssue> = reports
        .iter()
        .filter_map(|r| match &r.outcome {
            UnitOutcome::Degraded { reason } => Some(FileIssue {
                path: r.path.clone(),
                detail: reason.clone(),
            }),
            _ => None,
        })
        .collect();
    let dropped_out_of_unit: usize = reports
        .iter()
        .filter_map(|r| match &r.outcome {
            UnitOutcome::Reviewed {
                dropped_out_of_unit,
                ..
            } => Some(*dropped_out_of_unit),
            _ => None,
        })
        .sum();
    debug!(
        "step4: reports={} degraded={} dropped_out_of_unit={} ({} ms)",
        reports.len(),
        degraded_units.len(),
        dropped_out_of_unit,
        t4.elapsed().as_millis()
    );

    // ---------------------------
    // Step 5: mapping + dedup
    // ---------------------------
    let mapped = map::anchor_and_dedup(&mapping, &reports);
    debug!(
        "step5: anchored={} unanchored={} duplicates={}",
        mapped.anchored.len(),
        mapped.unanchored,
        mapped.duplicates
    );

    // ---------------------------
    // Step 6: publication
    // ---------------------------
    let existing = client.list_threads(&pr).await?;
    let plan = publish::plan_threads(&mapped.anchored, &existing);
    let summary = publish::SummaryInput {
        files_reviewed: selection.files.len(),
        files_skipped_limit: selection.skipped_limit.len(),
        files_truncated: truncated.len(),
        degraded_units: degraded_units.len(),
        model: llm.model(),
    };
    let report = publish::publish(&client, &ctx, &plan, &existing, &summary).await?;

    let mut diagnostics = Vec::new();
    if cfg.debug {
        diagnostics.push(format!("line mapping entries: {}", mapping.len()));
        for u in &units {
            diagnostics.push(format!(
                "unit {} path={} lines={} oversized={}",
                u.id, u.path, u.line_count, u.oversized
            ));
        }
    }

    Ok(RunOutcome {
        verdict: report.verdict,
        counts: report.counts,
        files_changed,
        files_selected: selection.files.len(),
        skipped: changes.skipped,
        skipped_limit: selection.skipped_limit,
        truncated,
        malformed: changes.malformed,
        degraded_units,
        unanchored: mapped.unanchored,
        dropped_out_of_unit,
        duplicates: mapped.duplicates,
        threads_created: report.created,
        threads_kept: report.kept,
        threads_resolved: report.resolved,
        publish_conflicts: report.conflicts,
        diagnostics,
    })
}

/// Provider failures during initial acquisition mean there is no diff to
/// review at all.
fn as_source_unavailable(e: Error) -> Error {
    match e {
        Error::Provider(pe) => Error::SourceUnavailable(pe),
        other => other,
    }
}

// -----------------------------------------------------------------------------
// Convenience re-exports for downstream users
// -----------------------------------------------------------------------------

pub use config::ReviewConfig as ReviewerConfig;
pub use outcome::{RunOutcome as ReviewerRunOutcome, Verdict as ReviewerVerdict};
pub use provider::{ProviderConfig as ReviewerProviderConfig, types::PullRequestId as ReviewerPullRequestId};
pub use review::llm::LlmConfig as ReviewerLlmConfig;
