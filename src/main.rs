//! CI task wrapper around the pr-reviewer pipeline.
//!
//! Reads the harness contract from the environment, runs one review, prints
//! the outcome, and maps the result onto a terminal exit status. With
//! `CONTINUE_ON_ERROR=true` a pipeline-level failure exits 0 with a warning
//! instead of failing the hosting job; per-unit failures never fail the job
//! either way.

use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pr_reviewer::config::ReviewConfig;
use pr_reviewer::errors::ConfigError;
use pr_reviewer::provider::ProviderConfig;
use pr_reviewer::provider::types::PullRequestId;
use pr_reviewer::review::llm::LlmConfig;
use pr_reviewer::run_review;

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional outside of local runs; pipelines inject real env.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cfg = ReviewConfig::from_env();

    let (provider_cfg, pr, llm_cfg) = match load_harness_env() {
        Ok(v) => v,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "starting review for PR {} in {}/{}",
        pr.number, pr.project, pr.repo
    );

    match run_review(provider_cfg, pr, llm_cfg, cfg.clone()).await {
        Ok(outcome) => {
            info!(
                "review done: verdict={} critical={} high={} suggestion={} \
                 created={} kept={} resolved={}",
                outcome.verdict.as_str(),
                outcome.counts.critical,
                outcome.counts.high,
                outcome.counts.suggestion,
                outcome.threads_created,
                outcome.threads_kept,
                outcome.threads_resolved,
            );
            for f in &outcome.skipped_limit {
                info!("skipped (file limit): {f}");
            }
            for f in &outcome.truncated {
                info!("truncated: {f}");
            }
            for d in &outcome.degraded_units {
                warn!("analysis unavailable: {} ({})", d.path, d.detail);
            }
            for m in &outcome.malformed {
                warn!("malformed diff: {} ({})", m.path, m.detail);
            }
            for line in &outcome.diagnostics {
                info!("debug: {line}");
            }
            ExitCode::SUCCESS
        }
        Err(e) if cfg.continue_on_error => {
            warn!("review failed (continue-on-error): {e}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("review failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Assemble the harness-provided identifiers and credentials.
///
/// Required: `SYSTEM_ACCESSTOKEN`, `OPENAI_API_KEY`, `PR_ID`, `ORG_URL`,
/// `PROJECT`, `REPO_ID`.
fn load_harness_env() -> Result<(ProviderConfig, PullRequestId, LlmConfig), ConfigError> {
    fn required(key: &'static str) -> Result<String, ConfigError> {
        std::env::var(key).map_err(|_| ConfigError::MissingEnv(key))
    }

    let token = required("SYSTEM_ACCESSTOKEN")?;
    let pr = PullRequestId {
        org_url: required("ORG_URL")?.trim_end_matches('/').to_string(),
        project: required("PROJECT")?,
        repo: required("REPO_ID")?,
        number: required("PR_ID")?
            .parse()
            .map_err(|_| ConfigError::MissingEnv("PR_ID"))?,
    };
    let llm = LlmConfig::from_env()?;
    Ok((ProviderConfig { token }, pr, llm))
}
