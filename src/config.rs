//! Pipeline configuration (recognized options + env loading).
//!
//! Defaults follow the task contract: `max_files=50`, `max_lines_per_file=1000`.
//! All knobs are overridable through environment variables so the CI harness
//! can tune a run without code changes.

/// Knobs recognized by the pipeline.
///
/// `debug` only increases diagnostic detail in the run outcome; it never
/// changes selection, chunking, or publishing behavior.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Maximum number of files submitted for analysis (selector cap).
    pub max_files: usize,
    /// Maximum diff lines retained per file (selector truncation limit).
    pub max_lines_per_file: usize,
    /// Maximum lines per review unit (chunker budget; independent of the
    /// model token limit, which is layered on top by the endpoint).
    pub unit_budget_lines: usize,
    /// Worker pool size for LLM calls.
    pub concurrency: usize,
    /// Overall run deadline in seconds; `None` disables cancellation.
    pub deadline_secs: Option<u64>,
    /// Include extra diagnostics in the run outcome.
    pub debug: bool,
    /// Surface pipeline-level failures as a soft warning instead of a hard
    /// failure. Per-unit failures are always tolerated regardless.
    pub continue_on_error: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_files: 50,
            max_lines_per_file: 1000,
            unit_budget_lines: 300,
            concurrency: 4,
            deadline_secs: None,
            debug: false,
            continue_on_error: false,
        }
    }
}

impl ReviewConfig {
    /// Load from environment, falling back to defaults.
    ///
    /// Recognized variables: `MAX_FILES`, `MAX_LINES_PER_FILE`, `DEBUG`,
    /// `CONTINUE_ON_ERROR`, `PR_REVIEWER_UNIT_BUDGET`,
    /// `PR_REVIEWER_CONCURRENCY`, `PR_REVIEWER_DEADLINE_SECS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_files: env_usize("MAX_FILES", d.max_files),
            max_lines_per_file: env_usize("MAX_LINES_PER_FILE", d.max_lines_per_file),
            unit_budget_lines: env_usize("PR_REVIEWER_UNIT_BUDGET", d.unit_budget_lines),
            concurrency: env_usize("PR_REVIEWER_CONCURRENCY", d.concurrency).max(1),
            deadline_secs: std::env::var("PR_REVIEWER_DEADLINE_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
            debug: env_bool("DEBUG", d.debug),
            continue_on_error: env_bool("CONTINUE_ON_ERROR", d.continue_on_error),
        }
    }
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_task_contract() {
        let c = ReviewConfig::default();
        assert_eq!(c.max_files, 50);
        assert_eq!(c.max_lines_per_file, 1000);
        assert!(!c.debug);
        assert!(!c.continue_on_error);
    }
}
