//! Review Invoker: one LLM call per unit, under a bounded worker pool.
//!
//! Retry policy (per unit):
//! - `RateLimited` → exponential backoff with jitter, bounded attempts;
//! - `Provider`    → retry once, then surface;
//! - `Timeout`     → retry once with a shortened excerpt when the unit is
//!                   oversized, else surface;
//! - `SchemaInvalid` output → one repair attempt with a stricter
//!   instruction, then the unit degrades to "analysis unavailable".
//!
//! A failure on one unit never aborts the others; failures are collected and
//! attributed to their originating file. Workers send results into a single
//! collector (message passing, no shared counters), and the whole run is
//! cancellable via an overall deadline: completed units keep their results,
//! in-flight units are abandoned and counted as unavailable.

pub mod llm;
pub mod parse;
pub mod prompt;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

use crate::chunk::ReviewUnit;
use crate::errors::{LlmError, ParseError};
use llm::LlmClient;
use parse::{ParsedFindings, parse_findings};

const INITIAL_DELAY_MS: u64 = 500;
const BACKOFF_FACTOR: f64 = 2.0;

/// Invoker knobs, derived from `ReviewConfig` by the pipeline.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Worker pool size.
    pub concurrency: usize,
    /// Bounded attempts for rate-limited calls (first try included).
    pub max_rate_limit_attempts: u32,
    /// Overall deadline for the whole unit phase.
    pub deadline: Option<Duration>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_rate_limit_attempts: 4,
            deadline: None,
        }
    }
}

/// Result of analyzing one unit.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Reviewed {
        findings: Vec<parse::ReviewFinding>,
        dropped_out_of_unit: usize,
    },
    /// Analysis unavailable; the reason is surfaced in the run outcome.
    Degraded { reason: String },
}

/// Per-unit report, attributed to its originating file.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit_id: usize,
    pub path: String,
    pub outcome: UnitOutcome,
}

/// Analyze all units with bounded parallelism.
///
/// Reports come back ordered by unit id, which preserves diff order within a
/// file so downstream first-occurrence deduplication is deterministic.
pub async fn review_units(
    client: &LlmClient,
    units: &[ReviewUnit],
    cfg: &InvokerConfig,
) -> Vec<UnitReport> {
    if units.is_empty() {
        return Vec::new();
    }

    let sem = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<UnitReport>(units.len());
    let deadline_at = cfg.deadline.map(|d| Instant::now() + d);

    for unit in units {
        let client = client.clone();
        let unit = unit.clone();
        let cfg = cfg.clone();
        let sem = sem.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore closed");
            let report = review_one(&client, &unit, &cfg).await;
            // Receiver may be gone after the deadline; that is fine.
            let _ = tx.send(report).await;
        });
    }
    drop(tx);

    let mut by_id: HashMap<usize, UnitReport> = HashMap::with_capacity(units.len());
    loop {
        let received = match deadline_at {
            Some(at) => match tokio::time::timeout_at(at.into(), rx.recv()).await {
                Ok(r) => r,
                Err(_) => {
                    warn!("invoke: deadline reached, abandoning in-flight units");
                    break;
                }
            },
            None => rx.recv().await,
        };
        match received {
            Some(r) => {
                by_id.insert(r.unit_id, r);
                if by_id.len() == units.len() {
                    break;
                }
            }
            None => break,
        }
    }

    // Everything without a collected result was abandoned.
    let mut out: Vec<UnitReport> = units
        .iter()
        .map(|u| {
            by_id.remove(&u.id).unwrap_or_else(|| UnitReport {
                unit_id: u.id,
                path: u.path.clone(),
                outcome: UnitOutcome::Degraded {
                    reason: "deadline exceeded; analysis unavailable".into(),
                },
            })
        })
        .collect();
    out.sort_by_key(|r| r.unit_id);
    out
}

/// Run the retry/repair loop for one unit.
async fn review_one(client: &LlmClient, unit: &ReviewUnit, cfg: &InvokerConfig) -> UnitReport {
    let mut state = RetryState::default();
    let mut excerpt = unit.excerpt.clone();
    let mut repair = false;

    let outcome = loop {
        let system = if repair {
            format!(
                "{}{}",
                prompt::SYSTEM_INSTRUCTIONS,
                prompt::STRICT_RETRY_SUFFIX
            )
        } else {
            prompt::SYSTEM_INSTRUCTIONS.to_string()
        };
        let user = prompt::build_unit_prompt(unit, &excerpt);

        let raw = match client.complete(&system, &user).await {
            Ok(raw) => raw,
            Err(e) => match next_action(&e, &mut state, unit.oversized, cfg) {
                Action::Sleep(d) => {
                    debug!(
                        "invoke: unit={} rate limited, backing off {}ms",
                        unit.id,
                        d.as_millis()
                    );
                    tokio::time::sleep(d).await;
                    continue;
                }
                Action::Retry => {
                    debug!("invoke: unit={} retrying after {}", unit.id, e);
                    continue;
                }
                Action::RetryShortened => {
                    debug!("invoke: unit={} oversized timeout, shortening", unit.id);
                    excerpt = unit.shortened_excerpt();
                    continue;
                }
                Action::GiveUp => {
                    break UnitOutcome::Degraded {
                        reason: format!("analysis unavailable: {e}"),
                    };
                }
            },
        };

        match parse_findings(&raw, unit) {
            Ok(ParsedFindings {
                findings,
                dropped_out_of_unit,
            }) => {
                break UnitOutcome::Reviewed {
                    findings,
                    dropped_out_of_unit,
                };
            }
            Err(ParseError::SchemaInvalid(detail)) if !repair => {
                // One repair attempt with the stricter instruction.
                debug!("invoke: unit={} schema invalid ({}), repairing", unit.id, detail);
                repair = true;
                continue;
            }
            Err(e) => {
                break UnitOutcome::Degraded {
                    reason: format!("analysis unavailable: {e}"),
                };
            }
        }
    };

    UnitReport {
        unit_id: unit.id,
        path: unit.path.clone(),
        outcome,
    }
}

/// Mutable retry bookkeeping for one unit.
#[derive(Debug, Default)]
struct RetryState {
    rate_limit_attempts: u32,
    provider_retried: bool,
    timeout_retried: bool,
}

/// What to do about an LLM error, given the retry budget so far.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Sleep(Duration),
    Retry,
    RetryShortened,
    GiveUp,
}

fn next_action(
    err: &LlmError,
    state: &mut RetryState,
    oversized: bool,
    cfg: &InvokerConfig,
) -> Action {
    match err {
        LlmError::RateLimited { retry_after_secs } => {
            state.rate_limit_attempts += 1;
            if state.rate_limit_attempts >= cfg.max_rate_limit_attempts {
                return Action::GiveUp;
            }
            let d = retry_after_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| backoff(state.rate_limit_attempts));
            Action::Sleep(d)
        }
        LlmError::Provider(code) if (500..=599).contains(code) => {
            if state.provider_retried {
                return Action::GiveUp;
            }
            state.provider_retried = true;
            Action::Retry
        }
        // A timed-out oversized unit gets one retry with a shortened
        // excerpt; an ordinary timeout surfaces as-is.
        LlmError::Timeout => {
            if oversized && !state.timeout_retried {
                state.timeout_retried = true;
                Action::RetryShortened
            } else {
                Action::GiveUp
            }
        }
        LlmError::Network(_) => {
            if state.timeout_retried {
                return Action::GiveUp;
            }
            state.timeout_retried = true;
            Action::Retry
        }
        // Non-retryable statuses and decode failures surface immediately.
        _ => Action::GiveUp,
    }
}

/// Exponential backoff with multiplicative jitter.
fn backoff(attempt: u32) -> Duration {
    let exp = BACKOFF_FACTOR.powi(attempt.saturating_sub(1) as i32);
    let base = (INITIAL_DELAY_MS as f64 * exp) as u64;
    let jitter = rand::rng().random_range(0.9..1.1);
    Duration::from_millis((base as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> InvokerConfig {
        InvokerConfig {
            concurrency: 2,
            max_rate_limit_attempts: 3,
            deadline: None,
        }
    }

    #[test]
    fn rate_limit_backs_off_then_gives_up() {
        let mut st = RetryState::default();
        let c = cfg();
        let err = LlmError::RateLimited {
            retry_after_secs: None,
        };
        assert!(matches!(next_action(&err, &mut st, false, &c), Action::Sleep(_)));
        assert!(matches!(next_action(&err, &mut st, false, &c), Action::Sleep(_)));
        assert_eq!(next_action(&err, &mut st, false, &c), Action::GiveUp);
    }

    #[test]
    fn retry_after_header_wins_over_backoff() {
        let mut st = RetryState::default();
        let err = LlmError::RateLimited {
            retry_after_secs: Some(7),
        };
        match next_action(&err, &mut st, false, &cfg()) {
            Action::Sleep(d) => assert_eq!(d, Duration::from_secs(7)),
            other => panic!("expected sleep, got {other:?}"),
        }
    }

    #[test]
    fn provider_error_retries_exactly_once() {
        let mut st = RetryState::default();
        let c = cfg();
        let err = LlmError::Provider(503);
        assert_eq!(next_action(&err, &mut st, false, &c), Action::Retry);
        assert_eq!(next_action(&err, &mut st, false, &c), Action::GiveUp);
    }

    #[test]
    fn non_retryable_status_surfaces_immediately() {
        let mut st = RetryState::default();
        assert_eq!(
            next_action(&LlmError::Provider(400), &mut st, false, &cfg()),
            Action::GiveUp
        );
    }

    #[test]
    fn oversized_timeout_retries_shortened() {
        let mut st = RetryState::default();
        let c = cfg();
        assert_eq!(
            next_action(&LlmError::Timeout, &mut st, true, &c),
            Action::RetryShortened
        );
        assert_eq!(next_action(&LlmError::Timeout, &mut st, true, &c), Action::GiveUp);
    }

    #[test]
    fn normal_timeout_surfaces_without_retry() {
        let mut st = RetryState::default();
        assert_eq!(
            next_action(&LlmError::Timeout, &mut st, false, &cfg()),
            Action::GiveUp
        );
    }

    #[test]
    fn network_error_retries_once() {
        let mut st = RetryState::default();
        let c = cfg();
        let err = LlmError::Network("connection reset".into());
        assert_eq!(next_action(&err, &mut st, false, &c), Action::Retry);
        assert_eq!(next_action(&err, &mut st, false, &c), Action::GiveUp);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        // Jitter is ±10%, so comparing attempt 1 to attempt 3 is safe.
        let a1 = backoff(1);
        let a3 = backoff(3);
        assert!(a3 > a1);
        assert!(a1 >= Duration::from_millis(400));
    }
}
