//! Crate-wide error hierarchy for pr-reviewer.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Provider-aware mapping (401→Unauthorized, 429→RateLimited, 5xx→Server, etc.).
//! - No dynamic dispatch, no async-trait, ergonomic `?` via `From` impls.
//!
//! Scoping rules (see also `RunOutcome`):
//! - Per-file failures (`MalformedDiff`) and per-unit failures (LLM errors,
//!   `SchemaInvalid`) never abort the run; they are recorded against the file.
//! - Only `SourceUnavailable` at pipeline start and a failure to post the
//!   summary comment are run-fatal.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type RvResult<T> = Result<T, Error>;

/// Root error type for the pr-reviewer crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The upstream diff could not be retrieved at all (run-fatal).
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] ProviderError),

    /// Source-control REST failure outside of the initial diff fetch.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// LLM call failure that survived the per-unit retry policy.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Diff or model-output parsing failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Configuration problems (missing tokens, bad base URL, etc.).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Thread already resolved/locked externally. Logged and skipped by the
    /// publisher; surfaces only when the caller asks for strict handling.
    #[error("publish conflict on thread {0}")]
    PublishConflict(u64),

    /// Input validation errors (bad IDs, impossible limits, etc.).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Detailed provider-specific error used inside the REST layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (4xx/3xx) not covered above.
    #[error("http status error: {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// JSON deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unexpected/invalid shape of provider response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// LLM call errors, split by retryability (see the invoker's retry policy).
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP 429 from the model endpoint. Retried with exponential backoff.
    #[error("llm rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 5xx or unexpected status from the model endpoint. Retried once.
    #[error("llm provider error: status {0}")]
    Provider(u16),

    /// Transport timeout. Retried once with a shortened excerpt when the
    /// unit was oversized, surfaced otherwise.
    #[error("llm timeout")]
    Timeout,

    /// Network/transport failure without status.
    #[error("llm network error: {0}")]
    Network(String),

    /// Response body did not match the expected completion shape.
    #[error("llm decode error: {0}")]
    Decode(String),
}

/// Diff / model-output parser errors.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A `@@` hunk header could not be parsed (MalformedDiff for the file).
    #[error("invalid hunk header: {0}")]
    InvalidHunkHeader(String),

    /// A hunk violated line-number monotonicity.
    #[error("non-monotonic line numbers in hunk at old_start {0}")]
    NonMonotonicHunk(u32),

    /// Model output failed strict schema validation.
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),
}

/// Configuration and setup errors (base API URL, missing token, etc.).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(ProviderError::from(e))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => ProviderError::Unauthorized,
                403 => ProviderError::Forbidden,
                404 => ProviderError::NotFound,
                429 => ProviderError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => ProviderError::Server(code),
                _ => ProviderError::HttpStatus(code),
            };
        }
        ProviderError::Network(e.to_string())
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return LlmError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                429 => LlmError::RateLimited {
                    retry_after_secs: None,
                },
                _ => LlmError::Provider(code),
            };
        }
        LlmError::Network(e.to_string())
    }
}

impl LlmError {
    /// True when the retry policy may attempt the same call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Provider(500..=599)
                | LlmError::Timeout
                | LlmError::Network(_)
        )
    }
}
