//! Thin OpenAI-compatible chat client (non-streaming).
//!
//! One analysis call per review unit: system instruction + the unit's diff
//! excerpt. Errors are normalized into `LlmError` with a distinguishable
//! retryable kind so the invoker can apply its retry policy.

use std::time::Duration;

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ConfigError, Error, LlmError, RvResult};

/// Model endpoint configuration. The model string is passed through
/// opaquely; this crate does not embed model-choice policy.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base endpoint, e.g. "https://api.openai.com".
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Load from environment: `OPENAI_API_KEY` (required), `OPENAI_MODEL`,
    /// `OPENAI_BASE_URL`, `PR_REVIEWER_LLM_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| ConfigError::MissingEnv("OPENAI_API_KEY"))?;
        Ok(Self {
            endpoint: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: 0.3,
            max_tokens: 4000,
            timeout_secs: std::env::var("PR_REVIEWER_LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        })
    }
}

/// Preconfigured chat-completions client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    cfg: LlmConfig,
    url_chat: String,
}

impl LlmClient {
    /// Validates the endpoint scheme and builds an HTTP client with auth
    /// headers and a per-call timeout.
    pub fn new(cfg: LlmConfig) -> RvResult<Self> {
        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::Config(ConfigError::InvalidBaseUrl(
                cfg.endpoint.clone(),
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))
                .map_err(|e| Error::Validation(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .default_headers(headers)
            .build()?;

        let url_chat = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));
        Ok(Self {
            http,
            cfg,
            url_chat,
        })
    }

    /// One non-streaming completion: system instruction + user content.
    /// Returns the raw assistant text; schema validation is the parser's job.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: RespMsg,
        }
        #[derive(Deserialize)]
        struct RespMsg {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        debug!("llm.complete model={} url={}", self.cfg.model, self.url_chat);
        let resp = self
            .http
            .post(&self.url_chat)
            .json(&Req {
                model: &self.cfg.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: self.cfg.temperature,
                max_tokens: self.cfg.max_tokens,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let code = status.as_u16();
            if code == 429 {
                let retry_after_secs = resp
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(LlmError::RateLimited { retry_after_secs });
            }
            return Err(LlmError::Provider(code));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Decode("completion has no content".into()))
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }
}
