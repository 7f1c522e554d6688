//! Provider facade w/o async-trait or dynamic trait objects.
//!
//! We expose an enum `ProviderClient` with concrete implementations per
//! provider. This keeps async fns simple and avoids boxing futures. Azure
//! DevOps is the only host wired today; the facade is where a second one
//! would plug in.

pub mod types;
pub use types::*;

pub mod azure;

use crate::errors::{ConfigError, Error, RvResult};

/// Runtime configuration for any provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Access token for the provider (pipeline system token or PAT).
    pub token: String,
}

/// Concrete provider client (enum-dispatch).
#[derive(Debug, Clone)]
pub enum ProviderClient {
    AzureDevOps(azure::AzureDevOpsClient),
}

impl ProviderClient {
    /// Constructs a concrete client from generic config.
    pub fn from_config(cfg: ProviderConfig) -> RvResult<Self> {
        if cfg.token.is_empty() {
            return Err(Error::Config(ConfigError::MissingEnv("SYSTEM_ACCESSTOKEN")));
        }
        let client = reqwest::Client::builder()
            .user_agent("pr-reviewer/0.1")
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self::AzureDevOps(azure::AzureDevOpsClient::new(
            client, cfg.token,
        )))
    }

    /// Fetch PR metadata + latest iteration (cheap; binds inline threads).
    pub async fn fetch_context(&self, id: &PullRequestId) -> RvResult<PullRequestContext> {
        match self {
            Self::AzureDevOps(c) => c.get_context(id).await,
        }
    }

    /// Fetch the normalized change set for the run's iteration.
    pub async fn fetch_changes(&self, ctx: &PullRequestContext) -> RvResult<ChangeSet> {
        match self {
            Self::AzureDevOps(c) => c.get_changes(ctx).await,
        }
    }

    /// List existing comment threads (publisher idempotency state).
    pub async fn list_threads(&self, id: &PullRequestId) -> RvResult<Vec<CommentThread>> {
        match self {
            Self::AzureDevOps(c) => c.list_threads(id).await,
        }
    }

    /// Create a PR-level summary thread; returns the thread id.
    pub async fn create_summary_thread(
        &self,
        id: &PullRequestId,
        body: &str,
    ) -> RvResult<u64> {
        match self {
            Self::AzureDevOps(c) => c.create_summary_thread(id, body).await,
        }
    }

    /// Create an inline thread anchored to a new-file line.
    pub async fn create_inline_thread(
        &self,
        ctx: &PullRequestContext,
        path: &str,
        line: u32,
        body: &str,
    ) -> RvResult<u64> {
        match self {
            Self::AzureDevOps(c) => c.create_inline_thread(ctx, path, line, body).await,
        }
    }

    /// Resolve an existing thread. `Error::PublishConflict` means it was
    /// resolved/locked externally.
    pub async fn resolve_thread(&self, id: &PullRequestId, thread_id: u64) -> RvResult<()> {
        match self {
            Self::AzureDevOps(c) => c.resolve_thread(id, thread_id).await,
        }
    }
}
