//! Azure DevOps provider (REST 7.1) for PR metadata, diffs, and threads.
//!
//! Endpoints used:
//! - GET   …/pullRequests/:id                          (branches)
//! - GET   …/pullRequests/:id/iterations               (latest iteration + SHAs)
//! - GET   …/pullRequests/:id/iterations/:it/changes   (change entries + diffs)
//! - GET   …/pullRequests/:id/threads                  (idempotency state)
//! - POST  …/pullRequests/:id/threads                  (summary / inline)
//! - PATCH …/pullRequests/:id/threads/:tid             (resolve)
//!
//! Normalization into hunks happens here at fetch time; downstream stages
//! only ever see `FileDiff`s.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{Error, ProviderError, RvResult};
use crate::parser::{looks_like_binary_patch, parse_unified_diff};
use crate::provider::types::*;

/// Path fragments that are never worth model attention (lockfiles, bundles,
/// generated output). Matched as plain substrings of the repo path.
const SKIP_PATTERNS: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    ".min.js",
    ".min.css",
    ".bundle.js",
    "dist/",
    "build/",
    "node_modules/",
    ".generated.",
    ".Designer.cs",
    "migrations/",
    "__pycache__/",
];

#[derive(Debug, Clone)]
pub struct AzureDevOpsClient {
    http: Client,
    token: String, // Bearer (SYSTEM_ACCESSTOKEN in pipelines)
}

impl AzureDevOpsClient {
    pub fn new(http: Client, token: String) -> Self {
        Self { http, token }
    }

    fn repo_base(&self, id: &PullRequestId) -> String {
        format!(
            "{}/{}/_apis/git/repositories/{}",
            id.org_url.trim_end_matches('/'),
            urlencoding::encode(&id.project),
            urlencoding::encode(&id.repo)
        )
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.token)
    }

    /// Fetches PR metadata and the latest iteration, forming the per-run
    /// context. The latest iteration is what inline threads bind to.
    pub async fn get_context(&self, id: &PullRequestId) -> RvResult<PullRequestContext> {
        let base = self.repo_base(id);

        let url = format!("{base}/pullRequests/{}?api-version=7.1", id.number);
        let meta: AzPullRequest = self
            .auth(self.http.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;

        let url = format!("{base}/pullRequests/{}/iterations?api-version=7.1", id.number);
        let iterations: AzValueList<AzIteration> = self
            .auth(self.http.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;

        let latest = iterations
            .value
            .into_iter()
            .max_by_key(|it| it.id)
            .ok_or_else(|| {
                Error::Provider(ProviderError::InvalidResponse(
                    "pull request has no iterations".into(),
                ))
            })?;

        Ok(PullRequestContext {
            id: id.clone(),
            iteration_id: latest.id,
            source_branch: Some(short_ref(&meta.source_ref_name)),
            target_branch: Some(short_ref(&meta.target_ref_name)),
            source_commit: latest.source_ref_commit.commit_id,
            target_commit: latest.target_ref_commit.commit_id,
            created_at: latest.created_date,
        })
    }

    /// Fetches the change entries of the context's iteration and normalizes
    /// them into a `ChangeSet`.
    ///
    /// Per-file parse failures become `malformed` records (the run goes on);
    /// binary, deleted, and skip-pattern files land in `skipped`.
    pub async fn get_changes(&self, ctx: &PullRequestContext) -> RvResult<ChangeSet> {
        let url = format!(
            "{}/pullRequests/{}/iterations/{}/changes?api-version=7.1",
            self.repo_base(&ctx.id),
            ctx.id.number,
            ctx.iteration_id
        );
        let resp: AzChanges = self
            .auth(self.http.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;

        let mut set = ChangeSet::default();
        for entry in resp.change_entries {
            if entry.item.is_folder.unwrap_or(false) {
                continue;
            }
            let path = entry.item.path.trim_start_matches('/').to_string();

            let kind = match entry.change_type.as_str() {
                "add" => ChangeKind::Added,
                "delete" => ChangeKind::Deleted,
                s if s.contains("rename") => ChangeKind::Renamed,
                _ => ChangeKind::Modified,
            };

            if kind == ChangeKind::Deleted {
                set.skipped.push(FileIssue {
                    path,
                    detail: "deleted".into(),
                });
                continue;
            }
            if let Some(pat) = SKIP_PATTERNS.iter().find(|p| path.contains(*p)) {
                set.skipped.push(FileIssue {
                    path,
                    detail: format!("skip pattern: {pat}"),
                });
                continue;
            }

            let is_binary = entry
                .diff
                .as_deref()
                .map(looks_like_binary_patch)
                .unwrap_or(true);
            if is_binary {
                set.skipped.push(FileIssue {
                    path,
                    detail: "binary".into(),
                });
                continue;
            }

            // Empty diff text still lists the file with zero hunks, so
            // downstream selection can see it was touched.
            let raw = entry.diff.unwrap_or_default();
            match parse_unified_diff(&raw) {
                Ok(hunks) => set.files.push(FileDiff {
                    path,
                    kind,
                    is_binary: false,
                    hunks,
                    raw_unidiff: Some(raw),
                }),
                Err(e) => {
                    debug!("normalize: malformed diff for {}: {}", path, e);
                    set.malformed.push(FileIssue {
                        path,
                        detail: e.to_string(),
                    });
                }
            }
        }
        Ok(set)
    }

    /// Lists all comment threads on the PR (idempotency state for the
    /// publisher). Deleted threads and threads without comments are dropped.
    pub async fn list_threads(&self, id: &PullRequestId) -> RvResult<Vec<CommentThread>> {
        let url = format!(
            "{}/pullRequests/{}/threads?api-version=7.1",
            self.repo_base(id),
            id.number
        );
        let resp: AzValueList<AzThread> = self
            .auth(self.http.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;

        let threads = resp
            .value
            .into_iter()
            .filter(|t| !t.is_deleted.unwrap_or(false))
            .filter_map(|t| {
                let body = t.comments.first().and_then(|c| c.content.clone())?;
                Some(CommentThread {
                    id: t.id,
                    body,
                    resolved: matches!(t.status.as_deref(), Some("fixed") | Some("closed")),
                })
            })
            .collect();
        Ok(threads)
    }

    /// Creates a PR-level (summary) thread. Returns the new thread id.
    pub async fn create_summary_thread(
        &self,
        id: &PullRequestId,
        body: &str,
    ) -> RvResult<u64> {
        let url = format!(
            "{}/pullRequests/{}/threads?api-version=7.1",
            self.repo_base(id),
            id.number
        );
        let req = serde_json::json!({
            "comments": [{ "parentCommentId": 0, "content": body, "commentType": 1 }],
            "status": 1,
        });
        let resp: AzThreadCreated = self
            .auth(self.http.post(url))
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;
        Ok(resp.id)
    }

    /// Creates an inline thread on `path` at `line` (new-file side).
    pub async fn create_inline_thread(
        &self,
        ctx: &PullRequestContext,
        path: &str,
        line: u32,
        body: &str,
    ) -> RvResult<u64> {
        let url = format!(
            "{}/pullRequests/{}/threads?api-version=7.1",
            self.repo_base(&ctx.id),
            ctx.id.number
        );
        // Azure expects a leading slash on thread file paths.
        let file_path = format!("/{}", path.trim_start_matches('/'));
        let req = serde_json::json!({
            "comments": [{ "parentCommentId": 0, "content": body, "commentType": 1 }],
            "status": 1,
            "threadContext": {
                "filePath": file_path,
                "rightFileStart": { "line": line, "offset": 1 },
                "rightFileEnd": { "line": line, "offset": 1 },
            },
            "pullRequestThreadContext": {
                "iterationContext": {
                    "firstComparingIteration": ctx.iteration_id,
                    "secondComparingIteration": ctx.iteration_id,
                }
            }
        });
        let resp: AzThreadCreated = self
            .auth(self.http.post(url))
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;
        Ok(resp.id)
    }

    /// Marks a thread resolved (`status: fixed`).
    ///
    /// A 409 means the thread was resolved or locked externally in the
    /// meantime; the caller treats that as `PublishConflict` (log + skip).
    pub async fn resolve_thread(&self, id: &PullRequestId, thread_id: u64) -> RvResult<()> {
        let url = format!(
            "{}/pullRequests/{}/threads/{}?api-version=7.1",
            self.repo_base(id),
            id.number,
            thread_id
        );
        let resp = self
            .auth(self.http.patch(url))
            .json(&serde_json::json!({ "status": "fixed" }))
            .send()
            .await?;

        if resp.status().as_u16() == 409 {
            return Err(Error::PublishConflict(thread_id));
        }
        resp.error_for_status()?;
        Ok(())
    }
}

/// "refs/heads/main" → "main".
fn short_ref(r: &str) -> String {
    r.trim_start_matches("refs/heads/").to_string()
}

// --- Azure DevOps response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct AzValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzPullRequest {
    source_ref_name: String,
    target_ref_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzIteration {
    id: u64,
    source_ref_commit: AzCommitRef,
    target_ref_commit: AzCommitRef,
    #[serde(default)]
    created_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzCommitRef {
    commit_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzChanges {
    #[serde(default = "Vec::new")]
    change_entries: Vec<AzChangeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzChangeEntry {
    change_type: String,
    item: AzItem,
    /// Unified diff text for the file; absent for binary content.
    #[serde(default)]
    diff: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzItem {
    path: String,
    #[serde(default)]
    is_folder: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct AzThread {
    id: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "isDeleted")]
    is_deleted: Option<bool>,
    #[serde(default = "Vec::new")]
    comments: Vec<AzComment>,
}

#[derive(Debug, Deserialize)]
struct AzComment {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzThreadCreated {
    id: u64,
}
