//! forge::github
//!
//! GitHub forge implementation using the REST v3 Git Data API.
//!
//! # Design
//!
//! This module implements the `Forge` trait for GitHub:
//! - `GET  /repos/{o}/{r}/contents/{path}?ref=` for file contents
//! - `GET  /repos/{o}/{r}/git/ref/{ref}` and `POST|PATCH .../git/refs` for refs
//! - `POST /repos/{o}/{r}/git/blobs|trees|commits` for objects
//! - `GET  /repos/{o}/{r}/git/trees/{sha}?recursive=1` for listings
//! - `POST /repos/{o}/{r}/pulls` for pull requests
//!
//! # Rate Limiting
//!
//! The engine fans out across every repository and file at once. To keep
//! that from tripping GitHub's secondary rate limits, at most
//! `max_in_flight` requests are outstanding per client. Exhausted limits
//! come back as `ForgeError::RateLimited`; retrying is the caller's call.
//!
//! # Example
//!
//! ```ignore
//! use polypatch::forge::github::GitHubForge;
//!
//! let forge = GitHubForge::new("ghp_xxx").with_max_in_flight(4);
//! let readme = forge.get_content(&repo, "README.md", "main").await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use super::traits::{
    CreatePrRequest, FileContent, Forge, ForgeError, PullRequest, Tree, TreeEntry,
};
use crate::core::types::{Oid, RefName, RepoRef};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default cap on concurrent requests per client.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "polypatch-cli";

/// GitHub forge implementation.
pub struct GitHubForge {
    /// HTTP client for making requests
    client: Client,
    /// Bearer token
    token: Option<String>,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
    /// Bounds outstanding requests
    limiter: Arc<Semaphore>,
    max_in_flight: usize,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("has_token", &self.token.is_some())
            .field("api_base", &self.api_base)
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

impl GitHubForge {
    /// Create a client for github.com authenticated with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: Some(token.into()),
            api_base: DEFAULT_API_BASE.to_string(),
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Use a custom API base URL (GitHub Enterprise, or a test server).
    ///
    /// e.g. `https://github.example.com/api/v3`
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Cap the number of concurrent requests. Values below 1 are raised to 1.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        self.limiter = Arc::new(Semaphore::new(max_in_flight));
        self.max_in_flight = max_in_flight;
        self
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let token = self.token.as_deref().ok_or(ForgeError::AuthRequired)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint from path segments.
    ///
    /// Each segment may itself contain `/` (file paths, ref names); it is
    /// split and every piece percent-encoded on its own.
    fn repo_url(&self, repo: &RepoRef, segments: &[&str]) -> Result<Url, ForgeError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            ForgeError::NetworkError(format!("invalid API base '{}': {}", self.api_base, e))
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ForgeError::NetworkError(format!("API base '{}' cannot be a base", self.api_base))
            })?;
            path.pop_if_empty()
                .extend(["repos", repo.org(), repo.name()])
                .extend(segments.iter().flat_map(|s| s.split('/')));
        }
        Ok(url)
    }

    /// Send a request under the in-flight limit and decode the response.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ForgeError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ForgeError::NetworkError("request limiter closed".into()))?;

        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "github response");

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            Err(self.handle_error_response(response, status).await)
        }
    }

    /// Turn an error response into a `ForgeError`.
    async fn handle_error_response(&self, response: Response, status: StatusCode) -> ForgeError {
        // Extract headers before consuming the body.
        let headers = response.headers();
        let rate_limit_exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        let required_permissions = headers
            .get("X-Accepted-GitHub-Permissions")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .json::<GitHubErrorResponse>()
            .await
            .unwrap_or_else(|_| GitHubErrorResponse {
                message: "Unknown error".to_string(),
                errors: Vec::new(),
            });

        classify_error(status, rate_limit_exhausted, required_permissions, body)
    }
}

/// Map a GitHub error status and body onto `ForgeError`.
fn classify_error(
    status: StatusCode,
    rate_limit_exhausted: bool,
    required_permissions: Option<String>,
    body: GitHubErrorResponse,
) -> ForgeError {
    let message = body.full_message();
    let lower = message.to_lowercase();

    match status {
        StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
        StatusCode::FORBIDDEN if rate_limit_exhausted || lower.contains("rate limit") => {
            ForgeError::RateLimited
        }
        StatusCode::FORBIDDEN => {
            let mut err_msg = format!("Permission denied: {}", message);
            if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                err_msg.push_str(&format!(" [required: {}]", perms));
            }
            ForgeError::AuthFailed(err_msg)
        }
        StatusCode::NOT_FOUND => ForgeError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY if lower.contains("already exists") => {
            ForgeError::AlreadyExists(message)
        }
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT
            if lower.contains("fast forward") || lower.contains("fast-forward") =>
        {
            ForgeError::NotFastForward(message)
        }
        StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
        _ if status.is_server_error() => ForgeError::ApiError {
            status: status.as_u16(),
            message: format!("GitHub server error: {}", message),
        },
        _ => ForgeError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

/// Decode a contents-API payload (base64 with embedded line breaks).
fn decode_content(encoded: &str, path: &str) -> Result<String, ForgeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| ForgeError::ApiError {
        status: 200,
        message: format!("invalid base64 content for '{}': {}", path, e),
    })?;
    String::from_utf8(bytes).map_err(|_| ForgeError::ApiError {
        status: 200,
        message: format!("'{}' is not a UTF-8 text file", path),
    })
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn get_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, ForgeError> {
        let url = self.repo_url(repo, &["contents", path])?;
        let request = self.client.get(url).query(&[("ref", git_ref)]);
        let file: GitHubContent = self.execute(request).await?;

        let content = match file.encoding.as_deref() {
            Some("base64") | None => decode_content(&file.content, path)?,
            Some(other) => {
                return Err(ForgeError::ApiError {
                    status: 200,
                    message: format!("unsupported content encoding '{}' for '{}'", other, path),
                })
            }
        };

        Ok(FileContent {
            content,
            sha: file.sha,
        })
    }

    async fn get_ref(&self, repo: &RepoRef, refname: &RefName) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, &["git", "ref", refname.short()])?;
        let git_ref: GitHubRef = self.execute(self.client.get(url)).await?;
        Ok(git_ref.object.sha)
    }

    async fn create_ref(
        &self,
        repo: &RepoRef,
        refname: &RefName,
        sha: &Oid,
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, &["git", "refs"])?;
        let body = CreateRefBody {
            git_ref: refname.as_str(),
            sha: sha.as_str(),
        };
        let git_ref: GitHubRef = self.execute(self.client.post(url).json(&body)).await?;
        Ok(git_ref.object.sha)
    }

    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, &["git", "blobs"])?;
        let body = CreateBlobBody {
            content: STANDARD.encode(content),
            encoding: "base64",
        };
        let blob: GitHubSha = self.execute(self.client.post(url).json(&body)).await?;
        Ok(blob.sha)
    }

    async fn get_tree(
        &self,
        repo: &RepoRef,
        sha: &Oid,
        recursive: bool,
    ) -> Result<Tree, ForgeError> {
        let url = self.repo_url(repo, &["git", "trees", sha.as_str()])?;
        let mut request = self.client.get(url);
        if recursive {
            request = request.query(&[("recursive", "1")]);
        }
        let tree: GitHubTree = self.execute(request).await?;
        Ok(Tree {
            sha: tree.sha,
            entries: tree.tree,
            truncated: tree.truncated,
        })
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        entries: &[TreeEntry],
        base_tree: Option<&Oid>,
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, &["git", "trees"])?;
        let body = CreateTreeBody {
            tree: entries,
            base_tree: base_tree.map(Oid::as_str),
        };
        let tree: GitHubSha = self.execute(self.client.post(url).json(&body)).await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, &["git", "commits"])?;
        let body = CreateCommitBody {
            message,
            tree: tree.as_str(),
            parents: parents.iter().map(Oid::as_str).collect(),
        };
        let commit: GitHubSha = self.execute(self.client.post(url).json(&body)).await?;
        Ok(commit.sha)
    }

    async fn update_ref(
        &self,
        repo: &RepoRef,
        refname: &RefName,
        sha: &Oid,
        force: bool,
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, &["git", "refs", refname.short()])?;
        let body = UpdateRefBody {
            sha: sha.as_str(),
            force,
        };
        let git_ref: GitHubRef = self.execute(self.client.patch(url).json(&body)).await?;
        Ok(git_ref.object.sha)
    }

    async fn create_pr(
        &self,
        repo: &RepoRef,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        let url = self.repo_url(repo, &["pulls"])?;
        let body = CreatePrBody {
            head: &request.head,
            base: &request.base,
            title: &request.title,
            body: request.body.as_deref(),
        };
        let pr: GitHubPullRequest = self.execute(self.client.post(url).json(&body)).await?;
        Ok(pr.into())
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct CreateBlobBody {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct CreateTreeBody<'a> {
    tree: &'a [TreeEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

/// Request body for creating a PR.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<GitHubErrorDetail>,
}

impl GitHubErrorResponse {
    /// Top-level message plus any per-field detail messages.
    fn full_message(&self) -> String {
        let details: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.message.as_deref())
            .collect();
        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, details.join("; "))
        }
    }
}

#[derive(Deserialize)]
struct GitHubErrorDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct GitHubContent {
    content: String,
    encoding: Option<String>,
    sha: Oid,
}

#[derive(Deserialize)]
struct GitHubSha {
    sha: Oid,
}

#[derive(Deserialize)]
struct GitHubRef {
    object: GitHubSha,
}

#[derive(Deserialize)]
struct GitHubTree {
    sha: Oid,
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// GitHub PR response format (subset).
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    head: GitHubPrRef,
    base: GitHubPrRef,
}

#[derive(Deserialize)]
struct GitHubPrRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: Oid,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
            head_sha: pr.head.sha,
        }
    }
}
