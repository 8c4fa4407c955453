//! forge::traits
//!
//! Forge trait definition for the remote Git object API.
//!
//! # Design
//!
//! The `Forge` trait is async because every operation is network I/O.
//! It exposes Git's object model (refs, blobs, trees, commits) plus file
//! contents and pull requests, each addressed by [`RepoRef`] so a single
//! client instance serves every repository in a run.
//!
//! Implementations never retry or interpret results beyond mapping forge
//! status codes onto [`ForgeError`]. Deciding that a `NotFound` means
//! "file does not exist yet" is the engine's job.
//!
//! # Example
//!
//! ```ignore
//! use polypatch::forge::Forge;
//!
//! async fn tip(forge: &dyn Forge, repo: &RepoRef) -> Result<Oid, ForgeError> {
//!     let main = RefName::for_branch(&BranchName::new("main")?);
//!     forge.get_ref(repo, &main).await
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{Oid, RefName, RepoRef};

/// Errors from forge operations.
///
/// These error types map to common failure modes when interacting
/// with remote hosting services like GitHub.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// The object being created already exists (e.g. a pull request for
    /// the same head/base pair).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A ref update was rejected because it is not a fast-forward.
    #[error("not a fast-forward: {0}")]
    NotFastForward(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The operation is not supported by this forge.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl ForgeError {
    /// Whether this error means the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ForgeError::NotFound(_))
    }
}

/// File contents at a ref, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// UTF-8 file contents.
    pub content: String,
    /// Blob sha of the file at that ref.
    pub sha: Oid,
}

/// Git tree entry object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    /// A submodule gitlink.
    Commit,
}

/// File mode for a regular, non-executable file.
pub const MODE_FILE: &str = "100644";

/// One entry of a tree object.
///
/// Listings from [`Forge::get_tree`] with `recursive = true` contain full
/// paths (`dir/sub/file.rs`). When posting, every entry must carry a sha.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sha: Oid,
}

impl TreeEntry {
    /// A regular file entry pointing at `sha`.
    pub fn file(path: impl Into<String>, sha: Oid) -> Self {
        Self {
            path: path.into(),
            mode: MODE_FILE.to_string(),
            kind: EntryKind::Blob,
            sha,
        }
    }
}

/// A tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub sha: Oid,
    pub entries: Vec<TreeEntry>,
    /// The forge cut the listing short; `entries` is incomplete.
    pub truncated: bool,
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    /// Head branch name (the branch with changes)
    pub head: String,
    /// Base branch name (the branch to merge into)
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// PR URL (web URL for viewing)
    pub url: String,
    /// Head branch name
    pub head: String,
    /// Base branch name
    pub base: String,
    /// Commit at the head of the PR
    pub head_sha: Oid,
}

/// The remote object client.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine issues calls for many
/// repositories concurrently through one shared reference.
///
/// # Error Handling
///
/// All methods return `Result<T, ForgeError>`. Callers should expect:
/// - `NotFound` from `get_content` / `get_ref` for absent files and branches
/// - `AlreadyExists` from `create_pr` for a duplicate head/base pair
/// - `NotFastForward` from `update_ref` when the branch moved underneath us
/// - `RateLimited`, `AuthFailed`, `ApiError`, `NetworkError` for everything else
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github", "mock").
    fn name(&self) -> &'static str;

    /// Read a file at `git_ref` (a branch name or commit sha).
    async fn get_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, ForgeError>;

    /// Resolve a ref to the commit it points at.
    async fn get_ref(&self, repo: &RepoRef, refname: &RefName) -> Result<Oid, ForgeError>;

    /// Create a new ref pointing at `sha`.
    async fn create_ref(
        &self,
        repo: &RepoRef,
        refname: &RefName,
        sha: &Oid,
    ) -> Result<Oid, ForgeError>;

    /// Store `content` as a blob and return its sha.
    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<Oid, ForgeError>;

    /// List the tree of a commit or tree sha.
    async fn get_tree(&self, repo: &RepoRef, sha: &Oid, recursive: bool)
        -> Result<Tree, ForgeError>;

    /// Create a tree.
    ///
    /// With `base_tree`, `entries` are applied on top of it and unspecified
    /// paths are kept. Without it, `entries` is the complete content.
    async fn create_tree(
        &self,
        repo: &RepoRef,
        entries: &[TreeEntry],
        base_tree: Option<&Oid>,
    ) -> Result<Oid, ForgeError>;

    /// Create a commit object.
    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, ForgeError>;

    /// Move an existing ref to `sha`.
    async fn update_ref(
        &self,
        repo: &RepoRef,
        refname: &RefName,
        sha: &Oid,
        force: bool,
    ) -> Result<Oid, ForgeError>;

    /// Open a pull request.
    async fn create_pr(
        &self,
        repo: &RepoRef,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forge_error_display() {
        assert_eq!(
            format!("{}", ForgeError::AuthRequired),
            "authentication required"
        );
        assert_eq!(
            format!("{}", ForgeError::NotFound("README.md".into())),
            "not found: README.md"
        );
        assert_eq!(format!("{}", ForgeError::RateLimited), "rate limited");
        assert_eq!(
            format!(
                "{}",
                ForgeError::ApiError {
                    status: 422,
                    message: "Validation failed".into()
                }
            ),
            "API error: 422 - Validation failed"
        );
        assert_eq!(
            format!("{}", ForgeError::NotFastForward("heads/feat".into())),
            "not a fast-forward: heads/feat"
        );
    }

    #[test]
    fn not_found_predicate() {
        assert!(ForgeError::NotFound("x".into()).is_not_found());
        assert!(!ForgeError::RateLimited.is_not_found());
    }

    #[test]
    fn tree_entry_serializes_type_field() {
        let entry = TreeEntry::file("a/b.txt", Oid::zero());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "blob");
        assert_eq!(json["mode"], "100644");
        assert_eq!(json["path"], "a/b.txt");
    }
}
