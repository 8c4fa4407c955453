//! engine::error
//!
//! Error taxonomy for engine actions.
//!
//! # Classes
//!
//! Every [`EngineError`] belongs to one [`ErrorClass`]:
//!
//! - **Policy**: the request is disallowed (existing branch, protected
//!   branch, create-and-delete). Detected before any mutation in the stage.
//! - **Consistency**: remote state disagrees with what the run observed
//!   (truncated tree, sha drift, non-fast-forward). Aborts that repository
//!   before its tree is rewritten.
//! - **Remote**: a forge call failed, with repo/file context attached.
//! - **Programming**: an internal invariant broke.
//!
//! A forge `NotFound` is not an engine error; the stages consume it as the
//! "does not exist" signal.
//!
//! # Reports
//!
//! Actions return a [`Report`]: the records gathered so far plus the first
//! error, if any. Multi-repository mutation is not transactional, so
//! partial results are data the caller needs.

use thiserror::Error;

use crate::core::types::{BranchName, Oid, RepoRef};
use crate::forge::ForgeError;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Policy,
    Consistency,
    Remote,
    Programming,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Policy => write!(f, "policy violation"),
            ErrorClass::Consistency => write!(f, "consistency error"),
            ErrorClass::Remote => write!(f, "remote error"),
            ErrorClass::Programming => write!(f, "internal error"),
        }
    }
}

/// Errors from engine actions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The file does not exist and the transform asked to delete it.
    #[error("{repo}/{path}: cannot both create and delete a file")]
    CreateAndDelete { repo: RepoRef, path: String },

    /// The destination branch exists and existing branches are not allowed.
    #[error("{repo}: branch '{branch}' already exists")]
    BranchExists { repo: RepoRef, branch: BranchName },

    /// A pull request for the same head and base is already open.
    #[error("{repo}: pull request {head} -> {base} already exists")]
    PullRequestExists {
        repo: RepoRef,
        head: BranchName,
        base: BranchName,
    },

    #[error("source and destination are both '{0}'")]
    SameBranch(BranchName),

    #[error("refusing to commit directly to protected branch '{0}'")]
    ProtectedBranch(BranchName),

    /// The forge cut a recursive tree listing short.
    #[error("{repo}: tree listing at {sha} is truncated; refusing to rewrite from it")]
    TruncatedTree { repo: RepoRef, sha: Oid },

    /// A blob changed between the read and the write.
    #[error("{repo}/{path}: file changed since it was read (read {expected}, found {found})")]
    ShaMismatch {
        repo: RepoRef,
        path: String,
        /// What the read stage saw (`absent` if it did not exist)
        expected: String,
        /// What the tree listing holds (`absent` if it does not exist)
        found: String,
    },

    /// The branch moved while the commit was being built.
    #[error("{repo}: branch '{branch}' moved; update is not a fast-forward")]
    NotFastForward { repo: RepoRef, branch: BranchName },

    /// A forge call failed. The forge error is the source, not part of
    /// the message.
    #[error("{context}")]
    Remote {
        context: String,
        #[source]
        source: ForgeError,
    },

    /// The transform failed for one file.
    #[error("{context}: transform failed: {message}")]
    Transform { context: String, message: String },

    /// An internal invariant broke.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Wrap a forge error with the repo/file it concerned.
    pub fn remote(context: impl Into<String>, source: ForgeError) -> Self {
        EngineError::Remote {
            context: context.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::CreateAndDelete { .. }
            | EngineError::BranchExists { .. }
            | EngineError::PullRequestExists { .. }
            | EngineError::SameBranch(_)
            | EngineError::ProtectedBranch(_) => ErrorClass::Policy,
            EngineError::TruncatedTree { .. }
            | EngineError::ShaMismatch { .. }
            | EngineError::NotFastForward { .. } => ErrorClass::Consistency,
            EngineError::Remote { .. } | EngineError::Transform { .. } => ErrorClass::Remote,
            EngineError::Internal(_) => ErrorClass::Programming,
        }
    }
}

/// Records gathered by an action plus the first error it hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<T> {
    pub results: Vec<T>,
    pub error: Option<EngineError>,
}

impl<T> Report<T> {
    /// A fully successful report.
    pub fn ok(results: Vec<T>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    /// A report that failed before producing anything.
    pub fn failed(error: EngineError) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error),
        }
    }

    /// Fold per-repository outcomes: successes are kept in order, the first
    /// error (in input order) becomes the report's error.
    pub fn collect(outcomes: impl IntoIterator<Item = Result<T, EngineError>>) -> Self {
        let mut report = Self::ok(Vec::new());
        for outcome in outcomes {
            match outcome {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    if report.error.is_none() {
                        report.error = Some(e);
                    }
                }
            }
        }
        report
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Report<U> {
        Report {
            results: self.results.into_iter().map(f).collect(),
            error: self.error,
        }
    }

    /// Drop partial results and return the error, if any.
    pub fn into_result(self) -> Result<Vec<T>, EngineError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.results),
        }
    }
}

impl<T> From<Result<Vec<T>, EngineError>> for Report<T> {
    fn from(result: Result<Vec<T>, EngineError>) -> Self {
        match result {
            Ok(results) => Self::ok(results),
            Err(e) => Self::failed(e),
        }
    }
}
