//! engine::transform
//!
//! The transform gate: runs the caller's per-file transform and normalizes
//! its result into a change.
//!
//! # Contract
//!
//! A transform receives the file's current contents (`None` if the file
//! does not exist) and returns the new contents, or `None` to delete the
//! file. Returning the input unchanged is a no-op. Returning `None` for a
//! file that does not exist is a [`EngineError::CreateAndDelete`] policy
//! violation.
//!
//! Transforms are not required to be idempotent. Re-running a commit
//! applies the transform to the already-transformed content.
//!
//! # Implementations
//!
//! - Any `Fn(&TransformInput) -> Result<Option<String>, TransformError>`
//! - [`CommandTransform`]: a shell command fed the file on stdin

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::error::EngineError;
use crate::core::change::ChangeKind;
use crate::core::types::RepoRef;

/// Exit status a [`CommandTransform`] uses to ask for deletion.
pub const DELETE_EXIT_CODE: i32 = 3;

/// Errors from a transform.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to run command: {0}")]
    Spawn(String),

    #[error("command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("command output is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0}")]
    Other(String),
}

/// What a transform sees for one file.
#[derive(Debug, Clone, Copy)]
pub struct TransformInput<'a> {
    pub repo: &'a RepoRef,
    pub path: &'a str,
    /// Current contents, `None` if the file does not exist.
    pub contents: Option<&'a str>,
}

/// A per-file content transform.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Produce the new contents, or `None` to delete the file.
    async fn apply(&self, input: TransformInput<'_>) -> Result<Option<String>, TransformError>;
}

#[async_trait]
impl<F> Transform for F
where
    F: Fn(&TransformInput<'_>) -> Result<Option<String>, TransformError> + Send + Sync,
{
    async fn apply(&self, input: TransformInput<'_>) -> Result<Option<String>, TransformError> {
        self(&input)
    }
}

/// Pin a closure's signature so it can be used as a [`Transform`].
///
/// # Example
///
/// ```
/// use polypatch::engine::transform::{from_fn, Transform};
///
/// let upper = from_fn(|input| Ok(input.contents.map(str::to_uppercase)));
/// let _: &dyn Transform = &upper;
/// ```
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&TransformInput<'_>) -> Result<Option<String>, TransformError> + Send + Sync,
{
    f
}

/// Run `transform` for one file and validate the result.
///
/// # Errors
///
/// - `EngineError::Transform` if the transform itself fails
/// - `EngineError::CreateAndDelete` if both old and new contents are absent
pub async fn gate(
    transform: &dyn Transform,
    repo: &RepoRef,
    path: &str,
    orig: Option<&str>,
) -> Result<Option<String>, EngineError> {
    let input = TransformInput {
        repo,
        path,
        contents: orig,
    };
    let new = transform
        .apply(input)
        .await
        .map_err(|e| EngineError::Transform {
            context: format!("{}/{}", repo, path),
            message: e.to_string(),
        })?;

    match ChangeKind::classify(orig, new.as_deref()) {
        Some(kind) => {
            debug!(%repo, path, %kind, "transformed");
            Ok(new)
        }
        None => Err(EngineError::CreateAndDelete {
            repo: repo.clone(),
            path: path.to_string(),
        }),
    }
}

/// Transform that pipes each file through a shell command.
///
/// The command runs under `sh -c` with the current contents on stdin (empty
/// if the file does not exist) and these variables set:
///
/// - `POLYPATCH_REPO`: `org/name`
/// - `POLYPATCH_FILE`: path within the repository
/// - `POLYPATCH_EXISTS`: `1` or `0`
///
/// Exit status 0 makes stdout the new contents. Exit status
/// [`DELETE_EXIT_CODE`] deletes the file. Anything else fails the file.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    command: String,
}

impl CommandTransform {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Transform for CommandTransform {
    async fn apply(&self, input: TransformInput<'_>) -> Result<Option<String>, TransformError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("POLYPATCH_REPO", input.repo.to_string())
            .env("POLYPATCH_FILE", input.path)
            .env(
                "POLYPATCH_EXISTS",
                if input.contents.is_some() { "1" } else { "0" },
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransformError::Spawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransformError::Spawn("stdin was not captured".into()))?;
        let payload = input.contents.unwrap_or_default().as_bytes().to_vec();
        let feed = async move {
            let written = stdin.write_all(&payload).await;
            drop(stdin);
            written
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| TransformError::Spawn(e.to_string()))?;
        if let Err(e) = fed {
            // The command may exit without reading its input.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(TransformError::Spawn(e.to_string()));
            }
        }

        match output.status.code() {
            Some(0) => String::from_utf8(output.stdout)
                .map(Some)
                .map_err(|_| TransformError::InvalidUtf8),
            Some(DELETE_EXIT_CODE) => Ok(None),
            _ => Err(TransformError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}
