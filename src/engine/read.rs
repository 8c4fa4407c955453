//! engine::read
//!
//! The content reader: fetches every `(repo, file)` pair at a ref and runs
//! the transform gate over it.
//!
//! # Fan-out
//!
//! All fetches run concurrently. The first hard error fails the whole read;
//! results of sibling fetches still in flight are discarded. A `NotFound`
//! is not an error: the file simply does not exist at that ref.
//!
//! A missing repository also reads as `NotFound`, so an absent repository
//! and an absent file are indistinguishable here.

use futures::future::try_join_all;
use tracing::{debug, info};

use super::error::EngineError;
use super::transform::{gate, Transform};
use crate::core::change::FileChange;
use crate::core::types::RepoRef;
use crate::forge::Forge;

/// Read `files` from every repository in `repos` at `git_ref`.
///
/// Results come back repo-major in input order. With a transform, each
/// file's `new` content is the gate's output; without one, `new == orig`.
///
/// # Errors
///
/// - `EngineError::Remote` for any forge failure other than `NotFound`
/// - `EngineError::CreateAndDelete` / `EngineError::Transform` from the gate
pub async fn read_files(
    forge: &dyn Forge,
    repos: &[RepoRef],
    files: &[String],
    git_ref: &str,
    transform: Option<&dyn Transform>,
) -> Result<Vec<FileChange>, EngineError> {
    info!(
        repos = repos.len(),
        files = files.len(),
        git_ref,
        "reading files"
    );
    let reads = repos.iter().flat_map(|repo| {
        files
            .iter()
            .map(move |path| read_one(forge, repo, path, git_ref, transform))
    });
    try_join_all(reads).await
}

async fn read_one(
    forge: &dyn Forge,
    repo: &RepoRef,
    path: &str,
    git_ref: &str,
    transform: Option<&dyn Transform>,
) -> Result<FileChange, EngineError> {
    let (orig, sha) = match forge.get_content(repo, path, git_ref).await {
        Ok(file) => (Some(file.content), Some(file.sha)),
        Err(e) if e.is_not_found() => {
            debug!(%repo, path, git_ref, "file does not exist");
            (None, None)
        }
        Err(e) => {
            return Err(EngineError::remote(
                format!("{}/{}@{}", repo, path, git_ref),
                e,
            ))
        }
    };

    let new = match transform {
        Some(transform) => gate(transform, repo, path, orig.as_deref()).await?,
        None => orig.clone(),
    };

    Ok(FileChange {
        repo: repo.clone(),
        path: path.to_string(),
        orig,
        new,
        sha,
    })
}
