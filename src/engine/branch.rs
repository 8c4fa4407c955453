//! engine::branch
//!
//! The branch manager: creates a destination branch from a source branch in
//! every repository.
//!
//! # Ordering
//!
//! Source heads and destination existence are resolved for every
//! repository before any decision is made. If any repository already has
//! the destination and existing branches are not allowed, the action fails
//! with zero refs created anywhere. Only then do the creates fan out.

use futures::future::{join_all, try_join_all};
use futures::try_join;
use tracing::{debug, info};

use super::error::{EngineError, Report};
use crate::core::records::BranchResult;
use crate::core::types::{BranchName, Oid, RefName, RepoRef};
use crate::forge::{Forge, ForgeError};

/// Resolve a branch head, `None` if the branch does not exist.
pub async fn get_ref(
    forge: &dyn Forge,
    repo: &RepoRef,
    branch: &BranchName,
) -> Result<Option<Oid>, EngineError> {
    match forge.get_ref(repo, &RefName::for_branch(branch)).await {
        Ok(sha) => Ok(Some(sha)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(EngineError::remote(format!("{}@{}", repo, branch), e)),
    }
}

/// Resolve a branch head that must exist.
pub(crate) async fn require_ref(
    forge: &dyn Forge,
    repo: &RepoRef,
    branch: &BranchName,
) -> Result<Oid, EngineError> {
    get_ref(forge, repo, branch).await?.ok_or_else(|| {
        EngineError::remote(
            format!("{}@{}", repo, branch),
            ForgeError::NotFound(format!("branch '{}'", branch)),
        )
    })
}

/// Create `dest` from the head of `src` in every repository.
///
/// With `allow_existing`, a repository that already has `dest` is
/// reported with `dest_existed = true` and its current head. In dry-run
/// mode no ref is created and new heads are `Oid::zero()`.
pub async fn create_branches(
    forge: &dyn Forge,
    repos: &[RepoRef],
    src: &BranchName,
    dest: &BranchName,
    allow_existing: bool,
    dry_run: bool,
) -> Report<BranchResult> {
    if src == dest {
        return Report::failed(EngineError::SameBranch(dest.clone()));
    }
    info!(repos = repos.len(), %src, %dest, dry_run, "creating branches");

    let resolved = try_join!(
        try_join_all(repos.iter().map(|repo| require_ref(forge, repo, src))),
        try_join_all(repos.iter().map(|repo| get_ref(forge, repo, dest))),
    );
    let (heads, existing) = match resolved {
        Ok(resolved) => resolved,
        Err(e) => return Report::failed(e),
    };

    if !allow_existing {
        let clash = repos
            .iter()
            .zip(&existing)
            .find(|(_, existing)| existing.is_some());
        if let Some((repo, _)) = clash {
            return Report::failed(EngineError::BranchExists {
                repo: repo.clone(),
                branch: dest.clone(),
            });
        }
    }

    let creates = repos
        .iter()
        .zip(heads)
        .zip(existing)
        .map(|((repo, head), existing)| create_one(forge, repo, src, dest, head, existing, dry_run));

    Report::collect(join_all(creates).await)
}

async fn create_one(
    forge: &dyn Forge,
    repo: &RepoRef,
    src: &BranchName,
    dest: &BranchName,
    head: Oid,
    existing: Option<Oid>,
    dry_run: bool,
) -> Result<BranchResult, EngineError> {
    let result = |dest_existed: bool, head_sha: Oid| BranchResult {
        repo: repo.clone(),
        src_branch: src.clone(),
        dest_branch: dest.clone(),
        dest_existed,
        head_sha,
    };

    if let Some(current) = existing {
        debug!(%repo, %dest, sha = %current, "destination exists");
        return Ok(result(true, current));
    }
    if dry_run {
        debug!(%repo, %dest, from = %head, "dry run: would create branch");
        return Ok(result(false, Oid::zero()));
    }

    let sha = forge
        .create_ref(repo, &RefName::for_branch(dest), &head)
        .await
        .map_err(|e| EngineError::remote(format!("{}@{}", repo, dest), e))?;
    debug!(%repo, %dest, %sha, "created branch");
    Ok(result(false, sha))
}
