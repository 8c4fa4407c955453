//! engine::pull
//!
//! The pull request manager: opens a pull request per repository.

use futures::future::join_all;
use tracing::{debug, info};

use super::error::{EngineError, Report};
use crate::core::records::PullRequestResult;
use crate::core::types::{BranchName, Oid, RepoRef};
use crate::forge::{CreatePrRequest, Forge, ForgeError};

/// What to open in every repository.
#[derive(Debug, Clone)]
pub struct PullRequestSpec {
    /// Branch with the changes.
    pub head: BranchName,
    /// Branch to merge into.
    pub base: BranchName,
    pub title: String,
    pub body: Option<String>,
}

/// Open `spec` in every repository.
///
/// With `allow_existing`, an already-open pull request for the same pair
/// is reported with `existed = true`. In dry-run mode no request is made;
/// results carry no url and a sentinel head sha.
pub async fn create_pull_requests(
    forge: &dyn Forge,
    repos: &[RepoRef],
    spec: &PullRequestSpec,
    allow_existing: bool,
    dry_run: bool,
) -> Report<PullRequestResult> {
    if spec.head == spec.base {
        return Report::failed(EngineError::SameBranch(spec.head.clone()));
    }
    info!(
        repos = repos.len(),
        head = %spec.head,
        base = %spec.base,
        dry_run,
        "opening pull requests"
    );

    let opens = repos
        .iter()
        .map(|repo| open_one(forge, repo, spec, allow_existing, dry_run));
    Report::collect(join_all(opens).await)
}

async fn open_one(
    forge: &dyn Forge,
    repo: &RepoRef,
    spec: &PullRequestSpec,
    allow_existing: bool,
    dry_run: bool,
) -> Result<PullRequestResult, EngineError> {
    if dry_run {
        debug!(%repo, head = %spec.head, "dry run: would open pull request");
        return Ok(PullRequestResult {
            repo: repo.clone(),
            url: None,
            existed: false,
            head_sha: Some(Oid::zero()),
        });
    }

    let request = CreatePrRequest {
        head: spec.head.to_string(),
        base: spec.base.to_string(),
        title: spec.title.clone(),
        body: spec.body.clone(),
    };
    match forge.create_pr(repo, request).await {
        Ok(pr) => {
            info!(%repo, number = pr.number, url = %pr.url, "opened pull request");
            Ok(PullRequestResult {
                repo: repo.clone(),
                url: Some(pr.url),
                existed: false,
                head_sha: Some(pr.head_sha),
            })
        }
        Err(ForgeError::AlreadyExists(message)) if allow_existing => {
            debug!(%repo, reason = %message, "pull request already exists");
            Ok(PullRequestResult {
                repo: repo.clone(),
                url: None,
                existed: true,
                head_sha: None,
            })
        }
        Err(ForgeError::AlreadyExists(message)) => {
            debug!(%repo, reason = %message, "pull request already exists");
            Err(EngineError::PullRequestExists {
                repo: repo.clone(),
                head: spec.head.clone(),
                base: spec.base.clone(),
            })
        }
        Err(e) => Err(EngineError::remote(
            format!("{}: {} -> {}", repo, spec.head, spec.base),
            e,
        )),
    }
}
