//! engine::orchestrate
//!
//! Wires the managers into the five user-facing actions.
//!
//! # Design
//!
//! Every action returns a [`Report`] of [`ActionRecord`]s so the output
//! layer never needs to know which manager produced a row. Policy checks
//! (protected branches, same-branch) run before any remote call.
//!
//! `branch-to-pr` is a three-stage [`StageGraph`]: branch, then commit,
//! then pull request. A failed stage stops everything downstream of it and
//! the records of completed stages are kept.
//!
//! In dry-run mode `branch-to-pr` reads and commits against the source
//! branch, since the destination is never created.
//!
//! # Example
//!
//! ```
//! use polypatch::core::types::{BranchName, RepoRef};
//! use polypatch::engine::orchestrate::{Orchestrator, RunOptions};
//! use polypatch::forge::mock::MockForge;
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new().with_repo("acme/x", "main", &[("README.md", "hi")]);
//! let engine = Orchestrator::new(&forge, RunOptions::default());
//! let repos = vec![RepoRef::parse("acme/x").unwrap()];
//! let report = engine
//!     .branch(&repos, &BranchName::new("main").unwrap(), &BranchName::new("feat").unwrap())
//!     .await;
//! assert!(report.is_ok());
//! # });
//! ```

use std::fmt;

use futures::FutureExt;
use serde::Serialize;
use tracing::info;

use super::branch::create_branches;
use super::commit::{check_protected, synthesize};
use super::error::{EngineError, Report};
use super::graph::StageGraph;
use super::pull::{create_pull_requests, PullRequestSpec};
use super::read::read_files;
use super::transform::Transform;
use crate::core::config::DEFAULT_PROTECTED_BRANCHES;
use crate::core::records::ActionRecord;
use crate::core::types::{BranchName, RepoRef};
use crate::forge::Forge;

/// The user-facing actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Read,
    Branch,
    Commit,
    PullRequest,
    BranchToPr,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Branch => "branch",
            Action::Commit => "commit",
            Action::PullRequest => "pull-request",
            Action::BranchToPr => "branch-to-pr",
        }
    }

    /// Whether the action can change remote state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Action::Read)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options shared by every action of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute everything, mutate nothing.
    pub dry_run: bool,
    /// Treat an existing destination branch or pull request as success.
    pub allow_existing: bool,
    /// Branches that may never receive a synthesized commit.
    pub protected_branches: Vec<BranchName>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            allow_existing: false,
            protected_branches: DEFAULT_PROTECTED_BRANCHES
                .iter()
                .filter_map(|b| BranchName::new(*b).ok())
                .collect(),
        }
    }
}

/// The files to change and how.
#[derive(Clone, Copy)]
pub struct ChangeSet<'a> {
    pub repos: &'a [RepoRef],
    pub files: &'a [String],
    pub transform: &'a dyn Transform,
}

/// Text of the pull request opened by `branch-to-pr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestText {
    pub title: String,
    pub body: Option<String>,
}

/// Runs actions against one forge.
pub struct Orchestrator<'a> {
    forge: &'a dyn Forge,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(forge: &'a dyn Forge, options: RunOptions) -> Self {
        Self { forge, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Read `files` from every repository at `git_ref`, optionally
    /// previewing a transform.
    pub async fn read(
        &self,
        repos: &[RepoRef],
        files: &[String],
        git_ref: &str,
        transform: Option<&dyn Transform>,
    ) -> Report<ActionRecord> {
        info!(action = %Action::Read, repos = repos.len(), git_ref, "running action");
        let repos = unique(repos);
        let files = unique(files);
        read_files(self.forge, &repos, &files, git_ref, transform)
            .await
            .map(|changes| changes.iter().map(ActionRecord::for_file).collect())
            .into()
    }

    /// Create `dest` from `src` in every repository.
    pub async fn branch(
        &self,
        repos: &[RepoRef],
        src: &BranchName,
        dest: &BranchName,
    ) -> Report<ActionRecord> {
        info!(action = %Action::Branch, repos = repos.len(), %src, %dest, "running action");
        let repos = unique(repos);
        create_branches(
            self.forge,
            &repos,
            src,
            dest,
            self.options.allow_existing,
            self.options.dry_run,
        )
        .await
        .map(ActionRecord::from)
    }

    /// Transform `changes` and commit the result onto `branch`.
    pub async fn commit(
        &self,
        changes: ChangeSet<'_>,
        branch: &BranchName,
        message: &str,
    ) -> Report<ActionRecord> {
        info!(action = %Action::Commit, repos = changes.repos.len(), %branch, "running action");
        if let Err(e) = check_protected(branch, &self.options.protected_branches) {
            return Report::failed(e);
        }
        self.commit_onto(changes, branch, message).await
    }

    /// Open a pull request in every repository.
    pub async fn pull_request(
        &self,
        repos: &[RepoRef],
        spec: &PullRequestSpec,
    ) -> Report<ActionRecord> {
        info!(
            action = %Action::PullRequest,
            repos = repos.len(),
            head = %spec.head,
            base = %spec.base,
            "running action"
        );
        let repos = unique(repos);
        create_pull_requests(
            self.forge,
            &repos,
            spec,
            self.options.allow_existing,
            self.options.dry_run,
        )
        .await
        .map(ActionRecord::from)
    }

    /// Branch, commit, and open a pull request from `dest` into `src`.
    pub async fn branch_to_pr(
        &self,
        changes: ChangeSet<'_>,
        src: &BranchName,
        dest: &BranchName,
        message: &str,
        text: &PullRequestText,
    ) -> Report<ActionRecord> {
        info!(
            action = %Action::BranchToPr,
            repos = changes.repos.len(),
            %src,
            %dest,
            "running action"
        );
        if src == dest {
            return Report::failed(EngineError::SameBranch(dest.clone()));
        }
        if let Err(e) = check_protected(dest, &self.options.protected_branches) {
            return Report::failed(e);
        }

        let tip = if self.options.dry_run { src } else { dest };
        let spec = PullRequestSpec {
            head: dest.clone(),
            base: src.clone(),
            title: text.title.clone(),
            body: text.body.clone(),
        };

        StageGraph::new()
            .stage("branch", &[], |_| self.branch(changes.repos, src, dest).boxed())
            .stage("commit", &["branch"], |_| {
                self.commit_onto(changes, tip, message).boxed()
            })
            .stage("pull_request", &["commit"], |_| {
                self.pull_request(changes.repos, &spec).boxed()
            })
            .run()
            .await
            .into_report()
    }

    /// Read at `branch`, transform, and commit onto `branch`.
    async fn commit_onto(
        &self,
        changes: ChangeSet<'_>,
        branch: &BranchName,
        message: &str,
    ) -> Report<ActionRecord> {
        let repos = unique(changes.repos);
        let files = unique(changes.files);
        let read = match read_files(
            self.forge,
            &repos,
            &files,
            branch.as_str(),
            Some(changes.transform),
        )
        .await
        {
            Ok(read) => read,
            Err(e) => return Report::failed(e),
        };

        let Report { results, error } =
            synthesize(self.forge, &read, branch, message, self.options.dry_run).await;

        let mut records = Vec::new();
        for commit in results {
            for change in read.iter().filter(|c| c.repo == commit.repo) {
                records.push(ActionRecord::for_file(change).with_commit(commit.clone()));
            }
        }
        Report {
            results: records,
            error,
        }
    }
}

/// Drop repeats, keeping first occurrences in order.
fn unique<T: Clone + PartialEq>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}
