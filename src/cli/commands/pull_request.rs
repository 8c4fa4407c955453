//! cli::commands::pull_request
//!
//! Open a pull request in every repository.

use anyhow::Result;

use super::{connect, finish, load_config, run_options, runtime};
use crate::cli::args::{PrTextArgs, WriteArgs};
use crate::cli::Context;
use crate::core::types::{BranchName, RepoRef};
use crate::engine::{Action, Orchestrator, PullRequestSpec};

/// Run the pull-request command: open `src` into `dest`.
pub fn pull_request(
    ctx: &Context,
    repos: &[RepoRef],
    src: &BranchName,
    dest: &BranchName,
    text: &PrTextArgs,
    write: &WriteArgs,
) -> Result<()> {
    let config = load_config(ctx)?;
    let forge = connect(&config)?;
    let engine = Orchestrator::new(
        forge.as_ref(),
        run_options(&config, write.dry_run, write.allow_existing),
    );
    let spec = PullRequestSpec {
        head: src.clone(),
        base: dest.clone(),
        title: text.title.clone(),
        body: text.body.clone(),
    };

    let report = runtime()?.block_on(engine.pull_request(repos, &spec));
    finish(ctx, &config, Action::PullRequest, report)
}
