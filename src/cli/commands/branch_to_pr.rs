//! cli::commands::branch_to_pr
//!
//! Branch, commit, and open a pull request in one command.

use anyhow::Result;

use super::{connect, finish, load_config, run_options, runtime};
use crate::cli::args::{PrTextArgs, WriteArgs};
use crate::cli::Context;
use crate::core::types::{BranchName, RepoRef};
use crate::engine::{Action, ChangeSet, CommandTransform, Orchestrator, PullRequestText};
use crate::ui::output;

/// Run the branch-to-pr command.
#[allow(clippy::too_many_arguments)]
pub fn branch_to_pr(
    ctx: &Context,
    repos: &[RepoRef],
    files: &[String],
    src: &BranchName,
    dest: &BranchName,
    exec: &str,
    message: &str,
    text: &PrTextArgs,
    write: &WriteArgs,
) -> Result<()> {
    let config = load_config(ctx)?;
    let forge = connect(&config)?;
    let options = run_options(&config, write.dry_run, write.allow_existing);
    if options.dry_run {
        output::warn(
            format!("dry run: reading from '{}'; nothing will be written", src),
            ctx.verbosity,
        );
    }
    let engine = Orchestrator::new(forge.as_ref(), options);
    let transform = CommandTransform::new(exec);
    let changes = ChangeSet {
        repos,
        files,
        transform: &transform,
    };
    let text = PullRequestText {
        title: text.title.clone(),
        body: text.body.clone(),
    };

    let report = runtime()?.block_on(engine.branch_to_pr(changes, src, dest, message, &text));
    finish(ctx, &config, Action::BranchToPr, report)
}
