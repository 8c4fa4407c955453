//! cli::commands::branch
//!
//! Create a branch in every repository.

use anyhow::Result;

use super::{connect, finish, load_config, run_options, runtime};
use crate::cli::args::WriteArgs;
use crate::cli::Context;
use crate::core::types::{BranchName, RepoRef};
use crate::engine::{Action, Orchestrator};
use crate::ui::output;

/// Run the branch command.
pub fn branch(
    ctx: &Context,
    repos: &[RepoRef],
    src: &BranchName,
    dest: &BranchName,
    write: &WriteArgs,
) -> Result<()> {
    let config = load_config(ctx)?;
    let forge = connect(&config)?;
    let options = run_options(&config, write.dry_run, write.allow_existing);
    if options.dry_run {
        output::warn("dry run: no branch will be created", ctx.verbosity);
    }
    let engine = Orchestrator::new(forge.as_ref(), options);

    let report = runtime()?.block_on(engine.branch(repos, src, dest));
    finish(ctx, &config, Action::Branch, report)
}
