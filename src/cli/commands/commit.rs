//! cli::commands::commit
//!
//! Transform files and commit the result, one commit per repository.
//!
//! # Example
//!
//! ```bash
//! polypatch commit --repos acme/api --files .nvmrc \
//!     --branch chore/node-20 --exec 'echo 20' --message 'Use Node 20'
//! ```

use anyhow::Result;

use super::{connect, finish, load_config, run_options, runtime};
use crate::cli::Context;
use crate::core::types::{BranchName, RepoRef};
use crate::engine::{Action, ChangeSet, CommandTransform, Orchestrator};
use crate::ui::output;

/// Run the commit command.
///
/// # Arguments
///
/// * `ctx` - CLI context
/// * `repos` - Repositories to commit to
/// * `files` - Paths to transform in each repository
/// * `branch` - Existing, unprotected branch to commit onto
/// * `message` - Commit message
/// * `exec` - Transform command
/// * `dry_run` - Compute the commit without writing it
pub fn commit(
    ctx: &Context,
    repos: &[RepoRef],
    files: &[String],
    branch: &BranchName,
    message: &str,
    exec: &str,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(ctx)?;
    let forge = connect(&config)?;
    let options = run_options(&config, dry_run, false);
    if options.dry_run {
        output::warn("dry run: nothing will be committed", ctx.verbosity);
    }
    let engine = Orchestrator::new(forge.as_ref(), options);
    let transform = CommandTransform::new(exec);
    let changes = ChangeSet {
        repos,
        files,
        transform: &transform,
    };

    let report = runtime()?.block_on(engine.commit(changes, branch, message));
    finish(ctx, &config, Action::Commit, report)
}
