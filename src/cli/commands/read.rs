//! cli::commands::read
//!
//! Read files across repositories, optionally previewing a transform.

use anyhow::Result;

use super::{connect, finish, load_config, run_options, runtime};
use crate::cli::Context;
use crate::core::types::RepoRef;
use crate::engine::{Action, CommandTransform, Orchestrator, Transform};

/// Run the read command.
///
/// # Arguments
///
/// * `ctx` - CLI context
/// * `repos` - Repositories to read from
/// * `files` - Paths to read in each repository
/// * `git_ref` - Branch, tag, or commit to read at
/// * `exec` - Optional transform command to preview
pub fn read(
    ctx: &Context,
    repos: &[RepoRef],
    files: &[String],
    git_ref: &str,
    exec: Option<&str>,
) -> Result<()> {
    let config = load_config(ctx)?;
    let forge = connect(&config)?;
    let engine = Orchestrator::new(forge.as_ref(), run_options(&config, false, false));
    let transform = exec.map(CommandTransform::new);

    let report = runtime()?.block_on(engine.read(
        repos,
        files,
        git_ref,
        transform.as_ref().map(|t| t as &dyn Transform),
    ));
    finish(ctx, &config, Action::Read, report)
}
