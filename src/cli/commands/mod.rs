//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads configuration and builds the forge client
//! 2. Runs one engine action on a tokio runtime
//! 3. Renders the report and turns a report error into a failed exit
//!
//! Handlers are synchronous. The network work is async, so each handler
//! builds a runtime and blocks on the action.

mod branch;
mod branch_to_pr;
mod commit;
mod completion;
mod pull_request;
mod read;

pub use branch::branch;
pub use branch_to_pr::branch_to_pr;
pub use commit::commit;
pub use completion::completion;
pub use pull_request::pull_request;
pub use read::read;

use anyhow::{Context as _, Result};

use super::args::Command;
use super::Context;
use crate::core::config::Config;
use crate::core::records::ActionRecord;
use crate::engine::{Action, Report, RunOptions};
use crate::forge::{create_forge, Forge};
use crate::ui::output::{self, formatter, Format};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Read {
            repos,
            files,
            git_ref,
            exec,
        } => read(ctx, &repos.repos, &files.files, &git_ref, exec.as_deref()),
        Command::Branch {
            repos,
            src,
            dest,
            write,
        } => branch(ctx, &repos.repos, &src, &dest, &write),
        Command::Commit {
            repos,
            files,
            branch,
            message,
            exec,
            dry_run,
        } => commit(
            ctx,
            &repos.repos,
            &files.files,
            &branch,
            &message,
            &exec,
            dry_run,
        ),
        Command::PullRequest {
            repos,
            src,
            dest,
            text,
            write,
        } => pull_request(ctx, &repos.repos, &src, &dest, &text, &write),
        Command::BranchToPr {
            repos,
            files,
            src,
            dest,
            exec,
            message,
            text,
            write,
        } => branch_to_pr(
            ctx,
            &repos.repos,
            &files.files,
            &src,
            &dest,
            &exec,
            &message,
            &text,
            &write,
        ),
        Command::Completion { shell } => completion(shell),
    }
}

/// Load the config named by `--config`, or the first one found.
fn load_config(ctx: &Context) -> Result<Config> {
    let config = Config::load(ctx.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = config.loaded_from() {
        output::debug(format!("config: {}", path.display()), ctx.verbosity);
    }
    Ok(config)
}

fn connect(config: &Config) -> Result<Box<dyn Forge>> {
    create_forge(config).with_context(|| {
        format!(
            "cannot reach the forge; set {} or `token` in the config file",
            config.token_env()
        )
    })
}

/// Combine flags with config defaults. Flags only ever widen.
fn run_options(config: &Config, dry_run: bool, allow_existing: bool) -> RunOptions {
    RunOptions {
        dry_run,
        allow_existing: allow_existing || config.allow_existing(),
        protected_branches: config.protected_branches(),
    }
}

fn output_format(ctx: &Context, config: &Config) -> Result<Format> {
    match (ctx.format, config.default_format()) {
        (Some(format), _) => Ok(format),
        (None, Some(name)) => Ok(name.parse()?),
        (None, None) => Ok(Format::default()),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}

/// Render `report`, then fail if it carries an error.
///
/// Partial results are always printed before the error is returned.
fn finish(
    ctx: &Context,
    config: &Config,
    action: Action,
    report: Report<ActionRecord>,
) -> Result<()> {
    let format = output_format(ctx, config)?;
    let rendered = formatter(format).render(action, &report)?;
    output::emit(&rendered, format, ctx.verbosity);

    match report.error {
        None => Ok(()),
        Some(e) => {
            let class = e.class();
            Err(anyhow::Error::new(e).context(format!("{} failed ({})", action, class)))
        }
    }
}
