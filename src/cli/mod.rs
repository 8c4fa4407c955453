//! cli
//!
//! Command-line interface layer for polypatch.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and build the forge client
//! - Delegate to the [`crate::engine`] and hand its report to [`crate::ui`]
//!
//! # Architecture
//!
//! The CLI layer is thin. It never talks to the forge itself; every remote
//! call goes through an [`Orchestrator`](crate::engine::Orchestrator).

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::path::PathBuf;

use anyhow::Result;

use crate::ui::output::{Format, Verbosity};

/// Settings derived from global CLI flags.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file.
    pub config: Option<PathBuf>,
    pub verbosity: Verbosity,
    /// Output format from `--format`; the config default applies when unset.
    pub format: Option<Format>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
            format: cli.format,
        }
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context::from_cli(&cli);
    commands::dispatch(cli.command, &ctx)
}
