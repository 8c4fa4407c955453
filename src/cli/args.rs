//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--format json|text|diff`: Output format

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::types::{BranchName, RepoRef};
use crate::ui::output::Format;

/// polypatch - apply one file transform across many GitHub repositories
#[derive(Parser, Debug)]
#[command(name = "polypatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use this config file instead of searching for one
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format [default: from config, else text]
    #[arg(long, global = true, value_enum)]
    pub format: Option<Format>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Repositories to act on.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Comma-separated repositories, as owner/name
    #[arg(long, value_delimiter = ',', required = true, value_parser = parse_repo)]
    pub repos: Vec<RepoRef>,
}

/// Files to read or change.
#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Comma-separated file paths, relative to each repository root
    #[arg(long, value_delimiter = ',', required = true)]
    pub files: Vec<String>,
}

/// Flags shared by mutating commands.
#[derive(Args, Debug, Clone, Default)]
pub struct WriteArgs {
    /// Compute everything but change nothing on the forge
    #[arg(long)]
    pub dry_run: bool,

    /// Treat an existing branch or pull request as success
    #[arg(long)]
    pub allow_existing: bool,
}

/// Pull request text.
#[derive(Args, Debug, Clone)]
pub struct PrTextArgs {
    /// Pull request title
    #[arg(long)]
    pub title: String,

    /// Pull request body
    #[arg(long)]
    pub body: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read files from every repository
    #[command(
        name = "read",
        long_about = "Read files from every repository at a ref.\n\n\
            With --exec, the command is run over each file and the proposed \
            new contents are shown next to the originals. Nothing is written.",
        after_help = "\
EXAMPLES:
    # Show README.md from two repositories
    polypatch read --repos acme/api,acme/web --files README.md

    # Preview a transform as a diff
    polypatch --format diff read --repos acme/api --files .nvmrc --exec 'echo 20'"
    )]
    Read {
        #[command(flatten)]
        repos: RepoArgs,

        #[command(flatten)]
        files: FileArgs,

        /// Branch, tag, or commit to read at
        #[arg(long = "ref", value_name = "REF", default_value = "main")]
        git_ref: String,

        /// Shell command to preview as a transform
        #[arg(long, value_name = "CMD")]
        exec: Option<String>,
    },

    /// Create a branch in every repository
    #[command(
        name = "branch",
        long_about = "Create a destination branch from the head of a source branch \
            in every repository.\n\n\
            Source heads and destination existence are checked everywhere first. \
            If any repository already has the destination and --allow-existing is \
            not given, no branch is created anywhere."
    )]
    Branch {
        #[command(flatten)]
        repos: RepoArgs,

        /// Branch to start from
        #[arg(long, value_parser = parse_branch)]
        src: BranchName,

        /// Branch to create
        #[arg(long, value_parser = parse_branch)]
        dest: BranchName,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// Transform files and commit the result to a branch
    #[command(
        name = "commit",
        long_about = "Transform files and commit the result, one commit per repository.\n\n\
            The --exec command runs once per file through `sh -c`. It receives the \
            current contents on stdin (empty if the file does not exist) and the \
            variables POLYPATCH_REPO, POLYPATCH_FILE, and POLYPATCH_EXISTS. Exit 0 \
            with the new contents on stdout, or exit 3 to delete the file.",
        after_help = "\
EXAMPLES:
    # Pin a Node version on an existing branch
    polypatch commit --repos acme/api,acme/web --files .nvmrc \\
        --branch chore/node-20 --exec 'echo 20' --message 'Use Node 20'

    # Delete a file everywhere
    polypatch commit --repos acme/api --files .travis.yml \\
        --branch chore/ci --exec 'exit 3' --message 'Drop Travis'"
    )]
    Commit {
        #[command(flatten)]
        repos: RepoArgs,

        #[command(flatten)]
        files: FileArgs,

        /// Branch to commit to; must already exist
        #[arg(long, value_parser = parse_branch)]
        branch: BranchName,

        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Shell command that transforms each file
        #[arg(long, value_name = "CMD")]
        exec: String,

        /// Compute everything but change nothing on the forge
        #[arg(long)]
        dry_run: bool,
    },

    /// Open a pull request in every repository
    #[command(name = "pull-request")]
    PullRequest {
        #[command(flatten)]
        repos: RepoArgs,

        /// Branch with the changes
        #[arg(long, value_parser = parse_branch)]
        src: BranchName,

        /// Branch to merge into
        #[arg(long, value_parser = parse_branch)]
        dest: BranchName,

        #[command(flatten)]
        text: PrTextArgs,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// Branch, commit, and open a pull request in one go
    #[command(
        name = "branch-to-pr",
        long_about = "Create --dest from --src, commit the transform to it, and open \
            a pull request from --dest into --src.\n\n\
            Each stage runs only if the previous one succeeded everywhere.",
        after_help = "\
EXAMPLES:
    polypatch branch-to-pr --repos acme/api,acme/web --files .nvmrc \\
        --src main --dest chore/node-20 --exec 'echo 20' \\
        --message 'Use Node 20' --title 'Use Node 20'"
    )]
    BranchToPr {
        #[command(flatten)]
        repos: RepoArgs,

        #[command(flatten)]
        files: FileArgs,

        /// Branch to start from and merge into
        #[arg(long, value_parser = parse_branch)]
        src: BranchName,

        /// Branch to create and commit to
        #[arg(long, value_parser = parse_branch)]
        dest: BranchName,

        /// Shell command that transforms each file
        #[arg(long, value_name = "CMD")]
        exec: String,

        /// Commit message
        #[arg(short, long)]
        message: String,

        #[command(flatten)]
        text: PrTextArgs,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
INSTALLATION:
    # Bash
    polypatch completion bash > ~/.local/share/bash-completion/completions/polypatch

    # Zsh
    polypatch completion zsh > \"${fpath[1]}/_polypatch\"

    # Fish
    polypatch completion fish > ~/.config/fish/completions/polypatch.fish

    # PowerShell
    polypatch completion powershell >> $PROFILE"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

fn parse_repo(s: &str) -> Result<RepoRef, String> {
    RepoRef::parse(s.trim()).map_err(|e| e.to_string())
}

fn parse_branch(s: &str) -> Result<BranchName, String> {
    BranchName::new(s).map_err(|e| e.to_string())
}
