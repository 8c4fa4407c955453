//! polypatch - apply one file transform across many GitHub repositories
//!
//! polypatch reads a set of files from a set of repositories, runs a
//! transform over each one, and turns the result into branches, commits,
//! and pull requests, entirely through the forge's REST API. No local
//! clone is ever made.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Read, branch, commit, and pull request managers and the
//!   orchestrator that composes them
//! - [`core`] - Domain types, result records, and configuration
//! - [`forge`] - Abstraction over the remote Git object API (GitHub)
//! - [`ui`] - Output formatting
//!
//! # Correctness Invariants
//!
//! 1. Every read-only check finishes for all repositories before the first
//!    mutation
//! 2. A dry run makes no mutating forge call
//! 3. Branch refs only ever move forward; updates are never forced
//! 4. A truncated tree listing is never used to rebuild a tree

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod ui;
