//! engine
//!
//! The change engine: reads files across repositories, runs a transform
//! over them, and turns the result into branches, commits, and pull
//! requests through a [`Forge`](crate::forge::Forge).
//!
//! # Architecture
//!
//! Each manager owns one step of the pipeline:
//!
//! - [`read`] fetches `(repo, file)` pairs and applies the transform gate
//! - [`branch`] creates destination branches
//! - [`commit`] synthesizes one commit per repository (blob, tree, commit, ref)
//! - [`pull`] opens pull requests
//!
//! [`orchestrate`] composes them into actions, using [`graph`] for
//! multi-stage actions.
//!
//! # Invariants
//!
//! - Read-only gates (ref lookups, listings, consistency checks) finish for
//!   every repository before the first mutation
//! - A dry run performs no mutating forge call and reports `Oid::zero()`
//!   wherever a new sha would appear
//! - Ref updates are never forced
//! - Partial results are kept next to the first error

pub mod branch;
pub mod commit;
pub mod error;
pub mod graph;
pub mod orchestrate;
pub mod pull;
pub mod read;
pub mod transform;

pub use error::{EngineError, ErrorClass, Report};
pub use orchestrate::{Action, ChangeSet, Orchestrator, PullRequestText, RunOptions};
pub use pull::PullRequestSpec;
pub use transform::{CommandTransform, Transform, TransformError, TransformInput};
