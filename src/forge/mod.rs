//! forge
//!
//! The remote Git object client.
//!
//! # Architecture
//!
//! The `Forge` trait is the only way the engine talks to a hosting
//! service. Commands use the [`create_forge`] factory function rather than
//! importing a specific implementation, and the engine takes `&dyn Forge`.
//!
//! - Forge calls never retry; the engine decides what a failure means
//! - A `NotFound` is data (the file or branch does not exist), not a failure
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub implementation using the REST Git Data API
//! - [`mock`]: In-memory implementation for deterministic testing
//! - `factory`: Forge creation from configuration
//!
//! # Example
//!
//! ```ignore
//! use polypatch::forge::{create_forge, Forge, CreatePrRequest};
//!
//! let forge = create_forge(&config)?;
//! let pr = forge.create_pr(&repo, CreatePrRequest {
//!     head: "feature".to_string(),
//!     base: "main".to_string(),
//!     title: "Add feature".to_string(),
//!     body: None,
//! }).await?;
//!
//! println!("Created PR #{}: {}", pr.number, pr.url);
//! ```

mod factory;
pub mod github;
pub mod mock;
mod traits;

pub use factory::create_forge;
pub use traits::*;
