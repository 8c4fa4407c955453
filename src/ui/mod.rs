//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Result formatters (json, text, diff) and messages
//!
//! # Design
//!
//! All output goes through this module so the quiet flag and the chosen
//! format are honored in one place.

pub mod output;
