//! core
//!
//! Domain types, records, and configuration for polypatch.
//!
//! # Modules
//!
//! - [`types`] - Strong types: RepoRef, BranchName, Oid, RefName
//! - [`change`] - FileChange and its classification
//! - [`records`] - Per-action result records
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Nothing in here talks to the network

pub mod change;
pub mod config;
pub mod records;
pub mod types;
