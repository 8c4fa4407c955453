//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`RepoRef`] - A forge repository addressed as `org/name`
//! - [`BranchName`] - Validated Git branch name
//! - [`RefName`] - Validated Git reference name
//! - [`Oid`] - Git object identifier (SHA)
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so a bad `--repos` or `--dest` argument is
//! rejected before a single remote call is made.
//!
//! # Examples
//!
//! ```
//! use polypatch::core::types::{BranchName, Oid, RefName, RepoRef};
//!
//! let repo: RepoRef = "acme/widgets".parse().unwrap();
//! assert_eq!(repo.org(), "acme");
//!
//! let branch = BranchName::new("feature/my-branch").unwrap();
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.short(), "heads/feature/my-branch");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository '{0}': expected 'org/repo'")]
    InvalidRepo(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),
}

/// A repository on the forge, addressed as `org/name`.
///
/// Parsed once per run from the `--repos` argument and never mutated.
/// Ordering is by org then name so per-repository grouping is stable.
///
/// # Example
///
/// ```
/// use polypatch::core::types::RepoRef;
///
/// let repo = RepoRef::parse("acme/x").unwrap();
/// assert_eq!(repo.name(), "x");
/// assert_eq!(repo.to_string(), "acme/x");
///
/// assert!(RepoRef::parse("acme").is_err());
/// assert!(RepoRef::parse("acme/x/y").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoRef {
    org: String,
    name: String,
}

impl RepoRef {
    /// Parse an `org/repo` string.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRepo` if either half is empty, there is
    /// more than one `/`, or the string contains whitespace.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        if s.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidRepo(s.to_string()));
        }

        match s.split_once('/') {
            Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    org: org.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(TypeError::InvalidRepo(s.to_string())),
        }
    }

    /// The owning organization or user.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// The repository name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepoRef {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepoRef {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RepoRef> for String {
    fn from(repo: RepoRef) -> Self {
        repo.to_string()
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

/// A validated Git branch name.
///
/// Branch names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - Cannot be exactly `@`
///
/// # Example
///
/// ```
/// use polypatch::core::types::BranchName;
///
/// let name = BranchName::new("feature/my-branch").unwrap();
/// assert_eq!(name.as_str(), "feature/my-branch");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new(".hidden").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// assert!(BranchName::new("@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        if name.starts_with("refs/") {
            return Err(TypeError::InvalidBranchName(
                "pass the short branch name, not a full ref".into(),
            ));
        }

        validate_ref_body(name).map_err(TypeError::InvalidBranchName)
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BranchName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase for consistency. The zero OID doubles
/// as the dry-run sentinel: every object a dry run "would have created"
/// carries it, so it can never be confused with a real forge object.
///
/// # Example
///
/// ```
/// use polypatch::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
///
/// assert!(Oid::zero().is_zero());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    const ZERO_SHA1: &'static str = "0000000000000000000000000000000000000000";

    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a valid hex OID.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// The zero OID (40 zeros), used as the dry-run sentinel.
    pub fn zero() -> Self {
        Self(Self::ZERO_SHA1.to_string())
    }

    /// Check if this is the zero/sentinel OID.
    pub fn is_zero(&self) -> bool {
        self.0.chars().all(|c| c == '0')
    }

    /// Get an abbreviated form of the OID.
    ///
    /// Returns the first `len` characters, or the full OID if shorter.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git reference name.
///
/// # Example
///
/// ```
/// use polypatch::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("feature/foo").unwrap();
/// let refname = RefName::for_branch(&branch);
/// assert_eq!(refname.as_str(), "refs/heads/feature/foo");
/// assert_eq!(refname.short(), "heads/feature/foo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name is not under `refs/`
    /// or violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if !name.starts_with("refs/") {
            return Err(TypeError::InvalidRefName(format!(
                "'{name}' must start with 'refs/'"
            )));
        }
        validate_ref_body(&name).map_err(TypeError::InvalidRefName)?;
        Ok(Self(name))
    }

    /// Create a ref name for a branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        // Branch names are already validated
        Self(format!("refs/heads/{}", branch.as_str()))
    }

    /// The ref without its leading `refs/`, as forge URL paths expect it.
    pub fn short(&self) -> &str {
        self.0.strip_prefix("refs/").unwrap_or(&self.0)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared refname rules (see `git check-ref-format`).
fn validate_ref_body(name: &str) -> Result<(), String> {
    if name.starts_with('/') {
        return Err("name cannot start with '/'".into());
    }
    if name.ends_with('/') {
        return Err("name cannot end with '/'".into());
    }
    if name.ends_with(".lock") {
        return Err("name cannot end with '.lock'".into());
    }
    for bad in ["..", "@{", "//"] {
        if name.contains(bad) {
            return Err(format!("name cannot contain '{bad}'"));
        }
    }

    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    for c in INVALID_CHARS {
        if name.contains(c) {
            return Err(format!("name cannot contain '{c}'"));
        }
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("name cannot contain control characters".into());
    }

    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod repo_ref {
        use super::*;

        #[test]
        fn parses_org_and_name() {
            let repo = RepoRef::parse("acme/x").unwrap();
            assert_eq!(repo.org(), "acme");
            assert_eq!(repo.name(), "x");
        }

        #[test]
        fn trims_surrounding_whitespace() {
            let repo: RepoRef = "  acme/x ".parse().unwrap();
            assert_eq!(repo.to_string(), "acme/x");
        }

        #[test]
        fn rejects_malformed() {
            for bad in ["", "acme", "acme/", "/x", "acme/x/y", "ac me/x"] {
                assert!(RepoRef::parse(bad).is_err(), "{bad:?} should be rejected");
            }
        }

        #[test]
        fn orders_by_org_then_name() {
            let mut repos = vec![
                RepoRef::parse("b/a").unwrap(),
                RepoRef::parse("a/z").unwrap(),
                RepoRef::parse("a/b").unwrap(),
            ];
            repos.sort();
            let names: Vec<_> = repos.iter().map(ToString::to_string).collect();
            assert_eq!(names, vec!["a/b", "a/z", "b/a"]);
        }

        #[test]
        fn serde_round_trips_as_string() {
            let repo = RepoRef::parse("acme/x").unwrap();
            let json = serde_json::to_string(&repo).unwrap();
            assert_eq!(json, "\"acme/x\"");
            let back: RepoRef = serde_json::from_str(&json).unwrap();
            assert_eq!(back, repo);
        }
    }

    mod branch_name {
        use super::*;

        #[test]
        fn valid_branch_names() {
            assert!(BranchName::new("main").is_ok());
            assert!(BranchName::new("feature/foo").is_ok());
            assert!(BranchName::new("fix-123").is_ok());
            assert!(BranchName::new("user@feature").is_ok());
            assert!(BranchName::new("with.dot").is_ok());
        }

        #[test]
        fn invalid_branch_names() {
            for bad in [
                "",
                "@",
                "-flag",
                ".hidden",
                "foo/.hidden",
                "branch.lock",
                "trailing/",
                "a..b",
                "a@{b",
                "a//b",
                "has space",
                "tilde~",
                "refs/heads/main",
            ] {
                assert!(BranchName::new(bad).is_err(), "{bad:?} should be rejected");
            }
        }
    }

    mod oid {
        use super::*;

        #[test]
        fn normalizes_to_lowercase() {
            let oid = Oid::new("ABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
            assert_eq!(oid.as_str(), "abcdef0123456789abcdef0123456789abcdef01");
        }

        #[test]
        fn accepts_sha256_length() {
            assert!(Oid::new("a".repeat(64)).is_ok());
        }

        #[test]
        fn rejects_bad_length_and_non_hex() {
            assert!(Oid::new("abc").is_err());
            assert!(Oid::new("g".repeat(40)).is_err());
        }

        #[test]
        fn zero_is_sentinel() {
            assert!(Oid::zero().is_zero());
            assert!(!Oid::new("1".repeat(40)).unwrap().is_zero());
        }

        #[test]
        fn short_clamps() {
            let oid = Oid::zero();
            assert_eq!(oid.short(7).len(), 7);
            assert_eq!(oid.short(100).len(), 40);
        }
    }

    mod ref_name {
        use super::*;

        #[test]
        fn for_branch_and_short() {
            let refname = RefName::for_branch(&BranchName::new("main").unwrap());
            assert_eq!(refname.as_str(), "refs/heads/main");
            assert_eq!(refname.short(), "heads/main");
        }

        #[test]
        fn requires_refs_prefix() {
            assert!(RefName::new("heads/main").is_err());
            assert!(RefName::new("refs/heads/main").is_ok());
            assert!(RefName::new("refs/heads/a..b").is_err());
        }
    }
}
