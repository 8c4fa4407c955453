//! core::change
//!
//! The per-file change model produced by the read stage and consumed by
//! commit synthesis.
//!
//! A [`FileChange`] pairs what was read from the forge with what the
//! transform produced. Its [`ChangeKind`] decides which Git objects a
//! commit needs:
//!
//! | `orig`  | `new`        | kind        |
//! |---------|--------------|-------------|
//! | `None`  | `Some(_)`    | `Create`    |
//! | `Some(x)` | `Some(x)`  | `Unchanged` |
//! | `Some(x)` | `Some(y)`  | `Update`    |
//! | `Some(_)` | `None`     | `Delete`    |
//! | `None`  | `None`       | invalid     |

use serde::Serialize;

use super::types::{Oid, RepoRef};

/// Classification of one file's transform result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// File is absent at the read ref and the transform produced content.
    Create,
    /// Transform returned the original content unchanged.
    Unchanged,
    /// Transform returned different content for an existing file.
    Update,
    /// Transform asked for an existing file to be removed.
    Delete,
}

impl ChangeKind {
    /// Classify an `(orig, new)` pair.
    ///
    /// Returns `None` when both are absent, which would mean creating and
    /// deleting the same file at once.
    ///
    /// # Example
    ///
    /// ```
    /// use polypatch::core::change::ChangeKind;
    ///
    /// assert_eq!(ChangeKind::classify(None, Some("x")), Some(ChangeKind::Create));
    /// assert_eq!(ChangeKind::classify(Some("x"), Some("x")), Some(ChangeKind::Unchanged));
    /// assert_eq!(ChangeKind::classify(Some("x"), None), Some(ChangeKind::Delete));
    /// assert_eq!(ChangeKind::classify(None, None), None);
    /// ```
    pub fn classify(orig: Option<&str>, new: Option<&str>) -> Option<Self> {
        match (orig, new) {
            (None, None) => None,
            (None, Some(_)) => Some(ChangeKind::Create),
            (Some(_), None) => Some(ChangeKind::Delete),
            (Some(o), Some(n)) if o == n => Some(ChangeKind::Unchanged),
            (Some(_), Some(_)) => Some(ChangeKind::Update),
        }
    }

    /// Whether this change needs a new blob posted.
    pub fn needs_blob(self) -> bool {
        matches!(self, ChangeKind::Create | ChangeKind::Update)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Unchanged => write!(f, "unchanged"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// One `(repo, file)` read result with its transformed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Repository the file lives in.
    pub repo: RepoRef,
    /// Path of the file relative to the repository root.
    pub path: String,
    /// Content at the read ref, `None` if the file does not exist there.
    pub orig: Option<String>,
    /// Content the transform produced, `None` to delete.
    pub new: Option<String>,
    /// Blob sha observed at read time, `None` if the file does not exist.
    pub sha: Option<Oid>,
}

impl FileChange {
    /// Classify this change. `None` means create-and-delete.
    pub fn kind(&self) -> Option<ChangeKind> {
        ChangeKind::classify(self.orig.as_deref(), self.new.as_deref())
    }
}
