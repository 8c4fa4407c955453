//! core::records
//!
//! Result records returned by each action.
//!
//! Every action yields a list of [`ActionRecord`]s. The record is a
//! superset: which fields are populated depends on the action (`read`
//! fills `file` and `content`, `branch` fills `branch`, and so on). Records
//! serialize directly to the JSON output format, and `content.orig` /
//! `content.new` feed the diff renderer.

use serde::Serialize;

use super::change::{ChangeKind, FileChange};
use super::types::{BranchName, Oid, RepoRef};

/// Outcome of creating (or finding) a destination branch in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchResult {
    #[serde(skip)]
    pub repo: RepoRef,
    pub src_branch: BranchName,
    pub dest_branch: BranchName,
    /// The destination already existed and was left untouched.
    pub dest_existed: bool,
    /// Head of the destination after the action (sentinel in dry-run).
    pub head_sha: Oid,
}

/// Outcome of commit synthesis in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    #[serde(skip)]
    pub repo: RepoRef,
    /// Branch tip the new commit is parented on.
    pub parent_sha: Oid,
    /// New tree, `None` when nothing changed.
    pub tree_sha: Option<Oid>,
    /// New commit, `None` when nothing changed.
    pub commit_sha: Option<Oid>,
    pub is_noop: bool,
}

/// Outcome of opening a pull request in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestResult {
    #[serde(skip)]
    pub repo: RepoRef,
    /// Web URL of the new pull request; `None` if it already existed or
    /// this was a dry run.
    pub url: Option<String>,
    pub existed: bool,
    pub head_sha: Option<Oid>,
}

/// File contents before and after the transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRecord {
    pub orig: Option<String>,
    pub new: Option<String>,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl From<&FileChange> for ContentRecord {
    fn from(change: &FileChange) -> Self {
        let kind = change.kind();
        Self {
            orig: change.orig.clone(),
            new: change.new.clone(),
            create: kind == Some(ChangeKind::Create),
            update: kind == Some(ChangeKind::Update),
            delete: kind == Some(ChangeKind::Delete),
        }
    }
}

/// One row of action output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub repo: RepoRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestResult>,
}

impl ActionRecord {
    /// An empty record for `repo`.
    pub fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            file: None,
            branch: None,
            content: None,
            commit: None,
            pull_request: None,
        }
    }

    /// Record for a read file.
    pub fn for_file(change: &FileChange) -> Self {
        Self {
            file: Some(change.path.clone()),
            content: Some(ContentRecord::from(change)),
            ..Self::new(change.repo.clone())
        }
    }

    pub fn with_commit(mut self, commit: CommitResult) -> Self {
        self.commit = Some(commit);
        self
    }
}

impl From<BranchResult> for ActionRecord {
    fn from(branch: BranchResult) -> Self {
        Self {
            branch: Some(branch.clone()),
            ..Self::new(branch.repo)
        }
    }
}

impl From<PullRequestResult> for ActionRecord {
    fn from(pr: PullRequestResult) -> Self {
        Self {
            pull_request: Some(pr.clone()),
            ..Self::new(pr.repo)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef::parse("acme/x").unwrap()
    }

    #[test]
    fn content_record_flags_update() {
        let change = FileChange {
            repo: repo(),
            path: "README.md".into(),
            orig: Some("hello".into()),
            new: Some("HELLO".into()),
            sha: None,
        };
        let content = ContentRecord::from(&change);
        assert!(content.update);
        assert!(!content.create);
        assert!(!content.delete);
    }

    #[test]
    fn content_record_for_absent_file_has_no_flags() {
        let change = FileChange {
            repo: repo(),
            path: "missing.txt".into(),
            orig: None,
            new: None,
            sha: None,
        };
        let content = ContentRecord::from(&change);
        assert!(!content.create && !content.update && !content.delete);
    }

    #[test]
    fn record_json_omits_absent_sections() {
        let change = FileChange {
            repo: repo(),
            path: "README.md".into(),
            orig: Some("hello".into()),
            new: Some("HELLO".into()),
            sha: None,
        };
        let json = serde_json::to_value(ActionRecord::for_file(&change)).unwrap();
        assert_eq!(json["repo"], "acme/x");
        assert_eq!(json["file"], "README.md");
        assert_eq!(json["content"]["orig"], "hello");
        assert_eq!(json["content"]["update"], true);
        assert!(json.get("branch").is_none());
        assert!(json.get("commit").is_none());
    }

    #[test]
    fn branch_record_keeps_repo_at_top_level() {
        let result = BranchResult {
            repo: repo(),
            src_branch: BranchName::new("main").unwrap(),
            dest_branch: BranchName::new("feat").unwrap(),
            dest_existed: false,
            head_sha: Oid::zero(),
        };
        let json = serde_json::to_value(ActionRecord::from(result)).unwrap();
        assert_eq!(json["repo"], "acme/x");
        assert!(json["branch"].get("repo").is_none());
        assert_eq!(json["branch"]["dest_branch"], "feat");
    }
}
