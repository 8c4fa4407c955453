//! engine::commit
//!
//! The commit synthesizer: turns transformed file contents into blobs, a
//! tree, a commit, and a fast-forward of the branch, per repository.
//!
//! # Algorithm
//!
//! 1. Every change is classified; create-and-delete fails the batch.
//! 2. Whole-batch gate (read-only): every repository's branch tip is
//!    resolved, and repositories with a delete fetch their full recursive
//!    tree. A truncated listing anywhere fails the action before a single
//!    blob is posted in any repository.
//! 3. Per repository, in strict order:
//!    - blobs for creates and updates;
//!    - a tree. Without deletes, a sparse tree of just the changed paths is
//!      posted against the tip as `base_tree`. With deletes, the fetched
//!      listing is rewritten (deleted paths dropped, updated paths
//!      re-pointed, creates appended) and posted with no base;
//!    - a commit whose single parent is the tip;
//!    - a non-forced ref update.
//!
//! An empty sparse tree is a no-op: no tree, commit, or ref call is made.
//!
//! Repositories run concurrently. A failure stops only that repository's
//! remaining steps; the report carries the first error and the results of
//! repositories that finished.
//!
//! # Dry run
//!
//! Read-only calls still happen. Every object that would have been created
//! gets `Oid::zero()` and the ref is not moved.

use std::collections::{BTreeMap, HashMap};

use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use super::branch::require_ref;
use super::error::{EngineError, Report};
use crate::core::change::{ChangeKind, FileChange};
use crate::core::records::CommitResult;
use crate::core::types::{BranchName, Oid, RefName, RepoRef};
use crate::forge::{EntryKind, Forge, ForgeError, TreeEntry};

/// A blob posted (or not) for one changed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPost {
    pub repo: RepoRef,
    pub path: String,
    /// `None` for unchanged and deleted files.
    pub sha: Option<Oid>,
}

/// What the batch gate learned about one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTreeState {
    pub repo: RepoRef,
    /// Branch tip the commit will be parented on.
    pub parent: Oid,
    /// Full, non-truncated listing at `parent`; only fetched when
    /// `has_delete`.
    pub tree: Option<Vec<TreeEntry>>,
    pub has_delete: bool,
}

/// Refuse to commit to a protected branch.
pub fn check_protected(branch: &BranchName, protected: &[BranchName]) -> Result<(), EngineError> {
    if protected.contains(branch) {
        return Err(EngineError::ProtectedBranch(branch.clone()));
    }
    Ok(())
}

/// Commit `changes` onto `branch` in every repository they touch.
///
/// Results are ordered by repository.
pub async fn synthesize(
    forge: &dyn Forge,
    changes: &[FileChange],
    branch: &BranchName,
    message: &str,
    dry_run: bool,
) -> Report<CommitResult> {
    let groups = match group_by_repo(changes) {
        Ok(groups) => groups,
        Err(e) => return Report::failed(e),
    };
    info!(repos = groups.len(), %branch, dry_run, "synthesizing commits");

    let states = try_join_all(
        groups
            .iter()
            .map(|(repo, changes)| resolve_state(forge, repo, changes, branch)),
    )
    .await;
    let states = match states {
        Ok(states) => states,
        Err(e) => return Report::failed(e),
    };

    let pipelines = states
        .into_iter()
        .zip(groups.values())
        .map(|(state, changes)| commit_repo(forge, state, changes, branch, message, dry_run));

    Report::collect(join_all(pipelines).await)
}

/// Classify every change and group them by repository.
fn group_by_repo(
    changes: &[FileChange],
) -> Result<BTreeMap<RepoRef, Vec<&FileChange>>, EngineError> {
    let mut groups: BTreeMap<RepoRef, Vec<&FileChange>> = BTreeMap::new();
    for change in changes {
        if change.kind().is_none() {
            return Err(EngineError::CreateAndDelete {
                repo: change.repo.clone(),
                path: change.path.clone(),
            });
        }
        let group = groups.entry(change.repo.clone()).or_default();
        if group.iter().any(|c| c.path == change.path) {
            return Err(EngineError::Internal(format!(
                "{}/{} appears twice in one commit",
                change.repo, change.path
            )));
        }
        group.push(change);
    }
    Ok(groups)
}

fn kind(change: &FileChange) -> Result<ChangeKind, EngineError> {
    change.kind().ok_or_else(|| EngineError::CreateAndDelete {
        repo: change.repo.clone(),
        path: change.path.clone(),
    })
}

/// Read-only gate for one repository.
async fn resolve_state(
    forge: &dyn Forge,
    repo: &RepoRef,
    changes: &[&FileChange],
    branch: &BranchName,
) -> Result<RepoTreeState, EngineError> {
    let parent = require_ref(forge, repo, branch).await?;
    let has_delete = changes
        .iter()
        .any(|c| c.kind() == Some(ChangeKind::Delete));

    let tree = if has_delete {
        let listing = forge
            .get_tree(repo, &parent, true)
            .await
            .map_err(|e| EngineError::remote(format!("{}@{}", repo, branch), e))?;
        if listing.truncated {
            warn!(%repo, sha = %parent, "tree listing truncated");
            return Err(EngineError::TruncatedTree {
                repo: repo.clone(),
                sha: parent,
            });
        }
        Some(listing.entries)
    } else {
        None
    };

    debug!(%repo, %parent, has_delete, "resolved branch tip");
    Ok(RepoTreeState {
        repo: repo.clone(),
        parent,
        tree,
        has_delete,
    })
}

/// Blob, tree, commit, ref for one repository.
async fn commit_repo(
    forge: &dyn Forge,
    state: RepoTreeState,
    changes: &[&FileChange],
    branch: &BranchName,
    message: &str,
    dry_run: bool,
) -> Result<CommitResult, EngineError> {
    let repo = &state.repo;
    let remote = |step: &str, e: ForgeError| {
        EngineError::remote(format!("{}@{}: {}", repo, branch, step), e)
    };

    if let Some(listing) = &state.tree {
        verify_listing(repo, listing, changes)?;
    }

    let blobs = try_join_all(changes.iter().map(|change| post_blob(forge, change, dry_run))).await?;

    let (entries, base) = match &state.tree {
        Some(listing) => (rebuild_tree(listing, changes, &blobs)?, None),
        None => (sparse_tree(&blobs), Some(&state.parent)),
    };
    if base.is_some() && entries.is_empty() {
        debug!(%repo, "nothing changed");
        return Ok(CommitResult {
            repo: repo.clone(),
            parent_sha: state.parent.clone(),
            tree_sha: None,
            commit_sha: None,
            is_noop: true,
        });
    }

    let (tree_sha, commit_sha) = if dry_run {
        debug!(%repo, entries = entries.len(), full = base.is_none(), "dry run: would commit");
        (Oid::zero(), Oid::zero())
    } else {
        let tree_sha = forge
            .create_tree(repo, &entries, base)
            .await
            .map_err(|e| remote("create tree", e))?;
        let commit_sha = forge
            .create_commit(repo, message, &tree_sha, std::slice::from_ref(&state.parent))
            .await
            .map_err(|e| remote("create commit", e))?;

        forge
            .update_ref(repo, &RefName::for_branch(branch), &commit_sha, false)
            .await
            .map_err(|e| match e {
                ForgeError::NotFastForward(_) => EngineError::NotFastForward {
                    repo: repo.clone(),
                    branch: branch.clone(),
                },
                e => remote("update ref", e),
            })?;
        info!(%repo, %branch, commit = %commit_sha.short(7), "committed");
        (tree_sha, commit_sha)
    };

    Ok(CommitResult {
        repo: repo.clone(),
        parent_sha: state.parent.clone(),
        tree_sha: Some(tree_sha),
        commit_sha: Some(commit_sha),
        is_noop: false,
    })
}

async fn post_blob(
    forge: &dyn Forge,
    change: &FileChange,
    dry_run: bool,
) -> Result<BlobPost, EngineError> {
    let content = match (kind(change)?, &change.new) {
        (kind, Some(content)) if kind.needs_blob() => content,
        _ => {
            return Ok(BlobPost {
                repo: change.repo.clone(),
                path: change.path.clone(),
                sha: None,
            })
        }
    };

    let sha = if dry_run {
        Oid::zero()
    } else {
        forge
            .create_blob(&change.repo, content)
            .await
            .map_err(|e| EngineError::remote(format!("{}/{}", change.repo, change.path), e))?
    };
    debug!(repo = %change.repo, path = %change.path, %sha, "posted blob");

    Ok(BlobPost {
        repo: change.repo.clone(),
        path: change.path.clone(),
        sha: Some(sha),
    })
}

/// Entries for an update against a base tree: only paths with new blobs.
pub fn sparse_tree(blobs: &[BlobPost]) -> Vec<TreeEntry> {
    blobs
        .iter()
        .filter_map(|blob| {
            blob.sha
                .as_ref()
                .map(|sha| TreeEntry::file(blob.path.clone(), sha.clone()))
        })
        .collect()
}

fn listed_blob<'a>(listing: &'a [TreeEntry], path: &str) -> Option<&'a Oid> {
    listing
        .iter()
        .find(|e| e.kind != EntryKind::Tree && e.path == path)
        .map(|e| &e.sha)
}

/// Check the fetched listing still matches what was read.
pub fn verify_listing(
    repo: &RepoRef,
    listing: &[TreeEntry],
    changes: &[&FileChange],
) -> Result<(), EngineError> {
    let describe = |sha: Option<&Oid>| sha.map_or_else(|| "absent".to_string(), |s| s.short(7).to_string());

    for change in changes {
        let found = listed_blob(listing, &change.path);
        let expected = match kind(change)? {
            ChangeKind::Create => None,
            _ => change.sha.as_ref(),
        };
        if found != expected {
            return Err(EngineError::ShaMismatch {
                repo: repo.clone(),
                path: change.path.clone(),
                expected: describe(expected),
                found: describe(found),
            });
        }
    }
    Ok(())
}

/// Rewrite a full listing into the complete new tree.
///
/// Directory entries are dropped since they are implied by the blob paths
/// beneath them, and posting one would bring back every file it held.
pub fn rebuild_tree(
    listing: &[TreeEntry],
    changes: &[&FileChange],
    blobs: &[BlobPost],
) -> Result<Vec<TreeEntry>, EngineError> {
    let new_sha: HashMap<&str, &Oid> = blobs
        .iter()
        .filter_map(|b| b.sha.as_ref().map(|sha| (b.path.as_str(), sha)))
        .collect();
    let mut kinds: HashMap<&str, ChangeKind> = HashMap::new();
    for change in changes {
        kinds.insert(change.path.as_str(), kind(change)?);
    }
    let blob_for = |path: &str| {
        new_sha.get(path).map(|sha| (*sha).clone()).ok_or_else(|| {
            EngineError::Internal(format!("no blob was posted for '{}'", path))
        })
    };

    let mut entries = Vec::with_capacity(listing.len() + changes.len());
    for entry in listing.iter().filter(|e| e.kind != EntryKind::Tree) {
        match kinds.get(entry.path.as_str()) {
            Some(ChangeKind::Delete) => {}
            Some(ChangeKind::Update) => entries.push(TreeEntry {
                sha: blob_for(&entry.path)?,
                ..entry.clone()
            }),
            _ => entries.push(entry.clone()),
        }
    }
    for change in changes {
        if kinds.get(change.path.as_str()) == Some(&ChangeKind::Create) {
            entries.push(TreeEntry::file(change.path.clone(), blob_for(&change.path)?));
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::mock::{FailOn, MockForge};

    fn repo(name: &str) -> RepoRef {
        RepoRef::parse(name).unwrap()
    }

    fn oid(n: u8) -> Oid {
        Oid::new(format!("{:040x}", n)).unwrap()
    }

    fn change(path: &str, orig: Option<&str>, new: Option<&str>, sha: Option<Oid>) -> FileChange {
        FileChange {
            repo: repo("acme/x"),
            path: path.into(),
            orig: orig.map(String::from),
            new: new.map(String::from),
            sha,
        }
    }

    fn blob(path: &str, sha: Option<Oid>) -> BlobPost {
        BlobPost {
            repo: repo("acme/x"),
            path: path.into(),
            sha,
        }
    }

    mod pure {
        use super::*;

        #[test]
        fn protected_branches() {
            let main = BranchName::new("main").unwrap();
            let feat = BranchName::new("feat").unwrap();
            let protected = vec![main.clone()];
            assert!(matches!(
                check_protected(&main, &protected),
                Err(EngineError::ProtectedBranch(_))
            ));
            assert!(check_protected(&feat, &protected).is_ok());
        }

        #[test]
        fn grouping_is_ordered_and_rejects_create_and_delete() {
            let mut b = change("b", Some("x"), Some("y"), None);
            b.repo = repo("zeta/b");
            let a = change("a", Some("x"), Some("y"), None);
            let changes = vec![b, a];
            let groups = group_by_repo(&changes).unwrap();
            let repos: Vec<_> = groups.keys().map(ToString::to_string).collect();
            assert_eq!(repos, vec!["acme/x", "zeta/b"]);

            let bad = vec![change("gone", None, None, None)];
            assert!(matches!(
                group_by_repo(&bad),
                Err(EngineError::CreateAndDelete { .. })
            ));
        }

        #[test]
        fn duplicate_paths_rejected() {
            let changes = vec![
                change("a", Some("x"), Some("y"), None),
                change("a", Some("x"), Some("z"), None),
            ];
            assert!(matches!(
                group_by_repo(&changes),
                Err(EngineError::Internal(_))
            ));
        }

        #[test]
        fn sparse_tree_only_has_new_blobs() {
            let blobs = vec![blob("a", Some(oid(1))), blob("b", None)];
            let entries = sparse_tree(&blobs);
            assert_eq!(entries, vec![TreeEntry::file("a", oid(1))]);
            assert!(sparse_tree(&[blob("b", None)]).is_empty());
        }

        #[test]
        fn rebuild_drops_rewrites_and_appends() {
            let listing = vec![
                TreeEntry::file("keep.txt", oid(1)),
                TreeEntry {
                    path: "docs".into(),
                    mode: "040000".into(),
                    kind: EntryKind::Tree,
                    sha: oid(2),
                },
                TreeEntry::file("docs/old.md", oid(3)),
                TreeEntry {
                    path: "run.sh".into(),
                    mode: "100755".into(),
                    kind: EntryKind::Blob,
                    sha: oid(4),
                },
            ];
            let delete = change("docs/old.md", Some("old"), None, Some(oid(3)));
            let update = change("run.sh", Some("a"), Some("b"), Some(oid(4)));
            let create = change("docs/new.md", None, Some("new"), None);
            let changes = vec![&delete, &update, &create];
            let blobs = vec![
                blob("docs/old.md", None),
                blob("run.sh", Some(oid(10))),
                blob("docs/new.md", Some(oid(11))),
            ];

            let entries = rebuild_tree(&listing, &changes, &blobs).unwrap();
            assert_eq!(
                entries,
                vec![
                    TreeEntry::file("keep.txt", oid(1)),
                    TreeEntry {
                        path: "run.sh".into(),
                        mode: "100755".into(),
                        kind: EntryKind::Blob,
                        sha: oid(10),
                    },
                    TreeEntry::file("docs/new.md", oid(11)),
                ]
            );
        }

        #[test]
        fn rebuild_without_posted_blob_is_internal_error() {
            let listing = vec![TreeEntry::file("a", oid(1))];
            let update = change("a", Some("x"), Some("y"), Some(oid(1)));
            let err = rebuild_tree(&listing, &[&update], &[blob("a", None)]).unwrap_err();
            assert!(matches!(err, EngineError::Internal(_)));
        }

        #[test]
        fn verify_listing_detects_drift() {
            let listing = vec![TreeEntry::file("a", oid(1)), TreeEntry::file("b", oid(2))];
            let x = repo("acme/x");

            let ok = change("a", Some("x"), None, Some(oid(1)));
            assert!(verify_listing(&x, &listing, &[&ok]).is_ok());

            let moved = change("a", Some("x"), None, Some(oid(9)));
            assert!(matches!(
                verify_listing(&x, &listing, &[&moved]),
                Err(EngineError::ShaMismatch { .. })
            ));

            let vanished = change("c", Some("x"), Some("y"), Some(oid(3)));
            assert!(matches!(
                verify_listing(&x, &listing, &[&vanished]),
                Err(EngineError::ShaMismatch { .. })
            ));

            let appeared = change("b", None, Some("y"), None);
            assert!(matches!(
                verify_listing(&x, &listing, &[&appeared]),
                Err(EngineError::ShaMismatch { .. })
            ));
        }
    }

    mod pipeline {
        use super::*;
        use crate::engine::read::read_files;
        use crate::engine::transform::{from_fn, Transform};

        fn main_branch() -> BranchName {
            BranchName::new("main").unwrap()
        }

        async fn read(
            forge: &MockForge,
            repos: &[&str],
            files: &[&str],
            t: &dyn Transform,
        ) -> Vec<FileChange> {
            let repos: Vec<_> = repos.iter().map(|r| repo(r)).collect();
            let files: Vec<_> = files.iter().map(|f| f.to_string()).collect();
            read_files(forge, &repos, &files, "main", Some(t)).await.unwrap()
        }

        #[tokio::test]
        async fn fast_path_update() {
            let forge = MockForge::new().with_repo("acme/x", "main", &[("README.md", "hello"), ("other", "o")]);
            let tip = forge.branch_sha("acme/x", "main").unwrap();
            let upper = from_fn(|i| Ok(i.contents.map(str::to_uppercase)));
            let changes = read(&forge, &["acme/x"], &["README.md"], &upper).await;
            forge.clear_operations();

            let report = synthesize(&forge, &changes, &main_branch(), "shout", false).await;
            let result = &report.results[0];
            assert!(report.is_ok());
            assert!(!result.is_noop);
            assert_eq!(result.parent_sha, tip);

            assert_eq!(forge.count("create_blob"), 1);
            assert_eq!(forge.count("create_tree"), 1);
            assert_eq!(forge.count("create_commit"), 1);
            assert_eq!(forge.count("update_ref"), 1);
            assert_eq!(forge.count("get_tree"), 0);
            assert_eq!(forge.file_at("acme/x", "main", "README.md").as_deref(), Some("HELLO"));
            assert_eq!(forge.file_at("acme/x", "main", "other").as_deref(), Some("o"));
        }

        #[tokio::test]
        async fn unchanged_is_noop() {
            let forge = MockForge::new().with_repo("acme/x", "main", &[("README.md", "hello")]);
            let same = from_fn(|i| Ok(i.contents.map(String::from)));
            let changes = read(&forge, &["acme/x"], &["README.md"], &same).await;

            let report = synthesize(&forge, &changes, &main_branch(), "noop", false).await;
            assert!(report.results[0].is_noop);
            assert_eq!(report.results[0].commit_sha, None);
            assert_eq!(forge.mutation_count(), 0);
        }

        #[tokio::test]
        async fn delete_uses_full_rebuild() {
            let forge = MockForge::new().with_repo(
                "acme/x",
                "main",
                &[("a/old.txt", "old"), ("a/keep.txt", "keep"), ("README.md", "r")],
            );
            let t = from_fn(|i| match i.path {
                "a/old.txt" => Ok(None),
                _ => Ok(i.contents.map(str::to_uppercase)),
            });
            let changes = read(&forge, &["acme/x"], &["a/old.txt", "README.md"], &t).await;
            forge.clear_operations();

            let report = synthesize(&forge, &changes, &main_branch(), "rm", false).await;
            assert!(report.is_ok(), "{:?}", report.error);
            assert_eq!(forge.count("get_tree"), 1);

            let base = forge.operations().into_iter().find_map(|op| match op {
                crate::forge::mock::MockOperation::CreateTree { base_tree, .. } => Some(base_tree),
                _ => None,
            });
            assert_eq!(base, Some(None));
            assert_eq!(forge.paths_at("acme/x", "main"), vec!["README.md", "a/keep.txt"]);
            assert_eq!(forge.file_at("acme/x", "main", "README.md").as_deref(), Some("R"));
        }

        #[tokio::test]
        async fn truncated_tree_fails_every_repo_before_blobs() {
            let forge = MockForge::new()
                .with_repo("acme/a", "main", &[("f", "1")])
                .with_repo("acme/b", "main", &[("f", "2"), ("g", "3")])
                .with_truncated_trees("acme/b");
            let t = from_fn(|i| match (i.repo.name(), i.path) {
                ("b", "g") => Ok(None),
                _ => Ok(Some("changed".into())),
            });
            let changes = read(&forge, &["acme/a", "acme/b"], &["f", "g"], &t).await;
            // acme/a has no "g": the transform creates it
            forge.clear_operations();

            let report = synthesize(&forge, &changes, &main_branch(), "m", false).await;
            assert!(matches!(report.error, Some(EngineError::TruncatedTree { .. })));
            assert!(report.results.is_empty());
            assert_eq!(forge.mutation_count(), 0);
        }

        #[tokio::test]
        async fn race_between_read_and_write_is_detected() {
            let forge = MockForge::new().with_repo("acme/x", "main", &[("a", "1"), ("b", "2")]);
            let t = from_fn(|i| match i.path {
                "a" => Ok(None),
                _ => Ok(Some("new".into())),
            });
            let changes = read(&forge, &["acme/x"], &["a", "b"], &t).await;
            forge.push_commit("acme/x", "main", &[("b", Some("someone else"))]);
            forge.clear_operations();

            let report = synthesize(&forge, &changes, &main_branch(), "m", false).await;
            assert!(matches!(report.error, Some(EngineError::ShaMismatch { ref path, .. }) if path == "b"));
            assert_eq!(forge.mutation_count(), 0);
        }

        #[tokio::test]
        async fn dry_run_mutates_nothing() {
            let forge = MockForge::new().with_repo("acme/x", "main", &[("a", "1"), ("b", "2")]);
            let t = from_fn(|i| match i.path {
                "a" => Ok(None),
                _ => Ok(Some("new".into())),
            });
            let changes = read(&forge, &["acme/x"], &["a", "b", "c"], &t).await;

            let report = synthesize(&forge, &changes, &main_branch(), "m", true).await;
            let result = &report.results[0];
            assert!(report.is_ok());
            assert_eq!(result.tree_sha, Some(Oid::zero()));
            assert_eq!(result.commit_sha, Some(Oid::zero()));
            assert_eq!(forge.mutation_count(), 0);
        }

        #[tokio::test]
        async fn failure_in_one_repo_leaves_siblings() {
            let forge = MockForge::new()
                .with_repo("acme/a", "main", &[("f", "1")])
                .with_repo("acme/b", "main", &[("f", "2")])
                .fail_on_repo("acme/a", FailOn::CreateCommit(ForgeError::RateLimited));
            let t = from_fn(|_| Ok(Some("changed".into())));
            let changes = read(&forge, &["acme/a", "acme/b"], &["f"], &t).await;

            let report = synthesize(&forge, &changes, &main_branch(), "m", false).await;
            assert!(matches!(report.error, Some(EngineError::Remote { .. })));
            assert_eq!(report.results.len(), 1);
            assert_eq!(report.results[0].repo, repo("acme/b"));
            assert_eq!(forge.file_at("acme/b", "main", "f").as_deref(), Some("changed"));
            assert_eq!(forge.file_at("acme/a", "main", "f").as_deref(), Some("1"));
        }

        #[tokio::test]
        async fn rejected_fast_forward_is_consistency_error() {
            let forge = MockForge::new()
                .with_repo("acme/x", "main", &[("f", "1")])
                .fail_on(FailOn::UpdateRef(ForgeError::NotFastForward("moved".into())));
            let t = from_fn(|_| Ok(Some("changed".into())));
            let changes = read(&forge, &["acme/x"], &["f"], &t).await;

            let report = synthesize(&forge, &changes, &main_branch(), "m", false).await;
            let err = report.error.unwrap();
            assert!(matches!(err, EngineError::NotFastForward { .. }));
            assert_eq!(err.class(), crate::engine::error::ErrorClass::Consistency);
        }
    }
}
