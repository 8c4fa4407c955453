//! Property-based tests for change classification and tree rebuilding.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use polypatch::core::change::{ChangeKind, FileChange};
use polypatch::core::types::{BranchName, Oid, RepoRef};
use polypatch::engine::commit::{rebuild_tree, sparse_tree, BlobPost};
use polypatch::forge::{EntryKind, TreeEntry};
use polypatch::ui::output::unified_diff;

/// Strategy for generating valid branch name characters.
fn branch_name_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('/'),
    ]
}

/// Strategy for generating valid branch names.
fn valid_branch_name() -> impl Strategy<Value = String> {
    prop::collection::vec(branch_name_char(), 1..40).prop_filter_map(
        "must be valid branch name",
        |chars| {
            let name: String = chars.into_iter().collect();
            let bad = name.starts_with('-')
                || name.starts_with('/')
                || name.ends_with('/')
                || name.contains("//")
                || name.starts_with("refs/");
            (!bad).then_some(name)
        },
    )
}

/// Strategy for repository owner and name segments.
fn repo_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9_-]{0,20}"
}

fn content() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z\n]{0,12}")
}

fn oid(n: usize) -> Oid {
    Oid::new(format!("{:040x}", n)).unwrap()
}

/// What happens to one path in a generated commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Update,
    Delete,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Keep), Just(Op::Update), Just(Op::Delete)]
}

proptest! {
    #[test]
    fn classify_matches_content_presence(orig in content(), new in content()) {
        let kind = ChangeKind::classify(orig.as_deref(), new.as_deref());
        match (&orig, &new) {
            (None, None) => prop_assert_eq!(kind, None),
            (None, Some(_)) => prop_assert_eq!(kind, Some(ChangeKind::Create)),
            (Some(_), None) => prop_assert_eq!(kind, Some(ChangeKind::Delete)),
            (Some(o), Some(n)) if o == n => prop_assert_eq!(kind, Some(ChangeKind::Unchanged)),
            (Some(_), Some(_)) => prop_assert_eq!(kind, Some(ChangeKind::Update)),
        }
    }

    #[test]
    fn blob_needed_only_when_new_content_differs(orig in content(), new in content()) {
        if let Some(kind) = ChangeKind::classify(orig.as_deref(), new.as_deref()) {
            prop_assert_eq!(kind.needs_blob(), new.is_some() && orig != new);
        }
    }

    #[test]
    fn valid_branch_names_accepted(name in valid_branch_name()) {
        let branch = BranchName::new(name.clone());
        prop_assert!(branch.is_ok(), "rejected {}", name);
        let branch = branch.unwrap();
        prop_assert_eq!(branch.as_str(), name.as_str());
    }

    #[test]
    fn repo_ref_display_roundtrip(owner in repo_segment(), name in repo_segment()) {
        let text = format!("{}/{}", owner, name);
        let repo = RepoRef::parse(&text).unwrap();
        prop_assert_eq!(repo.org(), owner.as_str());
        prop_assert_eq!(repo.name(), name.as_str());
        prop_assert_eq!(repo.to_string(), text);
    }

    #[test]
    fn rebuild_applies_every_change(
        existing in prop::collection::btree_map("[a-z]{1,6}(/[a-z]{1,6})?", op(), 1..12),
        created in prop::collection::btree_set("new_[a-z]{1,6}", 0..4),
    ) {
        let repo = RepoRef::parse("acme/x").unwrap();
        let listing: Vec<TreeEntry> = existing
            .keys()
            .enumerate()
            .map(|(i, path)| TreeEntry::file(path.clone(), oid(i + 1)))
            .collect();
        let listed_sha: BTreeMap<&str, &Oid> =
            listing.iter().map(|e| (e.path.as_str(), &e.sha)).collect();

        let mut changes = Vec::new();
        for (path, op) in &existing {
            let new = match op {
                Op::Keep => Some("same"),
                Op::Update => Some("changed"),
                Op::Delete => None,
            };
            changes.push(FileChange {
                repo: repo.clone(),
                path: path.clone(),
                orig: Some("same".into()),
                new: new.map(String::from),
                sha: Some(listed_sha[path.as_str()].clone()),
            });
        }
        for path in &created {
            changes.push(FileChange {
                repo: repo.clone(),
                path: path.clone(),
                orig: None,
                new: Some("fresh".into()),
                sha: None,
            });
        }

        let blobs: Vec<BlobPost> = changes
            .iter()
            .enumerate()
            .map(|(i, c)| BlobPost {
                repo: repo.clone(),
                path: c.path.clone(),
                sha: c.kind().filter(|k| k.needs_blob()).map(|_| oid(1000 + i)),
            })
            .collect();
        let refs: Vec<&FileChange> = changes.iter().collect();

        let tree = rebuild_tree(&listing, &refs, &blobs).unwrap();

        let paths: BTreeSet<&str> = tree.iter().map(|e| e.path.as_str()).collect();
        prop_assert_eq!(paths.len(), tree.len(), "duplicate path in rebuilt tree");

        let expected: BTreeSet<&str> = existing
            .iter()
            .filter(|(_, op)| **op != Op::Delete)
            .map(|(p, _)| p.as_str())
            .chain(created.iter().map(String::as_str))
            .collect();
        prop_assert_eq!(&paths, &expected);

        let blob_sha: BTreeMap<&str, &Oid> = blobs
            .iter()
            .filter_map(|b| b.sha.as_ref().map(|s| (b.path.as_str(), s)))
            .collect();
        for entry in &tree {
            prop_assert_eq!(entry.kind, EntryKind::Blob);
            match existing.get(&entry.path) {
                Some(Op::Keep) => prop_assert_eq!(&entry.sha, listed_sha[entry.path.as_str()]),
                _ => prop_assert_eq!(&entry.sha, blob_sha[entry.path.as_str()]),
            }
        }
    }

    #[test]
    fn sparse_tree_only_carries_posted_blobs(shas in prop::collection::vec(prop::option::of(1usize..500), 0..10)) {
        let repo = RepoRef::parse("acme/x").unwrap();
        let blobs: Vec<BlobPost> = shas
            .iter()
            .enumerate()
            .map(|(i, sha)| BlobPost {
                repo: repo.clone(),
                path: format!("f{}", i),
                sha: sha.map(oid),
            })
            .collect();

        let tree = sparse_tree(&blobs);
        prop_assert_eq!(tree.len(), shas.iter().filter(|s| s.is_some()).count());
        prop_assert!(tree.iter().all(|e| e.mode == "100644"));
    }

    #[test]
    fn identical_content_diffs_to_headers_only(text in "[a-z\n]{0,40}") {
        let diff = unified_diff("acme/x/f", Some(&text), Some(&text));
        prop_assert_eq!(diff, "--- a/acme/x/f\n+++ b/acme/x/f\n");
    }
}
