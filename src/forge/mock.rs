//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock forge keeps a small in-memory Git object store per repository
//! (refs, commits, flat trees, blobs) plus open pull requests. It enforces
//! the same rules the real forge does where the engine depends on them:
//! fast-forward-only ref updates, unknown shas rejected, duplicate pull
//! requests rejected. Every call is recorded so tests can assert exactly
//! which remote operations happened, and failures can be injected per
//! operation and per repository.
//!
//! # Example
//!
//! ```
//! use polypatch::core::types::RepoRef;
//! use polypatch::forge::mock::MockForge;
//! use polypatch::forge::Forge;
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new().with_repo("acme/x", "main", &[("README.md", "hello")]);
//! let repo = RepoRef::parse("acme/x").unwrap();
//!
//! let file = forge.get_content(&repo, "README.md", "main").await.unwrap();
//! assert_eq!(file.content, "hello");
//! assert_eq!(forge.mutation_count(), 0);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::traits::{
    CreatePrRequest, EntryKind, FileContent, Forge, ForgeError, PullRequest, Tree, TreeEntry,
};
use crate::core::types::{BranchName, Oid, RefName, RepoRef};

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug, Default)]
struct MockForgeInner {
    repos: HashMap<RepoRef, MockRepo>,
    prs: Vec<(RepoRef, PullRequest)>,
    next_sha: u64,
    /// Injected failures, optionally scoped to one repository.
    fail_on: Vec<(Option<RepoRef>, FailOn)>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Default)]
struct MockRepo {
    /// Full ref name -> commit.
    refs: HashMap<String, Oid>,
    commits: HashMap<Oid, MockCommit>,
    /// Flat trees: path -> blob (or gitlink) entry.
    trees: HashMap<Oid, BTreeMap<String, TreeEntry>>,
    blobs: HashMap<Oid, String>,
    truncate_trees: bool,
}

#[derive(Debug, Clone)]
struct MockCommit {
    tree: Oid,
    parents: Vec<Oid>,
    message: String,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    GetContent(ForgeError),
    GetRef(ForgeError),
    CreateRef(ForgeError),
    CreateBlob(ForgeError),
    GetTree(ForgeError),
    CreateTree(ForgeError),
    CreateCommit(ForgeError),
    UpdateRef(ForgeError),
    CreatePr(ForgeError),
}

impl FailOn {
    fn op_name(&self) -> &'static str {
        match self {
            FailOn::GetContent(_) => "get_content",
            FailOn::GetRef(_) => "get_ref",
            FailOn::CreateRef(_) => "create_ref",
            FailOn::CreateBlob(_) => "create_blob",
            FailOn::GetTree(_) => "get_tree",
            FailOn::CreateTree(_) => "create_tree",
            FailOn::CreateCommit(_) => "create_commit",
            FailOn::UpdateRef(_) => "update_ref",
            FailOn::CreatePr(_) => "create_pr",
        }
    }

    fn error(&self) -> &ForgeError {
        match self {
            FailOn::GetContent(e)
            | FailOn::GetRef(e)
            | FailOn::CreateRef(e)
            | FailOn::CreateBlob(e)
            | FailOn::GetTree(e)
            | FailOn::CreateTree(e)
            | FailOn::CreateCommit(e)
            | FailOn::UpdateRef(e)
            | FailOn::CreatePr(e) => e,
        }
    }
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    GetContent {
        repo: RepoRef,
        path: String,
        git_ref: String,
    },
    GetRef {
        repo: RepoRef,
        refname: String,
    },
    CreateRef {
        repo: RepoRef,
        refname: String,
        sha: Oid,
    },
    CreateBlob {
        repo: RepoRef,
        content: String,
    },
    GetTree {
        repo: RepoRef,
        sha: Oid,
        recursive: bool,
    },
    CreateTree {
        repo: RepoRef,
        entries: Vec<TreeEntry>,
        base_tree: Option<Oid>,
    },
    CreateCommit {
        repo: RepoRef,
        message: String,
        tree: Oid,
        parents: Vec<Oid>,
    },
    UpdateRef {
        repo: RepoRef,
        refname: String,
        sha: Oid,
        force: bool,
    },
    CreatePr {
        repo: RepoRef,
        head: String,
        base: String,
        title: String,
    },
}

impl MockOperation {
    /// The repository this operation addressed.
    pub fn repo(&self) -> &RepoRef {
        match self {
            MockOperation::GetContent { repo, .. }
            | MockOperation::GetRef { repo, .. }
            | MockOperation::CreateRef { repo, .. }
            | MockOperation::CreateBlob { repo, .. }
            | MockOperation::GetTree { repo, .. }
            | MockOperation::CreateTree { repo, .. }
            | MockOperation::CreateCommit { repo, .. }
            | MockOperation::UpdateRef { repo, .. }
            | MockOperation::CreatePr { repo, .. } => repo,
        }
    }

    /// Whether this operation changes remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            MockOperation::GetContent { .. }
                | MockOperation::GetRef { .. }
                | MockOperation::GetTree { .. }
        )
    }

    /// Operation name, matching the `Forge` method.
    pub fn name(&self) -> &'static str {
        match self {
            MockOperation::GetContent { .. } => "get_content",
            MockOperation::GetRef { .. } => "get_ref",
            MockOperation::CreateRef { .. } => "create_ref",
            MockOperation::CreateBlob { .. } => "create_blob",
            MockOperation::GetTree { .. } => "get_tree",
            MockOperation::CreateTree { .. } => "create_tree",
            MockOperation::CreateCommit { .. } => "create_commit",
            MockOperation::UpdateRef { .. } => "update_ref",
            MockOperation::CreatePr { .. } => "create_pr",
        }
    }
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

fn parse_repo(repo: &str) -> RepoRef {
    RepoRef::parse(repo).unwrap_or_else(|e| panic!("mock repo '{repo}': {e}"))
}

impl MockForgeInner {
    fn next_oid(&mut self) -> Oid {
        self.next_sha += 1;
        // 40 hex digits, so always a valid SHA-1 shaped id
        Oid::new(format!("{:040x}", self.next_sha)).unwrap_or_else(|_| Oid::zero())
    }

    /// Pull requests are numbered per repository, starting at 1.
    fn next_pr_number(&self, repo: &RepoRef) -> u64 {
        self.prs.iter().filter(|(r, _)| r == repo).count() as u64 + 1
    }

    fn repo(&self, repo: &RepoRef) -> Result<&MockRepo, ForgeError> {
        self.repos
            .get(repo)
            .ok_or_else(|| ForgeError::NotFound(format!("repository {}", repo)))
    }

    fn repo_mut(&mut self, repo: &RepoRef) -> Result<&mut MockRepo, ForgeError> {
        self.repos
            .get_mut(repo)
            .ok_or_else(|| ForgeError::NotFound(format!("repository {}", repo)))
    }

    /// Store `content` as a blob. Identical content maps to the same sha,
    /// as it does in Git.
    fn store_blob(&mut self, repo: &RepoRef, content: String) -> Oid {
        let existing = self.repos.get(repo).and_then(|state| {
            state
                .blobs
                .iter()
                .find(|(_, c)| **c == content)
                .map(|(sha, _)| sha.clone())
        });
        if let Some(sha) = existing {
            return sha;
        }
        let sha = self.next_oid();
        self.repos
            .entry(repo.clone())
            .or_default()
            .blobs
            .insert(sha.clone(), content);
        sha
    }

    /// Store files as blobs plus a flat tree; returns the tree sha.
    fn store_tree(&mut self, repo: &RepoRef, files: BTreeMap<String, String>) -> Oid {
        let mut entries = BTreeMap::new();
        for (path, content) in files {
            let sha = self.store_blob(repo, content);
            entries.insert(path.clone(), TreeEntry::file(path, sha));
        }
        let tree_sha = self.next_oid();
        self.repos
            .entry(repo.clone())
            .or_default()
            .trees
            .insert(tree_sha.clone(), entries);
        tree_sha
    }
}

impl MockRepo {
    /// Resolve a branch name or commit sha to a commit.
    fn resolve(&self, git_ref: &str) -> Option<Oid> {
        if let Some(sha) = self.refs.get(&branch_ref(git_ref)) {
            return Some(sha.clone());
        }
        Oid::new(git_ref)
            .ok()
            .filter(|oid| self.commits.contains_key(oid))
    }

    /// Resolve a tree-ish (tree or commit sha) to a tree sha.
    fn tree_of(&self, sha: &Oid) -> Option<Oid> {
        if self.trees.contains_key(sha) {
            return Some(sha.clone());
        }
        self.commits.get(sha).map(|c| c.tree.clone())
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> bool {
        let mut stack = vec![descendant.clone()];
        let mut seen = HashSet::new();
        while let Some(sha) = stack.pop() {
            if &sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        false
    }
}

impl MockForge {
    /// Create a new empty mock forge.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockForgeInner::default())),
        }
    }

    /// Add a repository whose `branch` holds exactly `files`.
    pub fn with_repo(self, repo: &str, branch: &str, files: &[(&str, &str)]) -> Self {
        let repo = parse_repo(repo);
        {
            let mut inner = self.inner.lock().unwrap();
            let files = files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect();
            let tree = inner.store_tree(&repo, files);
            let commit = inner.next_oid();
            let state = inner.repos.entry(repo).or_default();
            state.commits.insert(
                commit.clone(),
                MockCommit {
                    tree,
                    parents: Vec::new(),
                    message: "initial commit".into(),
                },
            );
            state.refs.insert(branch_ref(branch), commit);
        }
        self
    }

    /// Add `branch` pointing at the current head of `from`.
    pub fn with_branch(self, repo: &str, branch: &str, from: &str) -> Self {
        let repo = parse_repo(repo);
        {
            let mut inner = self.inner.lock().unwrap();
            let state = inner.repos.entry(repo).or_default();
            let head = state
                .refs
                .get(&branch_ref(from))
                .cloned()
                .unwrap_or_else(|| panic!("mock branch '{from}' does not exist"));
            state.refs.insert(branch_ref(branch), head);
        }
        self
    }

    /// Make recursive tree listings in `repo` come back truncated.
    pub fn with_truncated_trees(self, repo: &str) -> Self {
        let repo = parse_repo(repo);
        self.inner
            .lock()
            .unwrap()
            .repos
            .entry(repo)
            .or_default()
            .truncate_trees = true;
        self
    }

    /// Add an open pull request `head -> base`.
    pub fn with_pr(self, repo: &str, head: &str, base: &str) -> Self {
        let repo = parse_repo(repo);
        {
            let mut inner = self.inner.lock().unwrap();
            let number = inner.next_pr_number(&repo);
            let head_sha = inner
                .repos
                .get(&repo)
                .and_then(|r| r.refs.get(&branch_ref(head)).cloned())
                .unwrap_or_else(Oid::zero);
            inner.prs.push((
                repo.clone(),
                PullRequest {
                    number,
                    url: format!("https://github.com/{}/pull/{}", repo, number),
                    head: head.to_string(),
                    base: base.to_string(),
                    head_sha,
                },
            ));
        }
        self
    }

    /// Configure the mock to fail an operation in every repository.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on.push((None, fail_on));
        self
    }

    /// Configure the mock to fail an operation in one repository only.
    pub fn fail_on_repo(self, repo: &str, fail_on: FailOn) -> Self {
        let repo = parse_repo(repo);
        self.inner.lock().unwrap().fail_on.push((Some(repo), fail_on));
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on.clear();
    }

    /// Simulate someone else pushing `files` (path, content; `None` deletes)
    /// on top of `branch`. Returns the new head.
    pub fn push_commit(&self, repo: &str, branch: &str, files: &[(&str, Option<&str>)]) -> Oid {
        let repo = parse_repo(repo);
        let mut inner = self.inner.lock().unwrap();
        let (head, mut contents) = {
            let state = inner.repos.get(&repo).expect("mock repo exists");
            let head = state.refs.get(&branch_ref(branch)).cloned().expect("mock branch exists");
            let tree = &state.trees[&state.commits[&head].tree];
            let contents: BTreeMap<String, String> = tree
                .iter()
                .map(|(p, e)| (p.clone(), state.blobs[&e.sha].clone()))
                .collect();
            (head, contents)
        };
        for (path, content) in files {
            match content {
                Some(c) => contents.insert(path.to_string(), c.to_string()),
                None => contents.remove(*path),
            };
        }
        let tree = inner.store_tree(&repo, contents);
        let commit = inner.next_oid();
        let state = inner.repos.get_mut(&repo).expect("mock repo exists");
        state.commits.insert(
            commit.clone(),
            MockCommit {
                tree,
                parents: vec![head],
                message: "external change".into(),
            },
        );
        state.refs.insert(branch_ref(branch), commit.clone());
        commit
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// Number of recorded operations with the given `Forge` method name.
    pub fn count(&self, name: &str) -> usize {
        self.operations().iter().filter(|op| op.name() == name).count()
    }

    /// Number of recorded state-changing operations.
    pub fn mutation_count(&self) -> usize {
        self.operations().iter().filter(|op| op.is_mutation()).count()
    }

    /// Head commit of `branch`, if it exists.
    pub fn branch_sha(&self, repo: &str, branch: &str) -> Option<Oid> {
        let inner = self.inner.lock().unwrap();
        inner
            .repos
            .get(&parse_repo(repo))
            .and_then(|r| r.refs.get(&branch_ref(branch)).cloned())
    }

    /// Content of `path` at the head of `branch`.
    pub fn file_at(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        let state = inner.repos.get(&parse_repo(repo))?;
        let head = state.refs.get(&branch_ref(branch))?;
        let tree = state.trees.get(&state.commits.get(head)?.tree)?;
        let entry = tree.get(path)?;
        state.blobs.get(&entry.sha).cloned()
    }

    /// Paths present at the head of `branch`.
    pub fn paths_at(&self, repo: &str, branch: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .repos
            .get(&parse_repo(repo))
            .and_then(|state| {
                let head = state.refs.get(&branch_ref(branch))?;
                let tree = state.trees.get(&state.commits.get(head)?.tree)?;
                Some(tree.keys().cloned().collect())
            })
            .unwrap_or_default()
    }

    /// Parent shas and message of a commit.
    pub fn commit_info(&self, repo: &str, sha: &Oid) -> Option<(Vec<Oid>, String)> {
        let inner = self.inner.lock().unwrap();
        inner
            .repos
            .get(&parse_repo(repo))?
            .commits
            .get(sha)
            .map(|c| (c.parents.clone(), c.message.clone()))
    }

    /// Open pull requests in `repo`.
    pub fn prs(&self, repo: &str) -> Vec<PullRequest> {
        let repo = parse_repo(repo);
        let inner = self.inner.lock().unwrap();
        inner
            .prs
            .iter()
            .filter(|(r, _)| *r == repo)
            .map(|(_, pr)| pr.clone())
            .collect()
    }

    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, op: &str, repo: &RepoRef) -> Result<(), ForgeError> {
        let inner = self.inner.lock().unwrap();
        let hit = inner.fail_on.iter().find(|(scope, fail)| {
            fail.op_name() == op && scope.as_ref().map_or(true, |r| r == repo)
        });
        match hit {
            Some((_, fail)) => Err(fail.error().clone()),
            None => Ok(()),
        }
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, ForgeError> {
        self.record(MockOperation::GetContent {
            repo: repo.clone(),
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        });
        self.check_fail("get_content", repo)?;

        let inner = self.inner.lock().unwrap();
        let state = inner.repo(repo)?;
        let not_found = || ForgeError::NotFound(format!("{}@{}", path, git_ref));
        let commit = state.resolve(git_ref).ok_or_else(not_found)?;
        let tree = &state.trees[&state.commits[&commit].tree];
        let entry = tree.get(path).ok_or_else(not_found)?;
        let content = state.blobs.get(&entry.sha).cloned().ok_or_else(not_found)?;

        Ok(FileContent {
            content,
            sha: entry.sha.clone(),
        })
    }

    async fn get_ref(&self, repo: &RepoRef, refname: &RefName) -> Result<Oid, ForgeError> {
        self.record(MockOperation::GetRef {
            repo: repo.clone(),
            refname: refname.to_string(),
        });
        self.check_fail("get_ref", repo)?;

        let inner = self.inner.lock().unwrap();
        inner
            .repo(repo)?
            .refs
            .get(refname.as_str())
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(refname.to_string()))
    }

    async fn create_ref(
        &self,
        repo: &RepoRef,
        refname: &RefName,
        sha: &Oid,
    ) -> Result<Oid, ForgeError> {
        self.record(MockOperation::CreateRef {
            repo: repo.clone(),
            refname: refname.to_string(),
            sha: sha.clone(),
        });
        self.check_fail("create_ref", repo)?;

        let mut inner = self.inner.lock().unwrap();
        let state = inner.repo_mut(repo)?;
        if state.refs.contains_key(refname.as_str()) {
            return Err(ForgeError::AlreadyExists("Reference already exists".into()));
        }
        if !state.commits.contains_key(sha) {
            return Err(ForgeError::ApiError {
                status: 422,
                message: format!("Object does not exist: {}", sha),
            });
        }
        state.refs.insert(refname.to_string(), sha.clone());
        Ok(sha.clone())
    }

    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<Oid, ForgeError> {
        self.record(MockOperation::CreateBlob {
            repo: repo.clone(),
            content: content.to_string(),
        });
        self.check_fail("create_blob", repo)?;

        let mut inner = self.inner.lock().unwrap();
        inner.repo(repo)?;
        Ok(inner.store_blob(repo, content.to_string()))
    }

    async fn get_tree(
        &self,
        repo: &RepoRef,
        sha: &Oid,
        recursive: bool,
    ) -> Result<Tree, ForgeError> {
        self.record(MockOperation::GetTree {
            repo: repo.clone(),
            sha: sha.clone(),
            recursive,
        });
        self.check_fail("get_tree", repo)?;

        let inner = self.inner.lock().unwrap();
        let state = inner.repo(repo)?;
        let tree_sha = state
            .tree_of(sha)
            .ok_or_else(|| ForgeError::NotFound(format!("tree {}", sha)))?;
        let files = &state.trees[&tree_sha];

        // Recursive listings name every directory too, as the real API does.
        let mut entries: Vec<TreeEntry> = Vec::new();
        let mut dirs = BTreeSet::new();
        for (path, entry) in files {
            let mut parts: Vec<&str> = path.split('/').collect();
            parts.pop();
            let mut prefix = String::new();
            for part in parts {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(part);
                if dirs.insert(prefix.clone()) {
                    entries.push(TreeEntry {
                        path: prefix.clone(),
                        mode: "040000".into(),
                        kind: EntryKind::Tree,
                        sha: Oid::zero(),
                    });
                }
            }
            if recursive || !path.contains('/') {
                entries.push(entry.clone());
            }
        }
        if !recursive {
            entries.retain(|e| !e.path.contains('/'));
        }

        let truncated = recursive && state.truncate_trees;
        if truncated {
            entries.truncate(entries.len() / 2);
        }

        Ok(Tree {
            sha: tree_sha,
            entries,
            truncated,
        })
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        entries: &[TreeEntry],
        base_tree: Option<&Oid>,
    ) -> Result<Oid, ForgeError> {
        self.record(MockOperation::CreateTree {
            repo: repo.clone(),
            entries: entries.to_vec(),
            base_tree: base_tree.cloned(),
        });
        self.check_fail("create_tree", repo)?;

        let mut inner = self.inner.lock().unwrap();
        let state = inner.repo(repo)?;

        let mut files = match base_tree {
            Some(base) => {
                let tree_sha = state.tree_of(base).ok_or_else(|| ForgeError::ApiError {
                    status: 422,
                    message: format!("base_tree {} does not exist", base),
                })?;
                state.trees[&tree_sha].clone()
            }
            None => BTreeMap::new(),
        };

        let mut seen = BTreeSet::new();
        for entry in entries {
            if !seen.insert(entry.path.as_str()) {
                return Err(ForgeError::ApiError {
                    status: 422,
                    message: format!("duplicate tree entry '{}'", entry.path),
                });
            }
            match entry.kind {
                EntryKind::Blob if state.blobs.contains_key(&entry.sha) => {
                    files.insert(entry.path.clone(), entry.clone());
                }
                EntryKind::Commit => {
                    files.insert(entry.path.clone(), entry.clone());
                }
                _ => {
                    return Err(ForgeError::ApiError {
                        status: 422,
                        message: format!(
                            "tree.sha {} for '{}' is not a valid {:?}",
                            entry.sha, entry.path, entry.kind
                        ),
                    })
                }
            }
        }

        let sha = inner.next_oid();
        inner.repo_mut(repo)?.trees.insert(sha.clone(), files);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, ForgeError> {
        self.record(MockOperation::CreateCommit {
            repo: repo.clone(),
            message: message.to_string(),
            tree: tree.clone(),
            parents: parents.to_vec(),
        });
        self.check_fail("create_commit", repo)?;

        let mut inner = self.inner.lock().unwrap();
        let state = inner.repo(repo)?;
        if !state.trees.contains_key(tree) {
            return Err(ForgeError::ApiError {
                status: 422,
                message: format!("tree {} does not exist", tree),
            });
        }
        if let Some(missing) = parents.iter().find(|p| !state.commits.contains_key(*p)) {
            return Err(ForgeError::ApiError {
                status: 422,
                message: format!("parent {} does not exist", missing),
            });
        }

        let sha = inner.next_oid();
        inner.repo_mut(repo)?.commits.insert(
            sha.clone(),
            MockCommit {
                tree: tree.clone(),
                parents: parents.to_vec(),
                message: message.to_string(),
            },
        );
        Ok(sha)
    }

    async fn update_ref(
        &self,
        repo: &RepoRef,
        refname: &RefName,
        sha: &Oid,
        force: bool,
    ) -> Result<Oid, ForgeError> {
        self.record(MockOperation::UpdateRef {
            repo: repo.clone(),
            refname: refname.to_string(),
            sha: sha.clone(),
            force,
        });
        self.check_fail("update_ref", repo)?;

        let mut inner = self.inner.lock().unwrap();
        let state = inner.repo_mut(repo)?;
        let current = state
            .refs
            .get(refname.as_str())
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(refname.to_string()))?;
        if !state.commits.contains_key(sha) {
            return Err(ForgeError::ApiError {
                status: 422,
                message: format!("Object does not exist: {}", sha),
            });
        }
        if !force && !state.is_ancestor(&current, sha) {
            return Err(ForgeError::NotFastForward(
                "Update is not a fast forward".into(),
            ));
        }
        state.refs.insert(refname.to_string(), sha.clone());
        Ok(sha.clone())
    }

    async fn create_pr(
        &self,
        repo: &RepoRef,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        self.record(MockOperation::CreatePr {
            repo: repo.clone(),
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
        });
        self.check_fail("create_pr", repo)?;

        let mut inner = self.inner.lock().unwrap();
        let head_sha = inner
            .repo(repo)?
            .refs
            .get(&branch_ref(&request.head))
            .cloned()
            .ok_or_else(|| ForgeError::ApiError {
                status: 422,
                message: format!("head '{}' does not exist", request.head),
            })?;

        let duplicate = inner
            .prs
            .iter()
            .any(|(r, pr)| r == repo && pr.head == request.head && pr.base == request.base);
        if duplicate {
            return Err(ForgeError::AlreadyExists(format!(
                "A pull request already exists for {}:{}.",
                repo.org(),
                request.head
            )));
        }

        let number = inner.next_pr_number(repo);
        let pr = PullRequest {
            number,
            url: format!("https://github.com/{}/pull/{}", repo, number),
            head: request.head,
            base: request.base,
            head_sha,
        };
        inner.prs.push((repo.clone(), pr.clone()));
        Ok(pr)
    }
}

/// Convenience for tests that address branches by name.
pub fn branch(name: &str) -> RefName {
    RefName::for_branch(&BranchName::new(name).unwrap_or_else(|e| panic!("{e}")))
}
