//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! The engine only produces [`ActionRecord`]s. How they are shown is a
//! [`Formatter`] chosen by `--format`:
//!
//! - `json`: one object with the action, every record, and the error
//! - `text`: one line per record
//! - `diff`: unified diffs of `content.orig` against `content.new`
//!
//! Rendered output goes to stdout. Messages go to stderr and respect the
//! quiet flag; errors are always shown.

use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::core::change::ChangeKind;
use crate::core::records::{ActionRecord, ContentRecord};
use crate::engine::{Action, EngineError, Report};

/// Lines of context around each diff hunk.
pub const DIFF_CONTEXT: usize = 3;

/// Errors from rendering output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown output format '{0}' (expected json, text, or diff)")]
    UnknownFormat(String),
}

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Output format.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    Json,
    #[default]
    Text,
    Diff,
}

impl FromStr for Format {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Format::Json),
            "text" => Ok(Format::Text),
            "diff" => Ok(Format::Diff),
            other => Err(OutputError::UnknownFormat(other.to_string())),
        }
    }
}

impl Format {
    /// Whether the output is meant for a program rather than a person.
    pub fn is_machine(&self) -> bool {
        matches!(self, Format::Json | Format::Diff)
    }
}

/// Renders the report of one action.
pub trait Formatter {
    fn render(&self, action: Action, report: &Report<ActionRecord>) -> Result<String, OutputError>;
}

/// Formatter for `format`.
pub fn formatter(format: Format) -> Box<dyn Formatter> {
    match format {
        Format::Json => Box::new(JsonFormatter),
        Format::Text => Box::new(TextFormatter),
        Format::Diff => Box::new(DiffFormatter),
    }
}

/// Pretty-printed JSON.
pub struct JsonFormatter;

#[derive(Serialize)]
struct JsonReport<'a> {
    action: Action,
    results: &'a [ActionRecord],
    error: Option<JsonError>,
}

#[derive(Serialize)]
struct JsonError {
    class: String,
    message: String,
}

impl From<&EngineError> for JsonError {
    fn from(e: &EngineError) -> Self {
        Self {
            class: e.class().to_string(),
            message: error_chain(e),
        }
    }
}

/// The error and its sources, joined the way `{:#}` joins an anyhow chain.
fn error_chain(e: &EngineError) -> String {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl Formatter for JsonFormatter {
    fn render(&self, action: Action, report: &Report<ActionRecord>) -> Result<String, OutputError> {
        let out = JsonReport {
            action,
            results: &report.results,
            error: report.error.as_ref().map(JsonError::from),
        };
        let mut rendered = serde_json::to_string_pretty(&out)?;
        rendered.push('\n');
        Ok(rendered)
    }
}

/// One line per record.
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn render(&self, _action: Action, report: &Report<ActionRecord>) -> Result<String, OutputError> {
        let mut out = String::new();
        for record in &report.results {
            out.push_str(&describe(record));
            out.push('\n');
        }
        Ok(out)
    }
}

/// Describe a record on one line.
pub fn describe(record: &ActionRecord) -> String {
    let mut parts = vec![record.repo.to_string()];

    if let Some(file) = &record.file {
        parts.push(file.clone());
    }
    if let Some(content) = &record.content {
        parts.push(content_kind(content).to_string());
    }
    if let Some(branch) = &record.branch {
        let head = if branch.head_sha.is_zero() {
            "(dry run)".to_string()
        } else {
            branch.head_sha.short(7).to_string()
        };
        let note = if branch.dest_existed { " (existed)" } else { "" };
        parts.push(format!(
            "branch {} from {} at {}{}",
            branch.dest_branch, branch.src_branch, head, note
        ));
    }
    if let Some(commit) = &record.commit {
        parts.push(match &commit.commit_sha {
            None => "no change".to_string(),
            Some(sha) if sha.is_zero() => "commit (dry run)".to_string(),
            Some(sha) => format!("commit {}", sha.short(7)),
        });
    }
    if let Some(pr) = &record.pull_request {
        parts.push(match (&pr.url, pr.existed) {
            (_, true) => "pull request already open".to_string(),
            (Some(url), false) => format!("pull request {}", url),
            (None, false) => "pull request (dry run)".to_string(),
        });
    }
    parts.join("  ")
}

fn content_kind(content: &ContentRecord) -> &'static str {
    if content.create {
        "create"
    } else if content.update {
        "update"
    } else if content.delete {
        "delete"
    } else if content.orig.is_none() {
        "absent"
    } else {
        "unchanged"
    }
}

/// Unified diffs of every changed file.
pub struct DiffFormatter;

impl Formatter for DiffFormatter {
    fn render(&self, _action: Action, report: &Report<ActionRecord>) -> Result<String, OutputError> {
        let mut out = String::new();
        for record in &report.results {
            let (Some(file), Some(content)) = (&record.file, &record.content) else {
                continue;
            };
            let kind = ChangeKind::classify(content.orig.as_deref(), content.new.as_deref());
            if matches!(kind, None | Some(ChangeKind::Unchanged)) {
                continue;
            }
            let path = format!("{}/{}", record.repo, file);
            out.push_str(&unified_diff(
                &path,
                content.orig.as_deref(),
                content.new.as_deref(),
            ));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit<'a> {
    Keep(&'a str),
    Remove(&'a str),
    Add(&'a str),
}

impl Edit<'_> {
    fn in_old(&self) -> bool {
        !matches!(self, Edit::Add(_))
    }

    fn in_new(&self) -> bool {
        !matches!(self, Edit::Remove(_))
    }
}

/// Line edits turning `old` into `new`, via longest common subsequence.
fn edits<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
    let (n, m) = (old.len(), new.len());
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            out.push(Edit::Keep(old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(Edit::Remove(old[i]));
            i += 1;
        } else {
            out.push(Edit::Add(new[j]));
            j += 1;
        }
    }
    out.extend(old[i..].iter().map(|l| Edit::Remove(*l)));
    out.extend(new[j..].iter().map(|l| Edit::Add(*l)));
    out
}

/// Render a unified diff for one file. `None` is an absent file.
pub fn unified_diff(path: &str, orig: Option<&str>, new: Option<&str>) -> String {
    let old_lines: Vec<&str> = orig.map(|s| s.lines().collect()).unwrap_or_default();
    let new_lines: Vec<&str> = new.map(|s| s.lines().collect()).unwrap_or_default();
    let edits = edits(&old_lines, &new_lines);

    let mut out = String::new();
    match orig {
        Some(_) => out.push_str(&format!("--- a/{}\n", path)),
        None => out.push_str("--- /dev/null\n"),
    }
    match new {
        Some(_) => out.push_str(&format!("+++ b/{}\n", path)),
        None => out.push_str("+++ /dev/null\n"),
    }

    for (lo, hi) in hunks(&edits, DIFF_CONTEXT) {
        let old_before = edits[..lo].iter().filter(|e| e.in_old()).count();
        let new_before = edits[..lo].iter().filter(|e| e.in_new()).count();
        let old_len = edits[lo..hi].iter().filter(|e| e.in_old()).count();
        let new_len = edits[lo..hi].iter().filter(|e| e.in_new()).count();
        let start = |before: usize, len: usize| if len == 0 { before } else { before + 1 };

        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            start(old_before, old_len),
            old_len,
            start(new_before, new_len),
            new_len
        ));
        for edit in &edits[lo..hi] {
            let (sign, line) = match edit {
                Edit::Keep(l) => (' ', l),
                Edit::Remove(l) => ('-', l),
                Edit::Add(l) => ('+', l),
            };
            out.push(sign);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Index ranges of `edits` to print, each change padded by `context`.
fn hunks(edits: &[Edit<'_>], context: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (i, _) in edits
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e, Edit::Keep(_)))
    {
        let lo = i.saturating_sub(context);
        let hi = (i + 1 + context).min(edits.len());
        match ranges.last_mut() {
            Some(last) if lo <= last.1 => last.1 = hi,
            _ => ranges.push((lo, hi)),
        }
    }
    ranges
}

/// Write rendered output to stdout.
///
/// Quiet mode drops human-readable output only; machine formats are
/// always written.
pub fn emit(rendered: &str, format: Format, verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet && !format.is_machine() {
        return;
    }
    print!("{}", rendered);
}

/// Print a debug message (only in debug mode).
pub fn debug(message: impl Display, verbosity: Verbosity) {
    if verbosity == Verbosity::Debug {
        eprintln!("[debug] {}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change::FileChange;
    use crate::core::records::{BranchResult, CommitResult, PullRequestResult};
    use crate::core::types::{BranchName, Oid, RepoRef};

    fn repo() -> RepoRef {
        RepoRef::parse("acme/x").unwrap()
    }

    fn file_record(orig: Option<&str>, new: Option<&str>) -> ActionRecord {
        ActionRecord::for_file(&FileChange {
            repo: repo(),
            path: "README.md".into(),
            orig: orig.map(String::from),
            new: new.map(String::from),
            sha: None,
        })
    }

    mod verbosity {
        use super::*;

        #[test]
        fn from_flags() {
            assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
            assert_eq!(Verbosity::from_flags(false, true), Verbosity::Debug);
            assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        }

        #[test]
        fn format_parse() {
            assert_eq!("diff".parse::<Format>().unwrap(), Format::Diff);
            assert!("yaml".parse::<Format>().is_err());
            assert!(Format::Json.is_machine());
            assert!(!Format::Text.is_machine());
        }
    }

    mod json {
        use super::*;

        #[test]
        fn includes_action_and_error_class() {
            let report = Report {
                results: vec![file_record(Some("a"), Some("b"))],
                error: Some(EngineError::SameBranch(BranchName::new("main").unwrap())),
            };
            let rendered = JsonFormatter.render(Action::Read, &report).unwrap();
            let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

            assert_eq!(value["action"], "read");
            assert_eq!(value["results"][0]["repo"], "acme/x");
            assert_eq!(value["results"][0]["content"]["update"], true);
            assert_eq!(value["error"]["class"], "policy violation");
            assert!(value["results"][0].get("branch").is_none());
        }

        #[test]
        fn null_error_on_success() {
            let rendered = JsonFormatter
                .render(Action::Branch, &Report::ok(vec![]))
                .unwrap();
            let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
            assert!(value["error"].is_null());
        }

        #[test]
        fn remote_error_message_names_cause_once() {
            let report: Report<ActionRecord> = Report::failed(EngineError::remote(
                "acme/x@feat",
                crate::forge::ForgeError::RateLimited,
            ));
            let rendered = JsonFormatter.render(Action::Branch, &report).unwrap();
            let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

            assert_eq!(value["error"]["class"], "remote error");
            assert_eq!(value["error"]["message"], "acme/x@feat: rate limited");
        }
    }

    mod text {
        use super::*;

        #[test]
        fn describes_each_record_kind() {
            let branch = ActionRecord::from(BranchResult {
                repo: repo(),
                src_branch: BranchName::new("main").unwrap(),
                dest_branch: BranchName::new("feat").unwrap(),
                dest_existed: true,
                head_sha: Oid::new("a".repeat(40)).unwrap(),
            });
            let commit = file_record(Some("a"), Some("b")).with_commit(CommitResult {
                repo: repo(),
                parent_sha: Oid::new("b".repeat(40)).unwrap(),
                tree_sha: Some(Oid::zero()),
                commit_sha: Some(Oid::zero()),
                is_noop: false,
            });
            let pr = ActionRecord::from(PullRequestResult {
                repo: repo(),
                url: Some("https://github.com/acme/x/pull/3".into()),
                existed: false,
                head_sha: None,
            });

            let rendered = TextFormatter
                .render(Action::BranchToPr, &Report::ok(vec![branch, commit, pr]))
                .unwrap();
            let lines: Vec<_> = rendered.lines().collect();
            assert_eq!(lines[0], "acme/x  branch feat from main at aaaaaaa (existed)");
            assert_eq!(lines[1], "acme/x  README.md  update  commit (dry run)");
            assert_eq!(lines[2], "acme/x  pull request https://github.com/acme/x/pull/3");
        }

        #[test]
        fn absent_and_unchanged_files() {
            assert!(describe(&file_record(None, None)).ends_with("absent"));
            assert!(describe(&file_record(Some("a"), Some("a"))).ends_with("unchanged"));
        }
    }

    mod diff {
        use super::*;

        #[test]
        fn update_hunk() {
            let diff = unified_diff("acme/x/f", Some("a\nb\nc\n"), Some("a\nB\nc\n"));
            assert_eq!(
                diff,
                "--- a/acme/x/f\n+++ b/acme/x/f\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n"
            );
        }

        #[test]
        fn create_and_delete_use_dev_null() {
            let created = unified_diff("acme/x/f", None, Some("hi\n"));
            assert!(created.starts_with("--- /dev/null\n+++ b/acme/x/f\n@@ -0,0 +1,1 @@\n+hi\n"));

            let deleted = unified_diff("acme/x/f", Some("bye\n"), None);
            assert!(deleted.ends_with("+++ /dev/null\n@@ -1,1 +0,0 @@\n-bye\n"));
        }

        #[test]
        fn distant_changes_split_into_hunks() {
            let mut lines: Vec<String> = (1..=20).map(|n| n.to_string()).collect();
            let old = lines.join("\n");
            lines[1] = "two".into();
            lines[18] = "nineteen".into();
            let new = lines.join("\n");
            let diff = unified_diff("f", Some(&old), Some(&new));
            assert_eq!(diff.matches("@@ -").count(), 2);
        }

        #[test]
        fn formatter_skips_unchanged_and_non_file_records() {
            let report = Report::ok(vec![
                file_record(Some("same"), Some("same")),
                file_record(Some("old"), Some("new")),
            ]);
            let rendered = DiffFormatter.render(Action::Read, &report).unwrap();
            assert_eq!(rendered.matches("--- a/acme/x/README.md").count(), 1);
        }
    }
}
