//! Diff data model: typed lines, hunks, and whole-diff snapshots.
//!
//! All types in this module are fully owned (no borrowed lifetimes) and
//! immutable after construction: a `GitDiff` is a snapshot, and re-slicing
//! it by file or hunk subset produces a *new* value so earlier views stay
//! valid. The parser that builds these types lives in [`crate::parse`].

use serde::{Deserialize, Serialize};

/// The kind of a single line inside a diff hunk.
///
/// Closed set: consumers match exhaustively. Lines the parser cannot
/// classify (e.g. `\ No newline at end of file` markers) degrade to
/// `Header` rather than being dropped, so every body line maps to exactly
/// one [`DiffLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Added,
    Removed,
    Context,
    Header,
}

/// A single line from a diff with position metadata.
///
/// Invariants (enforced by [`Hunk::diff_lines`], the only constructor path):
/// - `Added` and `Context` lines always carry `new_line_number`.
/// - `Removed` and `Context` lines always carry `old_line_number`.
/// - `Header` lines carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// Line content without the `+`/`-`/space prefix.
    pub content: String,
    /// The original line including its prefix character.
    pub raw_line: String,
    pub kind: DiffLineKind,
    /// Line number in the new (post-change) file, if the line exists there.
    pub new_line_number: Option<u32>,
    /// Line number in the old (pre-change) file, if the line exists there.
    pub old_line_number: Option<u32>,
}

impl DiffLine {
    /// Whether this line represents an actual change (added or removed).
    pub fn is_changed(&self) -> bool {
        matches!(self.kind, DiffLineKind::Added | DiffLineKind::Removed)
    }
}

/// One contiguous `@@ ... @@` block of a unified diff for a single file.
///
/// Constructed once by the parser from a header + body block and never
/// mutated afterwards. `content` holds the full original text (file header
/// lines plus the `@@` block) so the raw hunk can be reproduced verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hunk {
    /// Post-change (`b/` side) path of the file this hunk touches.
    pub file_path: String,
    /// Full hunk text: file header lines, `@@` line, and body, newline-joined.
    pub content: String,
    /// The file header lines (`diff --git`, `index`, `---`, `+++`, ...).
    pub raw_header: Vec<String>,
    pub old_start: u32,
    pub old_length: u32,
    pub new_start: u32,
    pub new_length: u32,
    /// Pre-rename path when the file header carried a `rename from` line.
    pub rename_from: Option<String>,
}

impl Hunk {
    /// Deterministic identity for this hunk, stable across runs.
    ///
    /// Built from the sanitized file path and the new-file start line, so two
    /// hunks of the same file with different start lines never collide. Safe
    /// to use as a filename stem.
    pub fn chunk_name(&self) -> String {
        let sanitized: String = self
            .file_path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_L{}", sanitized, self.new_start)
    }

    /// The final path component of `file_path`.
    pub fn filename(&self) -> &str {
        self.file_path.rsplit('/').next().unwrap_or(&self.file_path)
    }

    /// File extension without the leading dot, or `""` when absent.
    pub fn file_extension(&self) -> &str {
        let name = self.filename();
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }

    /// Expands the hunk body into typed, numbered [`DiffLine`] records.
    ///
    /// Everything before the first `@@` line is `Header`. After it, `-`
    /// produces `Removed` (old counter advances; removed lines have no
    /// position in the new file), `+` produces `Added` (new counter
    /// advances), and a leading space or blank body line produces `Context`
    /// (both counters advance). Any other body line degrades to `Header`.
    pub fn diff_lines(&self) -> Vec<DiffLine> {
        let mut out = Vec::new();
        let mut new_line = self.new_start;
        let mut old_line = self.old_start;
        let mut in_body = false;

        for line in self.content.split('\n') {
            if line.starts_with("@@") {
                in_body = true;
                out.push(header_line(line));
            } else if !in_body {
                out.push(header_line(line));
            } else if let Some(rest) = line.strip_prefix('-') {
                out.push(DiffLine {
                    content: rest.to_owned(),
                    raw_line: line.to_owned(),
                    kind: DiffLineKind::Removed,
                    new_line_number: None,
                    old_line_number: Some(old_line),
                });
                old_line += 1;
            } else if let Some(rest) = line.strip_prefix('+') {
                out.push(DiffLine {
                    content: rest.to_owned(),
                    raw_line: line.to_owned(),
                    kind: DiffLineKind::Added,
                    new_line_number: Some(new_line),
                    old_line_number: None,
                });
                new_line += 1;
            } else if line.starts_with(' ') || line.is_empty() {
                let content = line.strip_prefix(' ').unwrap_or(line);
                out.push(DiffLine {
                    content: content.to_owned(),
                    raw_line: line.to_owned(),
                    kind: DiffLineKind::Context,
                    new_line_number: Some(new_line),
                    old_line_number: Some(old_line),
                });
                new_line += 1;
                old_line += 1;
            } else {
                // `\ No newline at end of file` and similar metadata.
                out.push(header_line(line));
            }
        }

        out
    }

    /// Renders the hunk with new-file line numbers prepended.
    ///
    /// Format, chosen so the rendered text remains diffable:
    /// - added and context lines: `"  12: +code"` (number right-aligned in a
    ///   4-wide field, prefix character preserved)
    /// - removed lines: `"   -: -code"` (no position in the new file)
    /// - header lines: unchanged
    pub fn annotated_content(&self) -> String {
        let mut annotated = Vec::new();
        for line in self.diff_lines() {
            match line.kind {
                DiffLineKind::Header => annotated.push(line.raw_line),
                DiffLineKind::Removed => annotated.push(format!("   -: {}", line.raw_line)),
                DiffLineKind::Added | DiffLineKind::Context => {
                    // new_line_number is Some by the DiffLine invariant.
                    let n = line.new_line_number.unwrap_or(0);
                    annotated.push(format!("{:4}: {}", n, line.raw_line));
                }
            }
        }
        annotated.join("\n")
    }

    /// Only the added lines of this hunk.
    pub fn added_lines(&self) -> Vec<DiffLine> {
        self.lines_of_kind(DiffLineKind::Added)
    }

    /// Only the removed lines of this hunk.
    pub fn removed_lines(&self) -> Vec<DiffLine> {
        self.lines_of_kind(DiffLineKind::Removed)
    }

    /// Only the context lines of this hunk.
    pub fn context_lines(&self) -> Vec<DiffLine> {
        self.lines_of_kind(DiffLineKind::Context)
    }

    /// All changed lines (added + removed), the set rule patterns match on.
    pub fn changed_lines(&self) -> Vec<DiffLine> {
        self.diff_lines().into_iter().filter(DiffLine::is_changed).collect()
    }

    /// Joined content of the changed lines, without prefixes.
    pub fn changed_content(&self) -> String {
        self.changed_lines()
            .into_iter()
            .map(|l| l.content)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn lines_of_kind(&self, kind: DiffLineKind) -> Vec<DiffLine> {
        self.diff_lines().into_iter().filter(|l| l.kind == kind).collect()
    }

    /// Extracts changed-line content from diff text without a parsed `Hunk`.
    ///
    /// Accepts both representations downstream rules may hold:
    /// - raw form: lines prefixed `+` / `-` (never `+++` / `---` headers)
    /// - annotated form: `"123: +code"` and `"   -: -code"`
    pub fn extract_changed_content(diff_text: &str) -> String {
        let mut changed: Vec<&str> = Vec::new();
        let mut in_body = false;

        for line in diff_text.split('\n') {
            if line.starts_with("@@") {
                in_body = true;
                continue;
            }
            if !in_body {
                continue;
            }
            if let Some(rest) = line.strip_prefix('+') {
                if !line.starts_with("+++") {
                    changed.push(rest);
                }
            } else if let Some(rest) = line.strip_prefix('-') {
                if !line.starts_with("---") {
                    changed.push(rest);
                }
            } else if let Some(idx) = line.find(": +") {
                changed.push(&line[idx + 3..]);
            } else if line.trim_start().starts_with("-:") {
                if let Some(idx) = line.find(": -") {
                    changed.push(&line[idx + 3..]);
                }
            }
        }

        changed.join("\n")
    }
}

fn header_line(line: &str) -> DiffLine {
    DiffLine {
        content: line.to_owned(),
        raw_line: line.to_owned(),
        kind: DiffLineKind::Header,
        new_line_number: None,
        old_line_number: None,
    }
}

/// A complete parsed diff: the raw text plus its ordered hunks.
///
/// Immutable snapshot. [`GitDiff::with_hunks`] and [`GitDiff::hunks_for_file`]
/// produce new values rather than filtering in place, so downstream consumers
/// holding an earlier view are never invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitDiff {
    pub raw_content: String,
    pub hunks: Vec<Hunk>,
    pub commit_hash: Option<String>,
}

impl GitDiff {
    /// Whether the diff carries no content at all.
    pub fn is_empty(&self) -> bool {
        self.raw_content.is_empty() || self.hunks.is_empty()
    }

    /// Sorted distinct file paths touched by this diff.
    pub fn changed_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.hunks.iter().map(|h| h.file_path.clone()).collect();
        files.sort();
        files.dedup();
        files
    }

    /// All hunks touching `file_path`, as a new snapshot.
    pub fn hunks_for_file(&self, file_path: &str) -> GitDiff {
        let hunks = self
            .hunks
            .iter()
            .filter(|h| h.file_path == file_path)
            .cloned()
            .collect();
        self.with_hunks(hunks)
    }

    /// Hunks whose file extension is in `extensions` (without dots).
    ///
    /// `None` keeps every hunk. Used by rule matching to scope
    /// language-specific rules.
    pub fn hunks_by_extension(&self, extensions: Option<&[&str]>) -> Vec<&Hunk> {
        match extensions {
            None => self.hunks.iter().collect(),
            Some(exts) => self
                .hunks
                .iter()
                .filter(|h| exts.contains(&h.file_extension()))
                .collect(),
        }
    }

    /// A new snapshot sharing this diff's raw content and commit hash but
    /// holding only `hunks`.
    pub fn with_hunks(&self, hunks: Vec<Hunk>) -> GitDiff {
        GitDiff {
            raw_content: self.raw_content.clone(),
            hunks,
            commit_hash: self.commit_hash.clone(),
        }
    }

    /// Total count of changed (added + removed) lines across all hunks.
    pub fn changed_line_count(&self) -> u32 {
        self.hunks
            .iter()
            .flat_map(|h| h.diff_lines())
            .filter(DiffLine::is_changed)
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    const ONE_HUNK: &str = "diff --git a/x.txt b/x.txt\n@@ -1,2 +1,3 @@\n foo\n+bar\n baz";

    #[test]
    fn added_lines_carry_new_numbers() {
        let diff = parse::parse_diff(ONE_HUNK, None);
        let hunk = &diff.hunks[0];
        let added = hunk.added_lines();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].content, "bar");
        assert_eq!(added[0].new_line_number, Some(2));
        assert_eq!(added[0].old_line_number, None);
    }

    #[test]
    fn chunk_name_is_stable_and_collision_free() {
        let diff = parse::parse_diff(ONE_HUNK, None);
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.chunk_name(), "x_txt_L1");

        let mut other = hunk.clone();
        other.new_start = 40;
        assert_ne!(hunk.chunk_name(), other.chunk_name());
    }

    #[test]
    fn annotated_content_numbers_new_side_only() {
        let raw = "diff --git a/x.txt b/x.txt\n@@ -1,2 +1,2 @@\n keep\n-old\n+new";
        let diff = parse::parse_diff(raw, None);
        let annotated = diff.hunks[0].annotated_content();
        let lines: Vec<&str> = annotated.split('\n').collect();
        assert_eq!(lines[0], "diff --git a/x.txt b/x.txt");
        assert_eq!(lines[1], "@@ -1,2 +1,2 @@");
        assert_eq!(lines[2], "   1:  keep");
        assert_eq!(lines[3], "   -: -old");
        assert_eq!(lines[4], "   2: +new");
    }

    #[test]
    fn extract_changed_content_accepts_both_forms() {
        let raw = "@@ -1,2 +1,2 @@\n keep\n-old\n+new";
        assert_eq!(Hunk::extract_changed_content(raw), "old\nnew");

        let annotated = "@@ -1,2 +1,2 @@\n   1:  keep\n   -: -old\n   2: +new";
        assert_eq!(Hunk::extract_changed_content(annotated), "old\nnew");
    }

    #[test]
    fn reslicing_produces_new_snapshots() {
        let raw = format!("{}\ndiff --git a/y.txt b/y.txt\n@@ -1 +1 @@\n-a\n+b", ONE_HUNK);
        let diff = parse::parse_diff(&raw, None);
        assert_eq!(diff.changed_files(), vec!["x.txt", "y.txt"]);

        let sliced = diff.hunks_for_file("y.txt");
        assert_eq!(sliced.hunks.len(), 1);
        // The original snapshot is untouched.
        assert_eq!(diff.hunks.len(), 2);
    }

    #[test]
    fn hunks_by_extension_scopes_by_file_type() {
        let raw = format!(
            "{}\ndiff --git a/src/lib.rs b/src/lib.rs\n@@ -1 +1 @@\n-a\n+b",
            ONE_HUNK
        );
        let diff = parse::parse_diff(&raw, None);

        let rs_only = diff.hunks_by_extension(Some(&["rs"]));
        assert_eq!(rs_only.len(), 1);
        assert_eq!(rs_only[0].file_path, "src/lib.rs");

        assert_eq!(diff.hunks_by_extension(None).len(), 2);
        assert!(diff.hunks_by_extension(Some(&["py"])).is_empty());
    }

    #[test]
    fn file_extension_handles_dotfiles() {
        let diff = parse::parse_diff(ONE_HUNK, None);
        let mut hunk = diff.hunks[0].clone();
        assert_eq!(hunk.file_extension(), "txt");
        hunk.file_path = "src/.gitignore".to_owned();
        assert_eq!(hunk.file_extension(), "");
    }
}
