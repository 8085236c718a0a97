//! Unified-diff parser.
//!
//! Turns raw `git diff` / `gh pr diff` output into an ordered [`GitDiff`]
//! snapshot. The parser is deliberately best-effort: this is a loose text
//! format produced by many tools, and partial visibility beats total failure,
//! so nothing here returns an error. Unparseable fragments degrade to
//! header-typed content or are dropped at hunk finalization.

use std::sync::LazyLock;

use regex::Regex;

use crate::diff::{GitDiff, Hunk};

/// `@@ -old_start[,old_length] +new_start[,new_length] @@`; lengths optional.
static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
});

/// `diff --git "a/X" "b/Y"`, the quoted form used for paths with spaces.
static DIFF_GIT_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^diff --git "a/(.*)" "b/(.*)"$"#).expect("quoted diff --git regex")
});

/// `diff --git a/X b/Y`, the plain form; the b/ side is taken greedily.
static DIFF_GIT_PLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^diff --git a/(.*?) b/(.*)$").expect("plain diff --git regex")
});

/// Parses raw unified-diff text into a [`GitDiff`].
///
/// Scans line by line, tracking the current file header block and the open
/// hunk. A new `diff --git` or `@@` marker finalizes the open hunk; a
/// finalize with no recognized file path silently drops the block. The file
/// path is always the `b/` (post-change) side; `rename from` headers are
/// recorded separately on each hunk of the renamed file.
pub fn parse_diff(diff_text: &str, commit_hash: Option<&str>) -> GitDiff {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut file_header: Vec<String> = Vec::new();
    let mut hunk_lines: Vec<String> = Vec::new();
    let mut current_file = String::new();
    let mut rename_from: Option<String> = None;
    let mut in_hunk = false;

    for line in diff_text.split('\n') {
        if line.starts_with("diff --git") {
            finalize_hunk(&mut hunks, &file_header, &mut hunk_lines, &current_file, &rename_from);
            current_file = extract_file_path(line);
            rename_from = None;
            file_header = vec![line.to_owned()];
            in_hunk = false;
        } else if is_file_header_line(line) {
            if let Some(path) = line.strip_prefix("rename from ") {
                rename_from = Some(path.to_owned());
            }
            file_header.push(line.to_owned());
        } else if line.starts_with("@@") {
            finalize_hunk(&mut hunks, &file_header, &mut hunk_lines, &current_file, &rename_from);
            in_hunk = true;
            hunk_lines.push(line.to_owned());
        } else if in_hunk {
            hunk_lines.push(line.to_owned());
        }
        // Anything else outside a hunk (e.g. leading commit text) is skipped.
    }

    finalize_hunk(&mut hunks, &file_header, &mut hunk_lines, &current_file, &rename_from);

    GitDiff {
        raw_content: diff_text.to_owned(),
        hunks,
        commit_hash: commit_hash.map(str::to_owned),
    }
}

/// Header markers that belong to the current file block rather than a hunk.
fn is_file_header_line(line: &str) -> bool {
    line.starts_with("index ")
        || line.starts_with("--- ")
        || line.starts_with("+++ ")
        || line.starts_with("new file")
        || line.starts_with("deleted file")
        || line.starts_with("old mode")
        || line.starts_with("new mode")
        || line.starts_with("similarity")
        || line.starts_with("rename from")
        || line.starts_with("rename to")
        || line.starts_with("Binary files")
}

/// Extracts the post-change path from a `diff --git` line.
///
/// Tries the quoted form first (paths containing spaces), then the plain
/// form. Returns `""` when neither matches, which causes the subsequent
/// hunks of that block to be dropped at finalization.
fn extract_file_path(line: &str) -> String {
    if let Some(caps) = DIFF_GIT_QUOTED.captures(line) {
        return caps[2].trim().to_owned();
    }
    if let Some(caps) = DIFF_GIT_PLAIN.captures(line) {
        return caps[2].trim().to_owned();
    }
    String::new()
}

/// Closes the in-progress hunk, if any, and appends it to `hunks`.
///
/// Trailing blank lines that `split('\n')` introduces between blocks are
/// trimmed from the body so stored hunk content reproduces the original
/// slice byte for byte.
fn finalize_hunk(
    hunks: &mut Vec<Hunk>,
    file_header: &[String],
    hunk_lines: &mut Vec<String>,
    file_path: &str,
    rename_from: &Option<String>,
) {
    if hunk_lines.is_empty() {
        return;
    }
    let mut body = std::mem::take(hunk_lines);
    while body.last().is_some_and(|l| l.is_empty()) {
        body.pop();
    }
    if body.is_empty() || file_path.is_empty() {
        // Malformed input is tolerated, not rejected: drop the block.
        return;
    }

    let (old_start, old_length, new_start, new_length) = parse_hunk_header(&body[0]);

    let mut content_lines: Vec<&str> = file_header.iter().map(String::as_str).collect();
    content_lines.extend(body.iter().map(String::as_str));

    hunks.push(Hunk {
        file_path: file_path.to_owned(),
        content: content_lines.join("\n"),
        raw_header: file_header.to_vec(),
        old_start,
        old_length,
        new_start,
        new_length,
        rename_from: rename_from.clone(),
    });
}

/// Parses the numeric ranges from an `@@` line.
///
/// A missing `,length` defaults to 1 (the unified-diff convention for
/// single-line hunks). A line that is not a recognizable header yields all
/// zeros; the hunk is kept with degraded positions rather than rejected.
fn parse_hunk_header(line: &str) -> (u32, u32, u32, u32) {
    let Some(caps) = HUNK_HEADER.captures(line) else {
        return (0, 0, 0, 0);
    };
    let num = |i: usize, default: u32| -> u32 {
        caps.get(i)
            .map(|m| m.as_str().parse().unwrap_or(default))
            .unwrap_or(default)
    };
    (num(1, 0), num(2, 1), num(3, 0), num(4, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_diff() {
        let diff = parse_diff("", None);
        assert!(diff.is_empty());
        assert!(diff.hunks.is_empty());
    }

    #[test]
    fn missing_length_defaults_to_one() {
        let raw = "diff --git a/f.txt b/f.txt\n@@ -5 +7 @@\n-a\n+b";
        let diff = parse_diff(raw, None);
        let h = &diff.hunks[0];
        assert_eq!((h.old_start, h.old_length, h.new_start, h.new_length), (5, 1, 7, 1));
    }

    #[test]
    fn quoted_paths_with_spaces() {
        let raw = "diff --git \"a/my file.txt\" \"b/my file.txt\"\n@@ -1 +1 @@\n-a\n+b";
        let diff = parse_diff(raw, None);
        assert_eq!(diff.hunks[0].file_path, "my file.txt");
    }

    #[test]
    fn rename_header_is_recorded() {
        let raw = "diff --git a/new.rs b/new.rs\nsimilarity index 95%\nrename from old.rs\nrename to new.rs\n@@ -1 +1 @@\n-a\n+b";
        let diff = parse_diff(raw, None);
        assert_eq!(diff.hunks[0].rename_from.as_deref(), Some("old.rs"));
        assert_eq!(diff.hunks[0].file_path, "new.rs");
    }

    #[test]
    fn block_without_file_path_is_dropped() {
        let raw = "diff --git nonsense\n@@ -1 +1 @@\n-a\n+b\ndiff --git a/ok.txt b/ok.txt\n@@ -1 +1 @@\n-x\n+y";
        let diff = parse_diff(raw, None);
        assert_eq!(diff.hunks.len(), 1);
        assert_eq!(diff.hunks[0].file_path, "ok.txt");
    }

    #[test]
    fn commit_hash_is_attached() {
        let diff = parse_diff("diff --git a/f b/f\n@@ -1 +1 @@\n-a\n+b", Some("abc123"));
        assert_eq!(diff.commit_hash.as_deref(), Some("abc123"));
    }
}
