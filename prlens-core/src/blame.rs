//! Line-ownership attribution.
//!
//! Raw per-line blame facts come from an external version-control call; this
//! module only merges them into compact [`BlameSection`] runs. Section
//! boundaries track commit-level provenance: adjacent lines from different
//! commits are never merged, even when author and summary are identical.

use serde::{Deserialize, Serialize};

/// The commit author attributed to a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// How certain the attribution is.
///
/// `Inherited` marks ownership carried across a detected code move: the
/// blame hit belongs to the source location, not the line's current one.
/// Advisory metadata only; no invariant depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Direct,
    Inherited,
}

/// Ownership facts for one line or section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub author: Author,
    pub commit_hash: String,
    pub summary: String,
    pub commit_date: Option<String>,
    pub confidence: Confidence,
}

/// A maximal contiguous 1-based inclusive line range sharing one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameSection {
    pub start_line: u32,
    pub end_line: u32,
    pub ownership: Ownership,
}

impl BlameSection {
    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// Blame data for one file: its lines plus the attributed sections.
///
/// Sections are ordered and non-overlapping; gaps represent lines with no
/// known ownership. Lookups are linear; "first section containing the line"
/// is the whole contract, and changed files are small enough that an
/// interval index has not been worth it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlameData {
    pub file_path: String,
    pub lines: Vec<String>,
    pub sections: Vec<BlameSection>,
}

impl FileBlameData {
    /// Merges per-line `(line_number, Ownership)` facts into maximal
    /// contiguous sections sharing the same commit hash.
    ///
    /// Facts may arrive in any order; they are sorted before merging. A gap
    /// in line numbers always starts a new section, so unattributed lines
    /// stay uncovered.
    pub fn from_line_facts(
        file_path: impl Into<String>,
        lines: Vec<String>,
        facts: impl IntoIterator<Item = (u32, Ownership)>,
    ) -> Self {
        let mut facts: Vec<(u32, Ownership)> = facts.into_iter().collect();
        facts.sort_by_key(|(line, _)| *line);
        facts.dedup_by_key(|(line, _)| *line);

        let mut sections: Vec<BlameSection> = Vec::new();
        for (line, ownership) in facts {
            match sections.last_mut() {
                Some(open)
                    if open.end_line + 1 == line
                        && open.ownership.commit_hash == ownership.commit_hash =>
                {
                    open.end_line = line;
                }
                _ => sections.push(BlameSection {
                    start_line: line,
                    end_line: line,
                    ownership,
                }),
            }
        }

        FileBlameData {
            file_path: file_path.into(),
            lines,
            sections,
        }
    }

    /// The first section whose range contains `line`, if any.
    pub fn section_for(&self, line: u32) -> Option<&BlameSection> {
        self.sections.iter().find(|s| s.contains(line))
    }

    /// Ownership of `line`, if attributed.
    pub fn ownership_for(&self, line: u32) -> Option<&Ownership> {
        self.section_for(line).map(|s| &s.ownership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(hash: &str, name: &str) -> Ownership {
        Ownership {
            author: Author {
                name: name.to_owned(),
                email: format!("{}@example.com", name),
            },
            commit_hash: hash.to_owned(),
            summary: "change something".to_owned(),
            commit_date: None,
            confidence: Confidence::Direct,
        }
    }

    #[test]
    fn contiguous_same_commit_lines_merge() {
        let data = FileBlameData::from_line_facts(
            "src/a.rs",
            vec![],
            vec![(1, owner("aaa", "kim")), (2, owner("aaa", "kim")), (3, owner("aaa", "kim"))],
        );
        assert_eq!(data.sections.len(), 1);
        assert_eq!(data.sections[0].start_line, 1);
        assert_eq!(data.sections[0].end_line, 3);
        assert_eq!(data.sections[0].line_count(), 3);
    }

    #[test]
    fn different_commits_never_merge_even_with_same_author() {
        let data = FileBlameData::from_line_facts(
            "src/a.rs",
            vec![],
            vec![(1, owner("aaa", "kim")), (2, owner("bbb", "kim"))],
        );
        assert_eq!(data.sections.len(), 2);
    }

    #[test]
    fn gaps_split_sections_and_stay_uncovered() {
        let data = FileBlameData::from_line_facts(
            "src/a.rs",
            vec![],
            vec![(1, owner("aaa", "kim")), (5, owner("aaa", "kim"))],
        );
        assert_eq!(data.sections.len(), 2);
        assert!(data.section_for(3).is_none());
        assert_eq!(data.ownership_for(5).map(|o| o.commit_hash.as_str()), Some("aaa"));
    }

    #[test]
    fn unordered_facts_are_sorted_before_merging() {
        let data = FileBlameData::from_line_facts(
            "src/a.rs",
            vec![],
            vec![(3, owner("aaa", "kim")), (1, owner("aaa", "kim")), (2, owner("aaa", "kim"))],
        );
        assert_eq!(data.sections.len(), 1);
        assert_eq!(data.sections[0].line_count(), 3);
    }
}
