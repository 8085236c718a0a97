//! Move detection and effective-diff reduction.
//!
//! A "move" is a contiguous run of removed lines in one hunk whose text
//! reappears as a contiguous run of added lines in a *different* hunk (same
//! file or another file). Detection compares whitespace-trimmed line text,
//! scores each pairing, and selects pairings greedily and exclusively so a
//! relocated block is reported exactly once.
//!
//! [`MoveDetector::reduce`] additionally rebuilds the diff with moved code
//! stripped out: pure relocations vanish, and a move whose text was edited
//! in flight is replaced by a re-diff of the two regions so only the genuine
//! edits survive.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::diff::{DiffLineKind, GitDiff, Hunk};
use crate::parse;

/// Tuning knobs for move detection.
///
/// The thresholds are deliberately configurable rather than fixed: too small
/// a minimum run matches incidental duplicates (`}`, blank separators), too
/// large misses short helper relocations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Shortest matched block that may be proposed as a move.
    pub min_run_len: usize,
    /// Minimum `matched / max(source_len, target_len)` score to accept.
    pub score_threshold: f64,
}

impl Default for MoveConfig {
    fn default() -> Self {
        MoveConfig {
            min_run_len: 3,
            score_threshold: 0.5,
        }
    }
}

/// One detected relocation of a block of lines.
///
/// Line ranges are 1-based inclusive: `source_lines` in old-file
/// coordinates, `target_lines` in new-file coordinates. A given source line
/// range appears in at most one `Move`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub source_file: String,
    pub target_file: String,
    pub source_lines: (u32, u32),
    pub target_lines: (u32, u32),
    pub matched_lines: u32,
    /// `matched_lines / max(source_run_len, target_run_len)`, in 0.0 to 1.0.
    pub score: f64,
}

/// Summary of all moves detected in one diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveReport {
    pub moves: Vec<Move>,
    pub moves_detected: usize,
    pub total_lines_moved: u32,
    /// Changed lines in the full diff minus the moved lines: what remains
    /// once pure relocation is discounted.
    pub total_lines_effectively_changed: u32,
}

/// Detects moved blocks and reduces a diff to its effective changes.
///
/// Pure function over immutable inputs; no shared state, no concurrency
/// control required.
#[derive(Debug, Clone, Default)]
pub struct MoveDetector {
    config: MoveConfig,
}

/// A contiguous run of same-kind changed lines within one hunk.
///
/// `start_line` is in old-file coordinates for removed runs and new-file
/// coordinates for added runs. Whitespace-only lines break runs; they
/// match far too broadly to carry a move signal.
#[derive(Debug)]
struct LineRun {
    hunk_index: usize,
    file_path: String,
    start_line: u32,
    trimmed: Vec<String>,
    raw: Vec<String>,
}

impl LineRun {
    fn len(&self) -> usize {
        self.trimmed.len()
    }
}

/// A scored (source run, target run) pairing before greedy selection.
#[derive(Debug)]
struct Candidate {
    src: usize,
    tgt: usize,
    src_off: usize,
    tgt_off: usize,
    matched: usize,
    score: f64,
}

/// A selected move plus the full text of both runs, kept for re-diffing
/// during reduction. The runs are compared whole: the matched block is
/// identical by construction, and the edits live in the unmatched remainder.
#[derive(Debug)]
struct DetectedMove {
    mv: Move,
    source_run_start: u32,
    target_run_start: u32,
    source_text: String,
    target_text: String,
}

impl MoveDetector {
    pub fn new(config: MoveConfig) -> Self {
        MoveDetector { config }
    }

    /// Detects moved blocks in `full` and reports totals.
    pub fn detect(&self, full: &GitDiff) -> MoveReport {
        let detected = self.detect_moves(full);
        self.build_report(full, &detected)
    }

    /// Builds the effective diff: `full` with moved code stripped out.
    ///
    /// Hunks overlapping a move's source (old-side) range are dropped; the
    /// target side carries any real change. Hunks overlapping a move's
    /// target (new-side) range are replaced, once per move, by a re-diff of
    /// the moved source text against the moved target text; an unedited move
    /// re-diffs to nothing and vanishes. All other hunks are kept verbatim.
    pub fn reduce(&self, full: &GitDiff) -> (GitDiff, MoveReport) {
        let detected = self.detect_moves(full);
        let report = self.build_report(full, &detected);

        let mut surviving: Vec<Hunk> = Vec::new();
        let mut emitted = vec![false; detected.len()];

        'hunks: for hunk in &full.hunks {
            let old_range = side_range(hunk.old_start, hunk.old_length);
            let new_range = side_range(hunk.new_start, hunk.new_length);

            for (i, dm) in detected.iter().enumerate() {
                if hunk.file_path == dm.mv.source_file
                    && ranges_overlap(old_range, dm.mv.source_lines)
                {
                    continue 'hunks;
                }
                if hunk.file_path == dm.mv.target_file
                    && ranges_overlap(new_range, dm.mv.target_lines)
                {
                    if !emitted[i] {
                        emitted[i] = true;
                        surviving.extend(rediff_move(dm));
                    }
                    continue 'hunks;
                }
            }

            surviving.push(hunk.clone());
        }

        (full.with_hunks(surviving), report)
    }

    fn build_report(&self, full: &GitDiff, detected: &[DetectedMove]) -> MoveReport {
        let moves: Vec<Move> = detected.iter().map(|d| d.mv.clone()).collect();
        let total_lines_moved: u32 = moves.iter().map(|m| m.matched_lines).sum();
        let changed = full.changed_line_count();
        MoveReport {
            moves_detected: moves.len(),
            total_lines_moved,
            total_lines_effectively_changed: changed.saturating_sub(total_lines_moved),
            moves,
        }
    }

    fn detect_moves(&self, full: &GitDiff) -> Vec<DetectedMove> {
        let removed = extract_runs(full, DiffLineKind::Removed);
        let added = extract_runs(full, DiffLineKind::Added);

        let mut candidates: Vec<Candidate> = Vec::new();
        for (si, src) in removed.iter().enumerate() {
            for (ti, tgt) in added.iter().enumerate() {
                // Same hunk means an in-place edit, never a move.
                if src.hunk_index == tgt.hunk_index {
                    continue;
                }
                let Some((src_off, tgt_off, matched)) =
                    longest_common_block(&src.trimmed, &tgt.trimmed)
                else {
                    continue;
                };
                if matched < self.config.min_run_len {
                    continue;
                }
                let score = matched as f64 / src.len().max(tgt.len()) as f64;
                if score < self.config.score_threshold {
                    continue;
                }
                candidates.push(Candidate {
                    src: si,
                    tgt: ti,
                    src_off,
                    tgt_off,
                    matched,
                    score,
                });
            }
        }

        // Deterministic order: best score first, then larger matches, then
        // lexical source/target paths and positions.
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.matched.cmp(&a.matched))
                .then_with(|| removed[a.src].file_path.cmp(&removed[b.src].file_path))
                .then_with(|| added[a.tgt].file_path.cmp(&added[b.tgt].file_path))
                .then(removed[a.src].start_line.cmp(&removed[b.src].start_line))
                .then(added[a.tgt].start_line.cmp(&added[b.tgt].start_line))
        });

        // Greedy, exclusive: a run consumed by one move is out of play.
        let mut src_taken = vec![false; removed.len()];
        let mut tgt_taken = vec![false; added.len()];
        let mut detected: Vec<DetectedMove> = Vec::new();

        for c in candidates {
            if src_taken[c.src] || tgt_taken[c.tgt] {
                continue;
            }
            src_taken[c.src] = true;
            tgt_taken[c.tgt] = true;

            let src = &removed[c.src];
            let tgt = &added[c.tgt];
            let src_start = src.start_line + c.src_off as u32;
            let tgt_start = tgt.start_line + c.tgt_off as u32;

            detected.push(DetectedMove {
                mv: Move {
                    source_file: src.file_path.clone(),
                    target_file: tgt.file_path.clone(),
                    source_lines: (src_start, src_start + c.matched as u32 - 1),
                    target_lines: (tgt_start, tgt_start + c.matched as u32 - 1),
                    matched_lines: c.matched as u32,
                    score: c.score,
                },
                source_run_start: src.start_line,
                target_run_start: tgt.start_line,
                source_text: run_text(&src.raw),
                target_text: run_text(&tgt.raw),
            });
        }

        detected
    }
}

/// Collects contiguous runs of `kind` lines across all hunks.
fn extract_runs(diff: &GitDiff, kind: DiffLineKind) -> Vec<LineRun> {
    let mut runs: Vec<LineRun> = Vec::new();

    for (hunk_index, hunk) in diff.hunks.iter().enumerate() {
        let mut open: Option<LineRun> = None;

        for line in hunk.diff_lines() {
            let line_number = match kind {
                DiffLineKind::Removed => line.old_line_number,
                _ => line.new_line_number,
            };
            let trimmed = line.content.trim();

            if line.kind == kind && !trimmed.is_empty() {
                let number = line_number.unwrap_or(0);
                match open.as_mut() {
                    Some(run) if run.start_line + run.len() as u32 == number => {
                        run.trimmed.push(trimmed.to_owned());
                        run.raw.push(line.content.clone());
                    }
                    _ => {
                        if let Some(run) = open.take() {
                            runs.push(run);
                        }
                        open = Some(LineRun {
                            hunk_index,
                            file_path: hunk.file_path.clone(),
                            start_line: number,
                            trimmed: vec![trimmed.to_owned()],
                            raw: vec![line.content.clone()],
                        });
                    }
                }
            } else if let Some(run) = open.take() {
                runs.push(run);
            }
        }

        if let Some(run) = open.take() {
            runs.push(run);
        }
    }

    runs
}

/// Longest common contiguous block between two line sequences.
///
/// Returns `(offset_a, offset_b, length)` for the longest block, or `None`
/// when nothing matches. Ties resolve to the earliest offsets so output is
/// deterministic. Quadratic, but runs are hunk-sized.
fn longest_common_block(a: &[String], b: &[String]) -> Option<(usize, usize, usize)> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize, usize)> = None;
    let mut prev = vec![0usize; b.len() + 1];

    for (i, line_a) in a.iter().enumerate() {
        let mut current = vec![0usize; b.len() + 1];
        for (j, line_b) in b.iter().enumerate() {
            if line_a == line_b {
                let len = prev[j] + 1;
                current[j + 1] = len;
                let candidate = (i + 1 - len, j + 1 - len, len);
                best = match best {
                    Some(existing) if existing.2 >= len => Some(existing),
                    _ => Some(candidate),
                };
            }
        }
        prev = current;
    }

    best.filter(|&(_, _, len)| len > 0)
}

fn run_text(raw: &[String]) -> String {
    let mut text = raw.join("\n");
    text.push('\n');
    text
}

/// 1-based inclusive range for one side of a hunk. Zero-length sides
/// (pure insertions/deletions) collapse to their start line.
fn side_range(start: u32, length: u32) -> (u32, u32) {
    (start, start + length.saturating_sub(1))
}

fn ranges_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

/// Re-diffs a move's full source run against its full target run.
///
/// An unedited move produces no hunks. Otherwise the unified diff of the two
/// runs is parsed back into hunks and their start lines are shifted from
/// run-relative to absolute file coordinates.
fn rediff_move(dm: &DetectedMove) -> Vec<Hunk> {
    if dm.source_text == dm.target_text {
        return Vec::new();
    }

    let text_diff = TextDiff::from_lines(&dm.source_text, &dm.target_text);
    let mut unified = text_diff.unified_diff();
    let body = unified
        .context_radius(3)
        .header(
            &format!("a/{}", dm.mv.source_file),
            &format!("b/{}", dm.mv.target_file),
        )
        .to_string();
    let raw = format!(
        "diff --git a/{} b/{}\n{}",
        dm.mv.source_file, dm.mv.target_file, body
    );

    let parsed = parse::parse_diff(&raw, None);
    parsed
        .hunks
        .into_iter()
        .map(|mut h| {
            // Run text starts at line 1; shift to absolute coordinates. A
            // degraded hunk header can put a run at line 0, so the shift
            // saturates instead of underflowing.
            h.old_start += dm.source_run_start.saturating_sub(1);
            h.new_start += dm.target_run_start.saturating_sub(1);
            h
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_block_prefers_longest_then_earliest() {
        let a: Vec<String> = ["x", "y", "z", "q"].iter().map(|s| s.to_string()).collect();
        let b: Vec<String> = ["y", "z", "q", "x"].iter().map(|s| s.to_string()).collect();
        assert_eq!(longest_common_block(&a, &b), Some((1, 0, 3)));
    }

    #[test]
    fn common_block_none_when_disjoint() {
        let a: Vec<String> = vec!["a".into()];
        let b: Vec<String> = vec!["b".into()];
        assert_eq!(longest_common_block(&a, &b), None);
    }

    #[test]
    fn side_range_collapses_zero_length() {
        assert_eq!(side_range(10, 0), (10, 10));
        assert_eq!(side_range(10, 3), (10, 12));
    }
}
