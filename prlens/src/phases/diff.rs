//! Diff phase: fetch, parse, reduce, attribute.
//!
//! Pulls the unified diff for the review range from the git worker, parses
//! it, runs move detection to build the effective diff, and blames every
//! changed file. Lines that arrived via a detected move inherit ownership
//! from the move's source location, marked `Confidence::Inherited`, so the
//! relocating commit does not swallow authorship.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use prlens_core::{
    parse_diff, Confidence, FileBlameData, GitDiff, MoveConfig, MoveDetector, MoveReport,
    Ownership,
};

use crate::git::GitWorker;
use crate::phases::{log, run_reporting};
use crate::pipeline::{
    DiffArtifacts, Phase, PhaseContext, PhaseExecutor, PhaseOutput, PhaseProgress,
};

pub struct DiffPhase {
    worker: GitWorker,
    base_ref: String,
    head_ref: String,
    move_config: MoveConfig,
}

impl DiffPhase {
    pub fn new(
        worker: GitWorker,
        base_ref: impl Into<String>,
        head_ref: impl Into<String>,
        move_config: MoveConfig,
    ) -> Self {
        DiffPhase {
            worker,
            base_ref: base_ref.into(),
            head_ref: head_ref.into(),
            move_config,
        }
    }
}

impl PhaseExecutor for DiffPhase {
    fn phase(&self) -> Phase {
        Phase::Diff
    }

    fn spawn(&self, ctx: PhaseContext, tx: mpsc::Sender<PhaseProgress>) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let base = self.base_ref.clone();
        let head = self.head_ref.clone();
        let move_config = self.move_config;

        tokio::spawn(async move {
            let body = run(ctx, tx.clone(), worker, base, head, move_config);
            run_reporting(tx, body).await;
        })
    }
}

async fn run(
    ctx: PhaseContext,
    tx: mpsc::Sender<PhaseProgress>,
    worker: GitWorker,
    base: String,
    head: String,
    move_config: MoveConfig,
) -> Result<PhaseOutput, String> {
    log(&tx, format!("fetching diff {base}..{head}")).await;
    let raw = worker
        .diff(&base, &head)
        .await
        .map_err(|e| e.to_string())?;

    let full = parse_diff(&raw, Some(&head));
    log(
        &tx,
        format!(
            "parsed {} hunks across {} files",
            full.hunks.len(),
            full.changed_files().len()
        ),
    )
    .await;

    let detector = MoveDetector::new(move_config);
    let (effective, moves) = detector.reduce(&full);
    log(
        &tx,
        format!(
            "{} moves, {} lines moved, {} effectively changed",
            moves.moves_detected, moves.total_lines_moved, moves.total_lines_effectively_changed
        ),
    )
    .await;

    let blame = blame_changed_files(&tx, &worker, &full, &moves, &base, &head).await;

    let store = &ctx.store;
    store
        .write_text(Phase::Diff, "diff-raw.diff", &raw)
        .map_err(|e| e.to_string())?;
    store
        .write_json(Phase::Diff, "diff-parsed.json", &full)
        .map_err(|e| e.to_string())?;
    store
        .write_text(Phase::Diff, "diff-annotated.md", &annotate(&full))
        .map_err(|e| e.to_string())?;
    store
        .write_json(Phase::Diff, "effective-diff-parsed.json", &effective)
        .map_err(|e| e.to_string())?;
    store
        .write_json(Phase::Diff, "effective-diff-moves.json", &moves)
        .map_err(|e| e.to_string())?;
    store
        .write_json(Phase::Diff, "blame.json", &blame)
        .map_err(|e| e.to_string())?;

    Ok(PhaseOutput::Diff(DiffArtifacts {
        full,
        effective,
        moves,
        blame,
    }))
}

/// Blames every changed file at the head ref, then overlays move-source
/// ownership onto move-target lines.
///
/// Blame failures degrade per file (deleted files have no head blob); the
/// file is reported and skipped rather than failing the phase.
async fn blame_changed_files(
    tx: &mpsc::Sender<PhaseProgress>,
    worker: &GitWorker,
    full: &GitDiff,
    moves: &MoveReport,
    base: &str,
    head: &str,
) -> Vec<FileBlameData> {
    let mut per_file: BTreeMap<String, (Vec<String>, BTreeMap<u32, Ownership>)> = BTreeMap::new();

    for file in full.changed_files() {
        match worker.blame(head, &file).await {
            Ok(outcome) => {
                let facts: BTreeMap<u32, Ownership> = outcome.facts.into_iter().collect();
                per_file.insert(file, (outcome.lines, facts));
            }
            Err(e) => {
                warn!(file = %file, error = %e, "blame unavailable");
                log(tx, format!("blame unavailable for {file}: {e}")).await;
            }
        }
    }

    for mv in &moves.moves {
        let Ok(source) = worker.blame(base, &mv.source_file).await else {
            continue;
        };
        let source_facts: BTreeMap<u32, Ownership> = source.facts.into_iter().collect();
        let Some((_, target_facts)) = per_file.get_mut(&mv.target_file) else {
            continue;
        };
        for offset in 0..mv.matched_lines {
            let src_line = mv.source_lines.0 + offset;
            let tgt_line = mv.target_lines.0 + offset;
            if let Some(ownership) = source_facts.get(&src_line) {
                let mut inherited = ownership.clone();
                inherited.confidence = Confidence::Inherited;
                target_facts.insert(tgt_line, inherited);
            }
        }
    }

    per_file
        .into_iter()
        .map(|(file, (lines, facts))| FileBlameData::from_line_facts(file, lines, facts))
        .collect()
}

fn annotate(diff: &GitDiff) -> String {
    let mut out = String::new();
    for hunk in &diff.hunks {
        out.push_str(&hunk.annotated_content());
        out.push('\n');
    }
    out
}
