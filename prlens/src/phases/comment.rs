//! Comment phase: post violations back to the pull request.
//!
//! Posting happens through the opaque [`CommentPoster`] collaborator; the
//! shipped implementation pipes each comment as JSON into a configured
//! command (typically a `gh api` wrapper). Per-comment failures are counted
//! and logged but never fail the phase, and the orchestrator additionally
//! treats a whole-phase failure here as non-fatal: by this point every
//! review artifact is already on disk.

use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use prlens_core::RuleEvaluationResult;

use crate::error::CollaboratorError;
use crate::phases::{log, run_reporting};
use crate::pipeline::{CommentStats, Phase, PhaseContext, PhaseExecutor, PhaseOutput, PhaseProgress};

/// One review comment ready for posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub pr_number: u64,
    pub rule_name: String,
    pub file_path: String,
    pub line_number: Option<u32>,
    pub body: String,
}

/// The opaque posting collaborator.
pub trait CommentPoster: Send + Sync {
    fn post<'a>(
        &'a self,
        comment: &'a ReviewComment,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// Pipes each comment as JSON into a configured command.
pub struct CommandPoster {
    command: Vec<String>,
}

impl CommandPoster {
    pub fn new(command: Vec<String>) -> Self {
        CommandPoster { command }
    }
}

impl CommentPoster for CommandPoster {
    fn post<'a>(
        &'a self,
        comment: &'a ReviewComment,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        async move {
            let (program, args) = self
                .command
                .split_first()
                .ok_or_else(|| CollaboratorError::new("comment command is empty"))?;

            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| CollaboratorError::new(format!("spawn {program}: {e}")))?;

            let payload = serde_json::to_vec(comment)
                .map_err(|e| CollaboratorError::new(format!("encode comment: {e}")))?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&payload)
                    .await
                    .map_err(|e| CollaboratorError::new(format!("write stdin: {e}")))?;
            }

            let status = child
                .wait()
                .await
                .map_err(|e| CollaboratorError::new(format!("wait: {e}")))?;
            if !status.success() {
                return Err(CollaboratorError::new(format!(
                    "poster exited with {status}"
                )));
            }
            Ok(())
        }
        .boxed()
    }
}

/// Logs comments instead of posting them. Used for dry runs.
pub struct NullPoster;

impl CommentPoster for NullPoster {
    fn post<'a>(
        &'a self,
        comment: &'a ReviewComment,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        async move {
            info!(
                rule = %comment.rule_name,
                file = %comment.file_path,
                "dry run, comment not posted"
            );
            Ok(())
        }
        .boxed()
    }
}

pub struct CommentPhase {
    poster: Arc<dyn CommentPoster>,
    min_score: u8,
}

impl CommentPhase {
    pub fn new(poster: Arc<dyn CommentPoster>, min_score: u8) -> Self {
        CommentPhase { poster, min_score }
    }
}

impl PhaseExecutor for CommentPhase {
    fn phase(&self) -> Phase {
        Phase::Comment
    }

    fn spawn(&self, ctx: PhaseContext, tx: mpsc::Sender<PhaseProgress>) -> JoinHandle<()> {
        let poster = Arc::clone(&self.poster);
        let min_score = self.min_score;
        tokio::spawn(async move {
            let body = run(ctx, tx.clone(), poster, min_score);
            run_reporting(tx, body).await;
        })
    }
}

async fn run(
    ctx: PhaseContext,
    tx: mpsc::Sender<PhaseProgress>,
    poster: Arc<dyn CommentPoster>,
    min_score: u8,
) -> Result<PhaseOutput, String> {
    let summary = ctx
        .state
        .summary
        .clone()
        .ok_or("comment phase requires report phase output")?;

    let comments: Vec<ReviewComment> = summary
        .violations()
        .filter(|r| r.evaluation.score >= min_score)
        .map(|r| build_comment(ctx.pr_number, r))
        .collect();

    log(&tx, format!("posting {} comments", comments.len())).await;

    let mut stats = CommentStats {
        attempted: comments.len(),
        ..CommentStats::default()
    };
    for comment in &comments {
        match poster.post(comment).await {
            Ok(()) => stats.posted += 1,
            Err(e) => {
                stats.failed += 1;
                warn!(rule = %comment.rule_name, file = %comment.file_path, error = %e,
                    "failed to post comment");
                log(&tx, format!("failed to post {}: {e}", comment.rule_name)).await;
            }
        }
    }

    ctx.store
        .write_json(Phase::Comment, "comments.json", &comments)
        .map_err(|e| e.to_string())?;
    ctx.store
        .write_json(Phase::Comment, "stats.json", &stats)
        .map_err(|e| e.to_string())?;

    Ok(PhaseOutput::Comment(stats))
}

fn build_comment(pr_number: u64, result: &RuleEvaluationResult) -> ReviewComment {
    ReviewComment {
        pr_number,
        rule_name: result.rule_name.clone(),
        file_path: result.file_path.clone(),
        line_number: result.evaluation.line_number,
        body: format!(
            "**{}** (score {}/10)\n\n{}",
            result.rule_name, result.evaluation.score, result.evaluation.comment
        ),
    }
}
