//! Owned request/reply types for the git background thread.
//!
//! Everything here is fully owned (no borrowed lifetimes) so values can
//! cross from the thread that owns the `git2::Repository` into async tasks.

use thiserror::Error;
use tokio::sync::oneshot;

use prlens_core::Ownership;

/// Failure reported by the worker in a reply.
#[derive(Debug, Clone, Error)]
pub enum GitWorkerError {
    /// A git2 operation failed; carries the underlying message.
    #[error("git: {0}")]
    Git(String),
    /// The worker thread is gone or never opened the repository.
    #[error("git worker unavailable")]
    Unavailable,
}

/// Per-line ownership facts plus the file's content at the blamed commit.
#[derive(Debug, Clone)]
pub struct BlameOutcome {
    pub lines: Vec<String>,
    /// `(line_number, ownership)` pairs, 1-based, one per attributed line.
    pub facts: Vec<(u32, Ownership)>,
}

/// Commands sent to the git worker thread. Each carries a oneshot reply
/// sender; the worker always answers, even on error.
#[derive(Debug)]
pub enum GitRequest {
    /// Unified diff text between two resolved refs (`from..to`).
    Diff {
        from: String,
        to: String,
        reply: oneshot::Sender<Result<String, GitWorkerError>>,
    },
    /// Blame of `path` as of `commit`.
    Blame {
        commit: String,
        path: String,
        reply: oneshot::Sender<Result<BlameOutcome, GitWorkerError>>,
    },
}
