//! Background thread that owns git2::Repository for its lifetime.
//!
//! git2::Repository is !Send, so it must be opened inside the thread, not
//! passed in. All communication is via channels: GitRequest in (crossbeam),
//! replies out through the oneshot sender carried by each request.

use std::path::Path;

use crossbeam_channel::{Receiver, Sender};
use git2::{BlameOptions, DiffFormat, DiffOptions, Repository};

use prlens_core::{Author, Confidence, Ownership};

use crate::git::types::{BlameOutcome, GitRequest, GitWorkerError};

/// Async-friendly handle to the worker thread. Cloning clones the request
/// sender; the thread exits when the last handle drops.
#[derive(Debug, Clone)]
pub struct GitWorker {
    tx: Sender<GitRequest>,
}

impl GitWorker {
    /// Spawns the worker thread for the repository at `repo_path`.
    pub fn spawn(repo_path: impl Into<String>) -> Self {
        let path = repo_path.into();
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || git_worker_loop(path, rx));
        GitWorker { tx }
    }

    /// Unified diff text between two refs.
    pub async fn diff(&self, from: &str, to: &str) -> Result<String, GitWorkerError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(GitRequest::Diff {
                from: from.to_owned(),
                to: to.to_owned(),
                reply,
            })
            .map_err(|_| GitWorkerError::Unavailable)?;
        rx.await.map_err(|_| GitWorkerError::Unavailable)?
    }

    /// Per-line ownership of `path` as of `commit`.
    pub async fn blame(&self, commit: &str, path: &str) -> Result<BlameOutcome, GitWorkerError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(GitRequest::Blame {
                commit: commit.to_owned(),
                path: path.to_owned(),
                reply,
            })
            .map_err(|_| GitWorkerError::Unavailable)?;
        rx.await.map_err(|_| GitWorkerError::Unavailable)?
    }
}

/// Entry point for the background thread.
///
/// Opens the Repository at `path` and loops over incoming requests until the
/// channel is closed (all senders dropped). When the repository cannot be
/// opened, every request is answered with the open error instead of
/// panicking.
pub fn git_worker_loop(path: String, rx: Receiver<GitRequest>) {
    let repo = match Repository::open(&path) {
        Ok(r) => r,
        Err(e) => {
            let message = e.message().to_owned();
            for request in rx {
                answer_unavailable(request, &message);
            }
            return;
        }
    };

    for request in rx {
        match request {
            GitRequest::Diff { from, to, reply } => {
                let _ = reply.send(diff_range(&repo, &from, &to));
            }
            GitRequest::Blame { commit, path, reply } => {
                let _ = reply.send(blame_file(&repo, &commit, &path));
            }
        }
    }
}

fn answer_unavailable(request: GitRequest, message: &str) {
    let err = GitWorkerError::Git(message.to_owned());
    match request {
        GitRequest::Diff { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        GitRequest::Blame { reply, .. } => {
            let _ = reply.send(Err(err));
        }
    }
}

fn git_err(e: git2::Error) -> GitWorkerError {
    GitWorkerError::Git(e.message().to_owned())
}

/// Resolves two ref strings to trees, diffs them, and prints the patch.
///
/// The printed text matches `git diff from..to`: origin characters are
/// re-attached for `+`/`-`/context lines, header lines come through as
/// git2 emits them.
fn diff_range(repo: &Repository, from: &str, to: &str) -> Result<String, GitWorkerError> {
    let old_tree = repo
        .revparse_single(from)
        .and_then(|o| o.peel_to_commit())
        .and_then(|c| c.tree())
        .map_err(git_err)?;
    let new_tree = repo
        .revparse_single(to)
        .and_then(|o| o.peel_to_commit())
        .and_then(|c| c.tree())
        .map_err(git_err)?;

    let mut opts = DiffOptions::new();
    let diff = repo
        .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))
        .map_err(git_err)?;

    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        match line.origin() {
            '+' | '-' | ' ' => out.push(line.origin()),
            _ => {}
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
    })
    .map_err(git_err)?;

    Ok(out)
}

/// Blames `path` as of `commit` and collects per-line ownership facts plus
/// the file's lines at that commit.
fn blame_file(repo: &Repository, commit: &str, path: &str) -> Result<BlameOutcome, GitWorkerError> {
    let commit_obj = repo
        .revparse_single(commit)
        .and_then(|o| o.peel_to_commit())
        .map_err(git_err)?;

    let mut opts = BlameOptions::new();
    opts.newest_commit(commit_obj.id());
    let blame = repo
        .blame_file(Path::new(path), Some(&mut opts))
        .map_err(git_err)?;

    let blob = commit_obj
        .tree()
        .and_then(|t| t.get_path(Path::new(path)))
        .and_then(|entry| entry.to_object(repo))
        .and_then(|o| o.peel_to_blob())
        .map_err(git_err)?;
    let lines: Vec<String> = String::from_utf8_lossy(blob.content())
        .lines()
        .map(str::to_owned)
        .collect();

    let mut facts: Vec<(u32, Ownership)> = Vec::new();
    for hunk in blame.iter() {
        let sig = hunk.final_signature();
        let author = Author {
            name: sig.name().unwrap_or("unknown").to_owned(),
            email: sig.email().unwrap_or_default().to_owned(),
        };
        let commit_id = hunk.final_commit_id();
        let (summary, commit_date) = match repo.find_commit(commit_id) {
            Ok(c) => (
                c.summary().unwrap_or_default().to_owned(),
                Some(c.time().seconds().to_string()),
            ),
            Err(_) => (String::new(), None),
        };

        let ownership = Ownership {
            author,
            commit_hash: commit_id.to_string(),
            summary,
            commit_date,
            confidence: Confidence::Direct,
        };
        let start = hunk.final_start_line() as u32;
        for offset in 0..hunk.lines_in_hunk() as u32 {
            facts.push((start + offset, ownership.clone()));
        }
    }

    Ok(BlameOutcome { lines, facts })
}
