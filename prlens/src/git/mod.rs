//! Git integration.
//!
//! The module exposes a [`GitWorker`] facade that owns a background
//! `std::thread::spawn` thread. The thread holds the `git2::Repository` for
//! its lifetime. Repository is !Send and must never cross a thread
//! boundary. Requests go in over a crossbeam channel; each carries a tokio
//! oneshot for its reply, so async callers simply await.
pub mod types;
pub mod worker;

pub use types::{BlameOutcome, GitRequest, GitWorkerError};
pub use worker::GitWorker;
