//! Pipeline error taxonomy.
//!
//! Every failure carries the phase it happened in; log lines captured from
//! the executor travel with it so the caller can print context without
//! re-reading artifacts. There is no retry path anywhere, so these are all
//! terminal for the run (comment-posting failures are downgraded to warnings
//! before they reach this type).

use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Phase;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{phase} failed: {message}")]
    PhaseFailed {
        phase: Phase,
        message: String,
        logs: Vec<String>,
    },

    /// The executor's stream closed without a terminal event.
    #[error("{phase} produced no output")]
    NoOutput { phase: Phase },

    /// The inactivity watchdog fired and the executor task was aborted.
    #[error("{phase} timed out after {after:?} of inactivity")]
    Timeout { phase: Phase, after: Duration },

    #[error("run aborted")]
    Aborted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Opaque failure from an injected collaborator (evaluator, comment poster).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        CollaboratorError(message.into())
    }
}
