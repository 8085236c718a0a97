//! Built-in phase executors.
//!
//! Each executor clones what it needs into a fresh tokio task, reports over
//! the progress channel, and persists its artifacts through the store in its
//! context. The common shape lives in [`run_reporting`]: run the phase body,
//! translate its `Result` into the terminal `Completed`/`Failed` event.

use tokio::sync::mpsc;

use crate::pipeline::{PhaseOutput, PhaseProgress};

pub mod comment;
pub mod diff;
pub mod evaluate;
pub mod report;
pub mod rules;

pub use comment::{CommandPoster, CommentPhase, CommentPoster, NullPoster, ReviewComment};
pub use diff::DiffPhase;
pub use evaluate::{CommandEvaluator, EvaluatePhase, RuleEvaluator, VerdictPayload};
pub use report::ReportPhase;
pub use rules::{RuleSpec, RulesPhase};

/// Sends `Running`, executes `body`, and emits the terminal event.
///
/// Send failures are ignored throughout: they mean the orchestrator stopped
/// listening (timeout abort in flight), and there is nobody left to tell.
pub(crate) async fn run_reporting<F>(tx: mpsc::Sender<PhaseProgress>, body: F)
where
    F: std::future::Future<Output = Result<PhaseOutput, String>>,
{
    let _ = tx.send(PhaseProgress::Running).await;
    match body.await {
        Ok(output) => {
            let _ = tx.send(PhaseProgress::Completed(output)).await;
        }
        Err(error) => {
            let _ = tx
                .send(PhaseProgress::Failed {
                    error,
                    logs: Vec::new(),
                })
                .await;
        }
    }
}

/// Fire-and-forget log line toward the orchestrator.
pub(crate) async fn log(tx: &mpsc::Sender<PhaseProgress>, line: impl Into<String>) {
    let _ = tx.send(PhaseProgress::Log(line.into())).await;
}
