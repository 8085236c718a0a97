//! Phase pipeline: the ordered review phases, their progress protocol, and
//! the orchestrator that drives one phase at a time.
//!
//! Each phase runs as its own tokio task and reports over a bounded mpsc
//! channel; the orchestrator consumes exactly one stream at a time, feeds an
//! inactivity watchdog from every event, and forwards everything to an
//! injected progress channel for rendering. Phase outputs accumulate in
//! [`RunState`] and are only read after the owning phase completed, so the
//! state needs no locking.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use prlens_core::{
    EvaluationSummary, EvaluationTask, FileBlameData, GitDiff, MoveReport, RuleEvaluationResult,
};

use crate::artifacts::ArtifactStore;
use crate::error::PipelineError;

/// The review phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Diff,
    Rules,
    Evaluations,
    Report,
    Comment,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Diff,
        Phase::Rules,
        Phase::Evaluations,
        Phase::Report,
        Phase::Comment,
    ];

    /// Artifact directory name; the numeric prefix keeps listings ordered.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Phase::Diff => "phase-1-diff",
            Phase::Rules => "phase-2-rules",
            Phase::Evaluations => "phase-3-evaluations",
            Phase::Report => "phase-4-report",
            Phase::Comment => "phase-5-comment",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Diff => "diff",
            Phase::Rules => "rules",
            Phase::Evaluations => "evaluations",
            Phase::Report => "report",
            Phase::Comment => "comment",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diff" => Ok(Phase::Diff),
            "rules" => Ok(Phase::Rules),
            "evaluations" => Ok(Phase::Evaluations),
            "report" => Ok(Phase::Report),
            "comment" => Ok(Phase::Comment),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// Everything the diff phase produces, kept in memory for later phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffArtifacts {
    pub full: GitDiff,
    pub effective: GitDiff,
    pub moves: MoveReport,
    pub blame: Vec<FileBlameData>,
}

/// Outcome counters for the comment phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentStats {
    pub attempted: usize,
    pub posted: usize,
    pub failed: usize,
}

/// Terminal payload of a completed phase. Closed: every phase's output shape
/// is known to the orchestrator.
#[derive(Debug, Clone)]
pub enum PhaseOutput {
    Diff(DiffArtifacts),
    Rules(Vec<EvaluationTask>),
    Evaluations(Vec<RuleEvaluationResult>),
    Report(EvaluationSummary),
    Comment(CommentStats),
}

/// Progress protocol between an executor and the orchestrator.
///
/// An executor emits zero or more `Running`/`Log` events followed by exactly
/// one terminal `Completed` or `Failed`. Closing the channel without a
/// terminal event is itself a failure mode the orchestrator detects.
#[derive(Debug)]
pub enum PhaseProgress {
    Running,
    Log(String),
    Completed(PhaseOutput),
    Failed { error: String, logs: Vec<String> },
}

/// Lightweight state mirror forwarded to the progress channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseState {
    Running,
    Log(String),
    Completed,
    Failed(String),
}

/// The sole UI-facing contract: one event per executor event, tagged with
/// the run and phase it belongs to.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub run_id: Uuid,
    pub phase: Phase,
    pub state: PhaseState,
}

/// Accumulated outputs of completed phases.
///
/// Append-only; each field is written once by the orchestrator when the
/// owning phase completes and read by later phases through their context.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub diff: Option<Arc<DiffArtifacts>>,
    pub tasks: Option<Arc<Vec<EvaluationTask>>>,
    pub results: Option<Arc<Vec<RuleEvaluationResult>>>,
    pub summary: Option<Arc<EvaluationSummary>>,
}

impl RunState {
    fn absorb(&mut self, output: PhaseOutput) {
        match output {
            PhaseOutput::Diff(d) => self.diff = Some(Arc::new(d)),
            PhaseOutput::Rules(t) => self.tasks = Some(Arc::new(t)),
            PhaseOutput::Evaluations(r) => self.results = Some(Arc::new(r)),
            PhaseOutput::Report(s) => self.summary = Some(Arc::new(s)),
            PhaseOutput::Comment(_) => {}
        }
    }
}

/// What an executor gets handed at spawn time.
#[derive(Clone)]
pub struct PhaseContext {
    pub pr_number: u64,
    pub store: Arc<ArtifactStore>,
    pub state: RunState,
}

/// One phase's executor. Implementations own their collaborators; `spawn`
/// moves a clone of everything needed into a fresh tokio task so the
/// orchestrator can abort it on timeout without touching the executor.
pub trait PhaseExecutor: Send + Sync {
    fn phase(&self) -> Phase;
    fn spawn(&self, ctx: PhaseContext, tx: mpsc::Sender<PhaseProgress>) -> JoinHandle<()>;
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Skip phases ordered before this one (their outputs must already be
    /// on disk or later phases will fail on missing state).
    pub skip_to: Option<Phase>,
    /// Stop the run after this phase completes.
    pub stop_after: Option<Phase>,
    pub watchdog_timeout: Duration,
    pub watchdog_poll: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            skip_to: None,
            stop_after: None,
            watchdog_timeout: Duration::from_secs(300),
            watchdog_poll: Duration::from_secs(5),
        }
    }
}

/// Final report of one run: which phases ran, which left artifacts on disk,
/// and the aggregated summary when the report phase ran.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pr_number: u64,
    pub phases_run: Vec<Phase>,
    /// Phases with on-disk output, with their artifact files (sorted).
    pub artifacts: BTreeMap<Phase, Vec<PathBuf>>,
    pub summary: Option<EvaluationSummary>,
    pub comment_stats: Option<CommentStats>,
}

/// Drives the phases strictly in order, one at a time.
pub struct Pipeline {
    run_id: Uuid,
    pr_number: u64,
    store: Arc<ArtifactStore>,
    executors: Vec<Box<dyn PhaseExecutor>>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        pr_number: u64,
        store: Arc<ArtifactStore>,
        executors: Vec<Box<dyn PhaseExecutor>>,
        options: PipelineOptions,
    ) -> Self {
        Pipeline {
            run_id: Uuid::new_v4(),
            pr_number,
            store,
            executors,
            options,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Runs the configured phases to completion.
    ///
    /// A phase failure stops the run with no retry, except the comment
    /// phase: posting problems are logged and the run still succeeds. Every
    /// executor event is forwarded to `progress` before the orchestrator
    /// acts on it.
    pub async fn run(
        &self,
        progress: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<RunReport, PipelineError> {
        let mut state = RunState::default();
        let mut phases_run: Vec<Phase> = Vec::new();
        let mut comment_stats: Option<CommentStats> = None;

        for executor in &self.executors {
            let phase = executor.phase();
            if let Some(skip_to) = self.options.skip_to {
                if phase < skip_to {
                    info!(%phase, "skipping phase");
                    continue;
                }
            }

            match self.run_phase(executor.as_ref(), &state, &progress).await {
                Ok(output) => {
                    if let PhaseOutput::Comment(stats) = &output {
                        comment_stats = Some(*stats);
                    }
                    state.absorb(output);
                    phases_run.push(phase);
                }
                Err(err) if phase == Phase::Comment => {
                    // Review content is already persisted by this point;
                    // a posting failure must not fail the run.
                    warn!(%phase, error = %err, "comment posting failed");
                    phases_run.push(phase);
                }
                Err(err) => return Err(err),
            }

            if self.options.stop_after == Some(phase) {
                info!(%phase, "stopping after phase");
                break;
            }
        }

        let mut artifacts = BTreeMap::new();
        for phase in Phase::ALL {
            let files = self.store.list_phase_files(phase);
            if !files.is_empty() {
                artifacts.insert(phase, files);
            }
        }

        Ok(RunReport {
            run_id: self.run_id,
            pr_number: self.pr_number,
            phases_run,
            artifacts,
            summary: state.summary.as_deref().cloned(),
            comment_stats,
        })
    }

    async fn run_phase(
        &self,
        executor: &dyn PhaseExecutor,
        state: &RunState,
        progress: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<PhaseOutput, PipelineError> {
        let phase = executor.phase();
        // Bounded channel: a chatty executor blocks rather than ballooning
        // memory while the orchestrator forwards events.
        let (tx, mut rx) = mpsc::channel::<PhaseProgress>(64);
        let ctx = PhaseContext {
            pr_number: self.pr_number,
            store: Arc::clone(&self.store),
            state: state.clone(),
        };

        let handle = executor.spawn(ctx, tx);
        let watchdog =
            crate::watchdog::Watchdog::spawn(self.options.watchdog_timeout, self.options.watchdog_poll);

        let forward = |s: PhaseState| {
            let _ = progress.send(PipelineEvent {
                run_id: self.run_id,
                phase,
                state: s,
            });
        };

        let mut logs: Vec<String> = Vec::new();
        let outcome = loop {
            tokio::select! {
                event = rx.recv() => {
                    watchdog.touch();
                    match event {
                        Some(PhaseProgress::Running) => forward(PhaseState::Running),
                        Some(PhaseProgress::Log(line)) => {
                            forward(PhaseState::Log(line.clone()));
                            logs.push(line);
                        }
                        Some(PhaseProgress::Completed(output)) => {
                            forward(PhaseState::Completed);
                            break Ok(output);
                        }
                        Some(PhaseProgress::Failed { error, logs: tail }) => {
                            forward(PhaseState::Failed(error.clone()));
                            logs.extend(tail);
                            break Err(PipelineError::PhaseFailed {
                                phase,
                                message: error,
                                logs: std::mem::take(&mut logs),
                            });
                        }
                        None => {
                            let err = PipelineError::NoOutput { phase };
                            forward(PhaseState::Failed(err.to_string()));
                            break Err(err);
                        }
                    }
                }
                _ = watchdog.timed_out() => {
                    handle.abort();
                    let err = PipelineError::Timeout {
                        phase,
                        after: self.options.watchdog_timeout,
                    };
                    forward(PhaseState::Failed(err.to_string()));
                    break Err(err);
                }
            }
        };

        watchdog.cancel();
        outcome
    }
}
