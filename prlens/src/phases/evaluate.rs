//! Evaluation phase: drive the rule evaluator over every task.
//!
//! The evaluator itself is an opaque collaborator behind [`RuleEvaluator`];
//! the shipped implementation shells out to a configured command with the
//! task as JSON on stdin and a JSON verdict expected on stdout. The child's
//! stderr is streamed line by line into the progress channel, which is what
//! keeps the inactivity watchdog fed during long evaluations.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use prlens_core::{EvaluationTask, RuleEvaluation, RuleEvaluationResult};

use crate::error::CollaboratorError;
use crate::phases::{log, run_reporting};
use crate::pipeline::{Phase, PhaseContext, PhaseExecutor, PhaseOutput, PhaseProgress};

/// What an evaluator hands back: the verdict plus optional execution
/// metadata. Flattened so a subprocess can reply with one flat JSON object.
#[derive(Debug, Clone, Deserialize)]
pub struct VerdictPayload {
    #[serde(flatten)]
    pub evaluation: RuleEvaluation,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
}

/// The opaque evaluation collaborator.
///
/// `logs` receives free-form progress lines while the evaluation runs; the
/// phase forwards them so the watchdog sees activity.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate<'a>(
        &'a self,
        task: &'a EvaluationTask,
        logs: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<VerdictPayload, CollaboratorError>>;
}

/// Shells out to a configured command per task.
pub struct CommandEvaluator {
    command: Vec<String>,
}

impl CommandEvaluator {
    pub fn new(command: Vec<String>) -> Self {
        CommandEvaluator { command }
    }
}

impl RuleEvaluator for CommandEvaluator {
    fn evaluate<'a>(
        &'a self,
        task: &'a EvaluationTask,
        logs: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<VerdictPayload, CollaboratorError>> {
        async move {
            let (program, args) = self
                .command
                .split_first()
                .ok_or_else(|| CollaboratorError::new("evaluator command is empty"))?;

            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| CollaboratorError::new(format!("spawn {program}: {e}")))?;

            let payload = serde_json::to_vec(task)
                .map_err(|e| CollaboratorError::new(format!("encode task: {e}")))?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&payload)
                    .await
                    .map_err(|e| CollaboratorError::new(format!("write stdin: {e}")))?;
                // Dropping stdin closes it so the child sees EOF.
            }

            let stderr_task = child.stderr.take().map(|stderr| {
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if logs.send(line).await.is_err() {
                            break;
                        }
                    }
                })
            });

            let mut stdout = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                out.read_to_end(&mut stdout)
                    .await
                    .map_err(|e| CollaboratorError::new(format!("read stdout: {e}")))?;
            }
            let status = child
                .wait()
                .await
                .map_err(|e| CollaboratorError::new(format!("wait: {e}")))?;
            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            if !status.success() {
                return Err(CollaboratorError::new(format!(
                    "evaluator exited with {status}"
                )));
            }

            serde_json::from_slice(&stdout)
                .map_err(|e| CollaboratorError::new(format!("parse verdict: {e}")))
        }
        .boxed()
    }
}

pub struct EvaluatePhase {
    evaluator: Arc<dyn RuleEvaluator>,
}

impl EvaluatePhase {
    pub fn new(evaluator: Arc<dyn RuleEvaluator>) -> Self {
        EvaluatePhase { evaluator }
    }
}

impl PhaseExecutor for EvaluatePhase {
    fn phase(&self) -> Phase {
        Phase::Evaluations
    }

    fn spawn(&self, ctx: PhaseContext, tx: mpsc::Sender<PhaseProgress>) -> JoinHandle<()> {
        let evaluator = Arc::clone(&self.evaluator);
        tokio::spawn(async move {
            let body = run(ctx, tx.clone(), evaluator);
            run_reporting(tx, body).await;
        })
    }
}

async fn run(
    ctx: PhaseContext,
    tx: mpsc::Sender<PhaseProgress>,
    evaluator: Arc<dyn RuleEvaluator>,
) -> Result<PhaseOutput, String> {
    let tasks = ctx
        .state
        .tasks
        .clone()
        .ok_or("evaluation phase requires rules phase output")?;

    // Resume: results already on disk are loaded, not re-evaluated.
    let completed = ctx.store.completed_task_ids();
    let mut results: Vec<RuleEvaluationResult> = Vec::with_capacity(tasks.len());

    // Log lines from the evaluator are forwarded on the phase channel.
    let (log_tx, mut log_rx) = mpsc::channel::<String>(16);

    for (index, task) in tasks.iter().enumerate() {
        if completed.contains(&task.task_id) {
            match ctx
                .store
                .read_json::<RuleEvaluationResult>(Phase::Evaluations, &format!("{}.json", task.task_id))
            {
                Ok(prior) => {
                    log(&tx, format!("[{}/{}] {} (cached)", index + 1, tasks.len(), task.task_id))
                        .await;
                    results.push(prior);
                    continue;
                }
                Err(_) => {
                    // Unreadable prior result: fall through and re-evaluate.
                }
            }
        }

        log(
            &tx,
            format!("[{}/{}] evaluating {}", index + 1, tasks.len(), task.task_id),
        )
        .await;

        let started = Instant::now();
        let mut evaluation = evaluator.evaluate(task, log_tx.clone());
        let verdict = loop {
            tokio::select! {
                verdict = &mut evaluation => break verdict,
                line = log_rx.recv() => {
                    if let Some(line) = line {
                        log(&tx, line).await;
                    }
                }
            }
        };
        while let Ok(line) = log_rx.try_recv() {
            log(&tx, line).await;
        }

        let verdict = verdict.map_err(|e| format!("{}: {e}", task.task_id))?;
        let result = RuleEvaluationResult {
            task_id: task.task_id.clone(),
            rule_name: task.rule_name.clone(),
            file_path: task.file_path.clone(),
            evaluation: verdict.evaluation,
            model_used: verdict
                .model_used
                .or_else(|| task.model.clone())
                .unwrap_or_else(|| "default".to_owned()),
            duration_ms: started.elapsed().as_millis() as u64,
            cost_usd: verdict.cost_usd,
        };

        ctx.store
            .write_json(Phase::Evaluations, &format!("{}.json", result.task_id), &result)
            .map_err(|e| e.to_string())?;
        results.push(result);
    }

    Ok(PhaseOutput::Evaluations(results))
}
