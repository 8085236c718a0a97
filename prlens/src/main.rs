//! prlens: rule-driven pull-request review pipeline.
//!
//! Entry point for the `prlens` binary. Wires the git worker thread, the
//! artifact store, and the five phase executors into a [`Pipeline`], then
//! drives the run while rendering progress events and polling a SIGTERM
//! flag. Exit code is 0 on a successful run (including one with violations
//! found: finding them is the job) and 1 on a pipeline failure or abort.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prlens::config;
use prlens::git::GitWorker;
use prlens::phases::{
    CommandEvaluator, CommandPoster, CommentPhase, CommentPoster, DiffPhase, EvaluatePhase,
    NullPoster, ReportPhase, RulesPhase,
};
use prlens::{
    ArtifactStore, Phase, PhaseExecutor, PhaseState, Pipeline, PipelineError, PipelineEvent,
    PipelineOptions,
};

#[derive(Parser, Debug)]
#[command(
    name = "prlens",
    about = "Rule-driven pull-request review pipeline",
    after_help = "Phases: diff, rules, evaluations, report, comment"
)]
struct CliArgs {
    /// Pull request number under review.
    pr_number: u64,

    /// Start at this phase; earlier phases must have artifacts on disk.
    #[arg(long, value_name = "PHASE")]
    skip_to: Option<Phase>,

    /// Stop the run once this phase completes.
    #[arg(long, value_name = "PHASE")]
    stop_after: Option<Phase>,

    /// Log comments instead of posting them.
    #[arg(long)]
    dry_run: bool,

    /// Explicit config file path (defaults to the XDG lookup).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn render_event(event: &PipelineEvent) {
    match &event.state {
        PhaseState::Running => println!("[{}] running", event.phase),
        PhaseState::Log(line) => println!("[{}] {line}", event.phase),
        PhaseState::Completed => println!("[{}] completed", event.phase),
        PhaseState::Failed(error) => println!("[{}] failed: {error}", event.phase),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = config::load(args.config.as_deref());

    // SIGTERM flag, polled alongside the progress stream below.
    let term_flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term_flag))
        .context("register SIGTERM handler")?;

    let worker = GitWorker::spawn(config.repo_path.clone());
    let store = Arc::new(ArtifactStore::new(config.output_root.clone(), args.pr_number));

    let poster: Arc<dyn CommentPoster> = if args.dry_run {
        Arc::new(NullPoster)
    } else {
        Arc::new(CommandPoster::new(config.comment_command.clone()))
    };

    let executors: Vec<Box<dyn PhaseExecutor>> = vec![
        Box::new(DiffPhase::new(
            worker,
            &config.base_ref,
            &config.head_ref,
            config.move_config(),
        )),
        Box::new(RulesPhase::new(config.rules_dir.clone())),
        Box::new(EvaluatePhase::new(Arc::new(CommandEvaluator::new(
            config.evaluator_command.clone(),
        )))),
        Box::new(ReportPhase),
        Box::new(CommentPhase::new(poster, config.min_comment_score)),
    ];

    let options = PipelineOptions {
        skip_to: args.skip_to,
        stop_after: args.stop_after,
        watchdog_timeout: config.watchdog_timeout(),
        watchdog_poll: config.watchdog_poll(),
    };
    let pipeline = Pipeline::new(args.pr_number, Arc::clone(&store), executors, options);
    info!(run_id = %pipeline.run_id(), pr = args.pr_number, "starting review run");

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let mut run = Box::pin(pipeline.run(progress_tx));

    let outcome = loop {
        tokio::select! {
            result = &mut run => break result,
            event = progress_rx.recv() => {
                if let Some(event) = event {
                    render_event(&event);
                }
            }
            // Heartbeat so SIGTERM is noticed even while a phase is quiet.
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if term_flag.load(Ordering::Relaxed) {
                    break Err(PipelineError::Aborted);
                }
            }
        }
    };

    while let Ok(event) = progress_rx.try_recv() {
        render_event(&event);
    }

    let report = outcome?;
    println!(
        "run {} finished: {} phases",
        report.run_id,
        report.phases_run.len()
    );
    for (phase, files) in &report.artifacts {
        println!("  {}: {} artifacts", phase, files.len());
    }
    if let Some(summary) = &report.summary {
        println!(
            "  {} violations across {} evaluations",
            summary.violations_found, summary.total_tasks
        );
    }
    if let Some(stats) = &report.comment_stats {
        println!(
            "  comments: {} posted, {} failed",
            stats.posted, stats.failed
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn phase_flags_parse_through_from_str() {
        let args = CliArgs::parse_from(["prlens", "42", "--skip-to", "rules", "--dry-run"]);
        assert_eq!(args.pr_number, 42);
        assert_eq!(args.skip_to, Some(Phase::Rules));
        assert_eq!(args.stop_after, None);
        assert!(args.dry_run);
    }

    #[test]
    fn unknown_phase_is_rejected() {
        assert!(CliArgs::try_parse_from(["prlens", "1", "--stop-after", "deploy"]).is_err());
    }
}
