//! Report phase: fold results into the run summary.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use prlens_core::{summarize, EvaluationSummary};

use crate::phases::{log, run_reporting};
use crate::pipeline::{Phase, PhaseContext, PhaseExecutor, PhaseOutput, PhaseProgress};

pub struct ReportPhase;

impl PhaseExecutor for ReportPhase {
    fn phase(&self) -> Phase {
        Phase::Report
    }

    fn spawn(&self, ctx: PhaseContext, tx: mpsc::Sender<PhaseProgress>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let body = run(ctx, tx.clone());
            run_reporting(tx, body).await;
        })
    }
}

async fn run(ctx: PhaseContext, tx: mpsc::Sender<PhaseProgress>) -> Result<PhaseOutput, String> {
    let results = ctx
        .state
        .results
        .clone()
        .ok_or("report phase requires evaluation phase output")?;

    let summary = summarize(ctx.pr_number, results.as_ref().clone());
    log(
        &tx,
        format!(
            "{} violations across {} evaluations",
            summary.violations_found, summary.total_tasks
        ),
    )
    .await;

    ctx.store
        .write_json(Phase::Report, "summary.json", &summary)
        .map_err(|e| e.to_string())?;
    ctx.store
        .write_text(Phase::Report, "summary.md", &render_markdown(&summary))
        .map_err(|e| e.to_string())?;

    Ok(PhaseOutput::Report(summary))
}

/// Human-readable digest next to the machine-readable summary.json.
fn render_markdown(summary: &EvaluationSummary) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Review summary for PR #{}\n\n", summary.pr_number));
    md.push_str(&format!(
        "- evaluations: {}\n- violations: {}\n- models: {}\n- total cost: ${:.4}\n- total duration: {}ms\n\n",
        summary.total_tasks,
        summary.violations_found,
        if summary.models_used.is_empty() {
            "none".to_owned()
        } else {
            summary.models_used.join(", ")
        },
        summary.total_cost_usd,
        summary.total_duration_ms,
    ));

    if summary.violations_found == 0 {
        md.push_str("No violations found.\n");
        return md;
    }

    md.push_str("## Violations\n\n");
    for result in summary.violations() {
        let location = match result.evaluation.line_number {
            Some(line) => format!("{}:{line}", result.file_path),
            None => result.file_path.clone(),
        };
        md.push_str(&format!(
            "### {} at {location} (score {})\n\n{}\n\n",
            result.rule_name, result.evaluation.score, result.evaluation.comment,
        ));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use prlens_core::{RuleEvaluation, RuleEvaluationResult};

    #[test]
    fn markdown_lists_only_violations() {
        let results = vec![
            RuleEvaluationResult {
                task_id: "a".into(),
                rule_name: "naming".into(),
                file_path: "src/a.rs".into(),
                evaluation: RuleEvaluation {
                    violates_rule: true,
                    score: 8,
                    comment: "rename this".into(),
                    file_path: "src/a.rs".into(),
                    line_number: Some(12),
                },
                model_used: "default".into(),
                duration_ms: 5,
                cost_usd: None,
            },
            RuleEvaluationResult {
                task_id: "b".into(),
                rule_name: "naming".into(),
                file_path: "src/b.rs".into(),
                evaluation: RuleEvaluation {
                    violates_rule: false,
                    score: 0,
                    comment: "fine".into(),
                    file_path: "src/b.rs".into(),
                    line_number: None,
                },
                model_used: "default".into(),
                duration_ms: 5,
                cost_usd: None,
            },
        ];
        let md = render_markdown(&summarize(9, results));
        assert!(md.contains("PR #9"));
        assert!(md.contains("src/a.rs:12"));
        assert!(md.contains("rename this"));
        assert!(!md.contains("fine"));
    }
}
