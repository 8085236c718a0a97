//! Evaluation tasks, verdicts, and run-level aggregation.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One unit of review work: a rule applied to one hunk of the diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTask {
    /// Stable identifier, also used as the per-task artifact file name.
    pub task_id: String,
    pub rule_name: String,
    pub rule_file: String,
    pub file_path: String,
    /// New-file line range the hunk covers, 1-based inclusive.
    pub start_line: u32,
    pub end_line: u32,
    /// The annotated hunk text the evaluator sees.
    pub diff_content: String,
    pub model: Option<String>,
}

/// An evaluator's verdict for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub violates_rule: bool,
    /// 1 to 10; how severe the finding is when `violates_rule` is set.
    pub score: u8,
    pub comment: String,
    pub file_path: String,
    pub line_number: Option<u32>,
}

impl RuleEvaluation {
    /// A finding only counts as a violation when the evaluator both flagged
    /// it and scored it at least 5. Lower-scored flags are noise in practice.
    pub fn is_violation(&self) -> bool {
        self.violates_rule && self.score >= 5
    }
}

/// A completed task: the verdict plus its execution metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluationResult {
    pub task_id: String,
    pub rule_name: String,
    pub file_path: String,
    pub evaluation: RuleEvaluation,
    pub model_used: String,
    pub duration_ms: u64,
    pub cost_usd: Option<f64>,
}

impl RuleEvaluationResult {
    pub fn is_violation(&self) -> bool {
        self.evaluation.is_violation()
    }
}

/// Aggregate view over one run's evaluation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub pr_number: u64,
    /// Unix seconds at aggregation time.
    pub evaluated_at: i64,
    pub total_tasks: usize,
    pub violations_found: usize,
    /// Missing per-result costs count as zero.
    pub total_cost_usd: f64,
    pub total_duration_ms: u64,
    /// Sorted, distinct model names seen across results.
    pub models_used: Vec<String>,
    pub results: Vec<RuleEvaluationResult>,
}

impl EvaluationSummary {
    /// Results that crossed the violation threshold.
    pub fn violations(&self) -> impl Iterator<Item = &RuleEvaluationResult> {
        self.results.iter().filter(|r| r.is_violation())
    }
}

/// Folds a run's results into an [`EvaluationSummary`].
///
/// Every derived value is order-independent, so callers may hand results in
/// any order (resume runs interleave persisted and fresh results).
pub fn summarize(pr_number: u64, results: Vec<RuleEvaluationResult>) -> EvaluationSummary {
    let mut models_used: Vec<String> = results.iter().map(|r| r.model_used.clone()).collect();
    models_used.sort();
    models_used.dedup();

    let evaluated_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    EvaluationSummary {
        pr_number,
        evaluated_at,
        total_tasks: results.len(),
        violations_found: results.iter().filter(|r| r.is_violation()).count(),
        total_cost_usd: results.iter().filter_map(|r| r.cost_usd).sum(),
        total_duration_ms: results.iter().map(|r| r.duration_ms).sum(),
        models_used,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rule: &str, file: &str, violates: bool, score: u8) -> RuleEvaluationResult {
        RuleEvaluationResult {
            task_id: format!("{rule}-{file}"),
            rule_name: rule.to_owned(),
            file_path: file.to_owned(),
            evaluation: RuleEvaluation {
                violates_rule: violates,
                score,
                comment: "because".to_owned(),
                file_path: file.to_owned(),
                line_number: Some(3),
            },
            model_used: "default".to_owned(),
            duration_ms: 120,
            cost_usd: Some(0.01),
        }
    }

    #[test]
    fn low_score_flags_are_not_violations() {
        assert!(!result("r", "f", true, 4).is_violation());
        assert!(result("r", "f", true, 5).is_violation());
        assert!(!result("r", "f", false, 10).is_violation());
    }

    #[test]
    fn summary_counts_and_dedupes_models() {
        let results = vec![
            result("naming", "src/a.rs", true, 7),
            result("naming", "src/a.rs", true, 8),
            result("errors", "src/b.rs", true, 3),
            result("errors", "src/c.rs", false, 0),
        ];
        let summary = summarize(42, results);
        assert_eq!(summary.pr_number, 42);
        assert_eq!(summary.total_tasks, 4);
        assert_eq!(summary.violations_found, 2);
        assert_eq!(summary.models_used, vec!["default"]);
        assert_eq!(summary.violations().count(), 2);
        assert_eq!(summary.total_duration_ms, 480);
    }

    #[test]
    fn evaluation_deserializes_from_flat_json() {
        // Wire shape produced by external evaluators.
        let raw = r#"{
            "violates_rule": true,
            "score": 7,
            "comment": "shadowed variable",
            "file_path": "src/a.rs",
            "line_number": 14
        }"#;
        let evaluation: RuleEvaluation = serde_json::from_str(raw).expect("parse");
        assert!(evaluation.is_violation());
        assert_eq!(evaluation.line_number, Some(14));
    }

    #[test]
    fn missing_costs_sum_as_zero() {
        let mut a = result("r", "f", false, 0);
        a.cost_usd = None;
        let b = result("r", "g", false, 0);
        let summary = summarize(1, vec![a, b]);
        assert!((summary.total_cost_usd - 0.01).abs() < 1e-9);
    }
}
