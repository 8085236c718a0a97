//! Rules phase: rule files in, evaluation tasks out.
//!
//! A rule is a markdown file with a small TOML front matter block delimited
//! by `+++` lines: `name` and `description` are required, `pattern` (regex
//! over the hunk's changed content), `extensions` (file-extension scoping),
//! and `model` are optional. The markdown body is the instruction text the
//! evaluator receives. One task is emitted per surviving rule x hunk pair,
//! keyed by the hunk's stable chunk name.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use prlens_core::{EvaluationTask, GitDiff, Hunk};

use crate::phases::{log, run_reporting};
use crate::pipeline::{Phase, PhaseContext, PhaseExecutor, PhaseOutput, PhaseProgress};

#[derive(Debug, Deserialize)]
struct FrontMatter {
    name: String,
    description: String,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    extensions: Option<Vec<String>>,
    #[serde(default)]
    model: Option<String>,
}

/// One loaded rule file.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub name: String,
    pub description: String,
    pub pattern: Option<String>,
    pub extensions: Option<Vec<String>>,
    pub model: Option<String>,
    pub body: String,
    pub source_path: PathBuf,
}

impl RuleSpec {
    /// Parses `+++`-delimited TOML front matter followed by a markdown body.
    pub fn parse(path: &Path, content: &str) -> Result<RuleSpec, String> {
        let rest = content
            .strip_prefix("+++")
            .ok_or_else(|| format!("{}: missing front matter", path.display()))?;
        let (front, body) = rest
            .split_once("+++")
            .ok_or_else(|| format!("{}: unterminated front matter", path.display()))?;
        let meta: FrontMatter =
            toml::from_str(front).map_err(|e| format!("{}: {e}", path.display()))?;
        Ok(RuleSpec {
            name: meta.name,
            description: meta.description,
            pattern: meta.pattern,
            extensions: meta.extensions,
            model: meta.model,
            body: body.trim_start_matches('\n').to_owned(),
            source_path: path.to_owned(),
        })
    }

    /// The extensions this rule is scoped to, leading dots stripped.
    /// `None` means the rule applies to every file.
    pub fn scoped_extensions(&self) -> Option<Vec<&str>> {
        self.extensions
            .as_ref()
            .map(|exts| exts.iter().map(|e| e.trim_start_matches('.')).collect())
    }

    /// Whether the rule's pattern matches the hunk's changed content.
    ///
    /// A rule without a pattern matches every hunk it is scoped to. A
    /// pattern that fails to compile disables the rule for this run.
    pub fn content_matches(&self, hunk: &Hunk) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        let Ok(re) = Regex::new(pattern) else {
            warn!(rule = %self.name, pattern = %pattern, "invalid rule pattern");
            return false;
        };
        re.is_match(&hunk.changed_content())
    }
}

/// Loads every `.md` rule under `dir`, sorted by file name.
///
/// Unparseable files are reported and skipped; a review run with one broken
/// rule file should still evaluate the rest.
pub fn load_rules(dir: &Path) -> (Vec<RuleSpec>, Vec<String>) {
    let mut paths: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "md"))
            .collect(),
        Err(e) => return (Vec::new(), vec![format!("{}: {e}", dir.display())]),
    };
    paths.sort();

    let mut rules = Vec::new();
    let mut problems = Vec::new();
    for path in paths {
        match fs::read_to_string(&path) {
            Ok(content) => match RuleSpec::parse(&path, &content) {
                Ok(rule) => rules.push(rule),
                Err(problem) => problems.push(problem),
            },
            Err(e) => problems.push(format!("{}: {e}", path.display())),
        }
    }
    (rules, problems)
}

pub struct RulesPhase {
    rules_dir: PathBuf,
}

impl RulesPhase {
    pub fn new(rules_dir: impl Into<PathBuf>) -> Self {
        RulesPhase {
            rules_dir: rules_dir.into(),
        }
    }
}

impl PhaseExecutor for RulesPhase {
    fn phase(&self) -> Phase {
        Phase::Rules
    }

    fn spawn(&self, ctx: PhaseContext, tx: mpsc::Sender<PhaseProgress>) -> JoinHandle<()> {
        let rules_dir = self.rules_dir.clone();
        tokio::spawn(async move {
            let body = run(ctx, tx.clone(), rules_dir);
            run_reporting(tx, body).await;
        })
    }
}

async fn run(
    ctx: PhaseContext,
    tx: mpsc::Sender<PhaseProgress>,
    rules_dir: PathBuf,
) -> Result<PhaseOutput, String> {
    let diff = ctx
        .state
        .diff
        .clone()
        .ok_or("rules phase requires diff phase output")?;

    let (rules, problems) = load_rules(&rules_dir);
    for problem in &problems {
        warn!(%problem, "skipping rule file");
        log(&tx, format!("skipping rule file: {problem}")).await;
    }
    if rules.is_empty() {
        return Err(format!("no usable rules in {}", rules_dir.display()));
    }
    log(&tx, format!("loaded {} rules", rules.len())).await;

    let tasks = build_tasks(&rules, &diff.effective);
    log(&tx, format!("matched {} tasks", tasks.len())).await;

    ctx.store
        .write_json(Phase::Rules, "all-rules.json", &tasks)
        .map_err(|e| e.to_string())?;
    for task in &tasks {
        ctx.store
            .write_json(Phase::Rules, &format!("{}.json", task.task_id), task)
            .map_err(|e| e.to_string())?;
    }

    Ok(PhaseOutput::Rules(tasks))
}

/// Crosses rules with the effective diff's hunks.
///
/// Extension scoping narrows the hunk set per rule; the rule's pattern then
/// filters on each remaining hunk's changed content.
pub fn build_tasks(rules: &[RuleSpec], effective: &GitDiff) -> Vec<EvaluationTask> {
    let mut tasks = Vec::new();
    for rule in rules {
        let scoped = rule.scoped_extensions();
        for hunk in effective.hunks_by_extension(scoped.as_deref()) {
            if !rule.content_matches(hunk) {
                continue;
            }
            tasks.push(EvaluationTask {
                task_id: format!("{}-{}", rule.name, hunk.chunk_name()),
                rule_name: rule.name.clone(),
                rule_file: rule.source_path.to_string_lossy().into_owned(),
                file_path: hunk.file_path.clone(),
                start_line: hunk.new_start,
                end_line: hunk.new_start + hunk.new_length.saturating_sub(1),
                diff_content: hunk.annotated_content(),
                model: rule.model.clone(),
            });
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use prlens_core::parse_diff;

    const RULE: &str = "+++\nname = \"no-unwrap\"\ndescription = \"avoid unwrap in library code\"\npattern = \"unwrap\\\\(\\\\)\"\nextensions = [\"rs\"]\n+++\n\nFlag unwrap calls outside tests.\n";

    #[test]
    fn front_matter_parses() {
        let rule = RuleSpec::parse(Path::new("rules/no-unwrap.md"), RULE).expect("parse");
        assert_eq!(rule.name, "no-unwrap");
        assert_eq!(rule.extensions.as_deref(), Some(&["rs".to_owned()][..]));
        assert!(rule.body.starts_with("Flag unwrap"));
    }

    #[test]
    fn missing_front_matter_is_an_error() {
        assert!(RuleSpec::parse(Path::new("r.md"), "just markdown").is_err());
    }

    #[test]
    fn matching_respects_extension_and_pattern() {
        let rule = RuleSpec::parse(Path::new("rules/no-unwrap.md"), RULE).expect("parse");
        // notes.txt hits the pattern but not the extension scope; ok.rs is
        // in scope but misses the pattern.
        let diff = parse_diff(
            "diff --git a/src/lib.rs b/src/lib.rs\n@@ -1,1 +1,2 @@\n fn f() {}\n+let x = y.unwrap();\ndiff --git a/notes.txt b/notes.txt\n@@ -1,1 +1,2 @@\n hello\n+unwrap()\ndiff --git a/src/ok.rs b/src/ok.rs\n@@ -1,1 +1,2 @@\n fn g() {}\n+let z = 1;\n",
            None,
        );
        let tasks = build_tasks(&[rule], &diff);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_path, "src/lib.rs");
    }

    #[test]
    fn dotted_extensions_are_normalized() {
        let dotted = RULE.replace("extensions = [\"rs\"]", "extensions = [\".rs\"]");
        let rule = RuleSpec::parse(Path::new("rules/no-unwrap.md"), &dotted).expect("parse");
        assert_eq!(rule.scoped_extensions().as_deref(), Some(&["rs"][..]));
    }

    #[test]
    fn tasks_are_one_per_matching_rule_and_hunk() {
        let rule = RuleSpec::parse(Path::new("rules/no-unwrap.md"), RULE).expect("parse");
        let diff = parse_diff(
            "diff --git a/src/lib.rs b/src/lib.rs\n@@ -1,1 +1,2 @@\n fn f() {}\n+let x = y.unwrap();\n",
            None,
        );
        let tasks = build_tasks(&[rule], &diff);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].rule_name, "no-unwrap");
        assert_eq!(tasks[0].start_line, 1);
        assert_eq!(tasks[0].end_line, 2);
        assert!(tasks[0].task_id.contains("src_lib_rs_L1"));
    }
}
