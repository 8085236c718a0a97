//! Pure review primitives: diff parsing and annotation, blame attribution,
//! move detection, and evaluation aggregation. No I/O, no async; everything
//! here operates on immutable snapshots and is safe to call from any thread.

pub mod blame;
pub mod diff;
pub mod moves;
pub mod parse;
pub mod summary;

pub use blame::{Author, BlameSection, Confidence, FileBlameData, Ownership};
pub use diff::{DiffLine, DiffLineKind, GitDiff, Hunk};
pub use moves::{Move, MoveConfig, MoveDetector, MoveReport};
pub use parse::parse_diff;
pub use summary::{
    summarize, EvaluationSummary, EvaluationTask, RuleEvaluation, RuleEvaluationResult,
};
