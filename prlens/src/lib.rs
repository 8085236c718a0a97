//! Phase pipeline for automated pull-request review: orchestrator, artifact
//! store, git worker, and the built-in phase executors. The pure diff and
//! analysis primitives live in `prlens-core`.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod git;
pub mod phases;
pub mod pipeline;
pub mod watchdog;

pub use artifacts::ArtifactStore;
pub use config::Config;
pub use error::{CollaboratorError, PipelineError};
pub use pipeline::{
    CommentStats, DiffArtifacts, Phase, PhaseContext, PhaseExecutor, PhaseOutput, PhaseProgress,
    PhaseState, Pipeline, PipelineEvent, PipelineOptions, RunReport, RunState,
};
pub use watchdog::Watchdog;
