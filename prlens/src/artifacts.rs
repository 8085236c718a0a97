//! On-disk phase artifact store.
//!
//! Layout is deterministic: `<root>/pr-<n>/<phase-dir>/<file>`, with phase
//! directory names carrying a numeric prefix so a plain directory listing
//! reads in pipeline order. The orchestrator's only dependency on the layout
//! is "list the files under a phase dir after the run"; everything else here
//! exists for the executors.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::Phase;

#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    pr_number: u64,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, pr_number: u64) -> Self {
        ArtifactStore {
            root: root.into(),
            pr_number,
        }
    }

    pub fn pr_dir(&self) -> PathBuf {
        self.root.join(format!("pr-{}", self.pr_number))
    }

    pub fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.pr_dir().join(phase.dir_name())
    }

    pub fn ensure_phase_dir(&self, phase: Phase) -> io::Result<PathBuf> {
        let dir = self.phase_dir(phase);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Serializes `value` as pretty JSON under the phase dir.
    pub fn write_json<T: Serialize>(
        &self,
        phase: Phase,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, PipelineError> {
        let dir = self.ensure_phase_dir(phase)?;
        let path = dir.join(name);
        let body = serde_json::to_vec_pretty(value)?;
        fs::write(&path, body)?;
        Ok(path)
    }

    pub fn write_text(
        &self,
        phase: Phase,
        name: &str,
        text: &str,
    ) -> Result<PathBuf, PipelineError> {
        let dir = self.ensure_phase_dir(phase)?;
        let path = dir.join(name);
        fs::write(&path, text)?;
        Ok(path)
    }

    pub fn read_json<T: DeserializeOwned>(
        &self,
        phase: Phase,
        name: &str,
    ) -> Result<T, PipelineError> {
        let bytes = fs::read(self.phase_dir(phase).join(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Files under the phase dir, sorted by name. Missing dir reads as
    /// empty rather than an error: never-run phases are a normal state.
    pub fn list_phase_files(&self, phase: Phase) -> Vec<PathBuf> {
        let mut files = match fs::read_dir(self.phase_dir(phase)) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        files.sort();
        files
    }

    pub fn phase_has_output(&self, phase: Phase) -> bool {
        !self.list_phase_files(phase).is_empty()
    }

    /// Task IDs with a persisted result under the evaluations dir. Lets a
    /// re-run skip work that already finished.
    pub fn completed_task_ids(&self) -> HashSet<String> {
        self.list_phase_files(Phase::Evaluations)
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .filter_map(|p| {
                p.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Blob {
        n: u32,
    }

    #[test]
    fn json_round_trip_and_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), 7);

        assert!(!store.phase_has_output(Phase::Diff));
        store
            .write_json(Phase::Diff, "b.json", &Blob { n: 2 })
            .expect("write");
        store
            .write_json(Phase::Diff, "a.json", &Blob { n: 1 })
            .expect("write");

        let files = store.list_phase_files(Phase::Diff);
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);

        let back: Blob = store.read_json(Phase::Diff, "a.json").expect("read");
        assert_eq!(back, Blob { n: 1 });
        assert!(store.pr_dir().ends_with("pr-7"));
    }

    #[test]
    fn completed_ids_come_from_evaluation_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), 1);
        store
            .write_json(Phase::Evaluations, "naming-src_a_rs_L10.json", &Blob { n: 0 })
            .expect("write");
        store
            .write_text(Phase::Evaluations, "notes.txt", "ignored")
            .expect("write");

        let ids = store.completed_task_ids();
        assert!(ids.contains("naming-src_a_rs_L10"));
        assert_eq!(ids.len(), 1);
    }
}
