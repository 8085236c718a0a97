//! Configuration loading.
//!
//! Prefers `$XDG_CONFIG_HOME/prlens/config.toml` (falling back to
//! `~/.config/prlens/config.toml`), then `./prlens.toml` in the working
//! directory. A missing or unparseable file is a soft failure: the error is
//! logged and defaults apply. Never panics over config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use prlens_core::MoveConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root directory for phase artifacts.
    pub output_root: PathBuf,
    /// Directory of markdown rule files.
    pub rules_dir: PathBuf,
    /// Path to the git repository under review.
    pub repo_path: String,
    /// Base (pre-change) ref of the review range.
    pub base_ref: String,
    /// Head (post-change) ref of the review range.
    pub head_ref: String,
    /// Shortest matched block move detection may propose.
    pub move_min_run_len: usize,
    /// Minimum match score for a proposed move.
    pub move_score_threshold: f64,
    /// Seconds of executor silence before a phase is aborted.
    pub watchdog_timeout_secs: u64,
    /// Seconds between watchdog idle checks.
    pub watchdog_poll_secs: u64,
    /// Minimum violation score worth a posted comment.
    pub min_comment_score: u8,
    /// Command (program + args) receiving each task as JSON on stdin.
    pub evaluator_command: Vec<String>,
    /// Command (program + args) receiving each comment as JSON on stdin.
    pub comment_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_root: PathBuf::from(".prlens"),
            rules_dir: PathBuf::from("rules"),
            repo_path: ".".to_owned(),
            base_ref: "origin/main".to_owned(),
            head_ref: "HEAD".to_owned(),
            move_min_run_len: 3,
            move_score_threshold: 0.5,
            watchdog_timeout_secs: 300,
            watchdog_poll_secs: 5,
            min_comment_score: 5,
            evaluator_command: vec!["prlens-evaluate".to_owned()],
            comment_command: vec!["prlens-comment".to_owned()],
        }
    }
}

impl Config {
    pub fn move_config(&self) -> MoveConfig {
        MoveConfig {
            min_run_len: self.move_min_run_len,
            score_threshold: self.move_score_threshold,
        }
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_secs(self.watchdog_poll_secs)
    }
}

/// Returns the XDG path of the config file.
///
/// Prefers `$XDG_CONFIG_HOME/prlens/config.toml`; falls back to
/// `~/.config/prlens/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("prlens").join("config.toml")
}

/// Loads config from `explicit` when given, else the XDG path, else
/// `./prlens.toml`. Missing file yields defaults; a parse error is logged
/// and also yields defaults.
pub fn load(explicit: Option<&Path>) -> Config {
    let candidates: Vec<PathBuf> = match explicit {
        Some(p) => vec![p.to_owned()],
        None => vec![config_path(), PathBuf::from("prlens.toml")],
    };

    for path in candidates {
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(_) => continue,
        };
        match toml::from_str::<Config>(&raw) {
            Ok(config) => return config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config parse error, using defaults");
                return Config::default();
            }
        }
    }
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_keys() {
        let config: Config = toml::from_str("base_ref = \"origin/develop\"").expect("parse");
        assert_eq!(config.base_ref, "origin/develop");
        assert_eq!(config.head_ref, "HEAD");
        assert_eq!(config.move_min_run_len, 3);
        assert_eq!(config.min_comment_score, 5);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("not_a_key = 1").is_err());
    }
}
