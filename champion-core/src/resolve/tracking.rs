//! Read-only interface to the run-tracking store.
//!
//! Runs form a family tree: a parent HPO run owns trial runs and refit runs.
//! Tags are a loosely-typed bag; older or malformed runs may miss any of
//! them, so every accessor here is defensive.

use crate::error::ChampionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Tag recording the study identity hash on a run.
pub const TAG_STUDY_KEY_HASH: &str = "study_key_hash";
/// Tag recording the trial identity hash on a run.
pub const TAG_TRIAL_KEY_HASH: &str = "trial_key_hash";
/// Tag linking a refit run back to the trial run it retrains.
pub const TAG_PARENT_RUN_ID: &str = "parent_run_id";
/// Tag classifying a run within its family: "hpo", "trial" or "refit".
pub const TAG_RUN_KIND: &str = "run_kind";

/// Name of the checkpoint artifact directory attached to a run.
pub const CHECKPOINT_ARTIFACT: &str = "checkpoint";

/// One run as reported by the tracking store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub parent_run_id: Option<String>,
    pub tags: HashMap<String, String>,
    /// Top-level artifact paths attached to the run.
    pub artifacts: Vec<String>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunInfo {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_refit(&self) -> bool {
        self.tag(TAG_RUN_KIND) == Some("refit")
    }

    /// Refit candidate under defensive tagging: an explicit "refit" kind, or
    /// no kind tag at all (older runs). Runs positively tagged as trial or
    /// HPO runs are excluded.
    pub fn could_be_refit(&self) -> bool {
        !matches!(self.tag(TAG_RUN_KIND), Some("trial") | Some("hpo"))
    }

    /// Parent-HPO-run candidate: an explicit "hpo" kind, or an untagged run
    /// with no parent of its own.
    pub fn looks_like_parent(&self) -> bool {
        match self.tag(TAG_RUN_KIND) {
            Some("hpo") => true,
            Some(_) => false,
            None => self.parent_run_id.is_none(),
        }
    }

    /// True when the run carries a checkpoint artifact.
    pub fn has_checkpoint_artifact(&self) -> bool {
        self.artifacts.iter().any(|a| {
            a == CHECKPOINT_ARTIFACT || a.starts_with(&format!("{CHECKPOINT_ARTIFACT}/"))
        })
    }
}

/// Client for the run-tracking store.
///
/// Every call is a single synchronous attempt: it returns data or raises.
/// Retries and timeouts belong to the implementation behind this trait.
pub trait TrackingClient: Send + Sync {
    /// List runs in an experiment whose tags contain every `(key, value)`
    /// pair in `tag_filter`. An empty filter lists the whole experiment.
    fn list_runs(
        &self,
        experiment: &str,
        tag_filter: &[(&str, &str)],
    ) -> Result<Vec<RunInfo>, ChampionError>;

    /// Download one artifact of a run into `dest_dir`, returning the local
    /// path of the downloaded artifact root.
    fn download_artifact(
        &self,
        run_id: &str,
        artifact_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, ChampionError>;
}

/// Sort newest-first by `end_time`; runs without one sort last.
pub(crate) fn sort_newest_first(runs: &mut [RunInfo]) {
    runs.sort_by(|a, b| b.end_time.cmp(&a.end_time));
}
