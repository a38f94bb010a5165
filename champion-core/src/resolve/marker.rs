//! Checkpoint marker files and hash-continuity verification.
//!
//! A directory is a valid checkpoint iff it contains `checkpoint.json`
//! recording the study and trial hashes of the configuration that produced
//! it. Verification compares both recorded hashes against the expected keys;
//! a structurally plausible directory whose hashes disagree is rejected.

use crate::error::ChampionError;
use crate::resolve::RejectReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Marker file name inside a checkpoint directory.
pub const MARKER_FILE: &str = "checkpoint.json";

/// Metadata written next to checkpoint weights by the producing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMarker {
    pub study_key_hash: String,
    pub trial_key_hash: String,
    pub backbone: String,
    pub trial_number: usize,
    pub created_at: DateTime<Utc>,
}

impl CheckpointMarker {
    pub fn new(
        study_key_hash: &str,
        trial_key_hash: &str,
        backbone: &str,
        trial_number: usize,
    ) -> Self {
        Self {
            study_key_hash: study_key_hash.to_string(),
            trial_key_hash: trial_key_hash.to_string(),
            backbone: backbone.to_string(),
            trial_number,
            created_at: Utc::now(),
        }
    }

    /// Load the marker from a checkpoint directory, if one exists.
    pub fn load(dir: &Path) -> Result<Option<Self>, ChampionError> {
        let path = dir.join(MARKER_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write the marker atomically (tmp file then rename) into `dir`,
    /// creating the directory when needed.
    pub fn write(&self, dir: &Path) -> Result<(), ChampionError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(MARKER_FILE);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Verify hash continuity of a checkpoint directory.
///
/// Returns the verified trial hash on success, or the reason the directory
/// was rejected. Rejections are data for the diagnostic trail, not errors.
pub fn verify_dir(
    dir: &Path,
    expected_study_hash: &str,
    expected_trial_hash: &str,
) -> Result<Result<String, RejectReason>, ChampionError> {
    if !dir.is_dir() {
        return Ok(Err(RejectReason::Missing));
    }
    let Some(marker) = CheckpointMarker::load(dir)? else {
        return Ok(Err(RejectReason::NoArtifact));
    };
    if marker.study_key_hash != expected_study_hash {
        return Ok(Err(RejectReason::HashMismatch {
            expected: expected_study_hash.to_string(),
            actual: marker.study_key_hash,
        }));
    }
    if marker.trial_key_hash != expected_trial_hash {
        return Ok(Err(RejectReason::HashMismatch {
            expected: expected_trial_hash.to_string(),
            actual: marker.trial_key_hash,
        }));
    }
    Ok(Ok(marker.trial_key_hash))
}
