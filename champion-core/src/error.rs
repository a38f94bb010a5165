//! Error types for the champion-core crate.

use crate::resolve::ResolutionTrail;
use thiserror::Error;

/// Top-level error type for selection and resolution operations.
#[derive(Debug, Error)]
pub enum ChampionError {
    /// A candidate backbone has no benchmark and no proxy-table entry, so no
    /// speed score can be derived for it. Fatal to the candidate, not to the
    /// selection as a whole: callers exclude the candidate and log the
    /// omission.
    #[error("Unknown backbone '{0}': no benchmark and no speed-proxy entry")]
    UnknownBackbone(String),

    /// The selection policy produced an empty eligible set.
    #[error("No eligible candidate: accuracy floor {floor:.4} excluded all {candidates} candidate(s)")]
    NoEligibleCandidate { floor: f64, candidates: usize },

    /// An artifact was found at some tier but its recorded hashes disagree
    /// with the expected study/trial keys.
    #[error("Hash mismatch at {location}: expected {expected}, found {actual}")]
    HashMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    /// Every resolution tier was exhausted. Carries the full diagnostic
    /// trail; the message distinguishes "never found" from "found but all
    /// candidates failed hash verification".
    #[error("{}", checkpoint_not_found_message(.trial_key_hash, .trail))]
    CheckpointNotFound {
        trial_key_hash: String,
        trail: ResolutionTrail,
    },

    /// The run-tracking store client failed.
    #[error("Tracking store error: {0}")]
    Tracking(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ChampionError {
    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

fn checkpoint_not_found_message(trial_key_hash: &str, trail: &ResolutionTrail) -> String {
    let mismatches = trail.hash_mismatches();
    let verdict = if mismatches > 0 {
        format!(
            "{mismatches} candidate(s) found but rejected on hash mismatch (possible corruption or naming bug)"
        )
    } else {
        "no candidate artifact found at any tier".to_string()
    };
    format!(
        "Checkpoint not found for trial {trial_key_hash}: {verdict}; {} location(s) checked:\n{trail}",
        trail.len(),
    )
}
