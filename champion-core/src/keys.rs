//! Stable, content-addressable study and trial keys.
//!
//! Keys combine opaque fingerprints supplied by the config layer into
//! SHA-256 identities that are stable across process restarts: no salts,
//! no map-iteration-order dependence, ordered concatenation only.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of one backbone's HPO study.
///
/// The backbone name is lowercased on construction so two studies with equal
/// fingerprints hash identically regardless of backbone string casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyKey {
    pub backbone: String,
    pub search_space_fingerprint: String,
    pub execution_fingerprint: String,
}

impl StudyKey {
    pub fn new(
        backbone: &str,
        search_space_fingerprint: &str,
        execution_fingerprint: &str,
    ) -> Self {
        Self {
            backbone: backbone.to_lowercase(),
            search_space_fingerprint: search_space_fingerprint.to_string(),
            execution_fingerprint: execution_fingerprint.to_string(),
        }
    }

    /// Stable hex digest of this study's identity.
    pub fn hash(&self) -> String {
        compute_hash(&format!(
            "study:{}:{}:{}",
            self.backbone, self.search_space_fingerprint, self.execution_fingerprint
        ))
    }
}

/// Identity of one trial within a study.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialKey {
    pub study_key_hash: String,
    pub trial_number: usize,
}

impl TrialKey {
    pub fn new(study: &StudyKey, trial_number: usize) -> Self {
        Self {
            study_key_hash: study.hash(),
            trial_number,
        }
    }

    /// Stable hex digest of this trial's identity.
    pub fn hash(&self) -> String {
        compute_hash(&format!("trial:{}:{}", self.study_key_hash, self.trial_number))
    }
}

/// Fingerprint of a set of studies plus a policy representation.
///
/// Study hashes are sorted before digesting so the fingerprint is independent
/// of the order the caller happens to pass studies in.
pub fn study_set_fingerprint(keys: &[StudyKey], policy_repr: &str) -> String {
    let mut hashes: Vec<String> = keys.iter().map(StudyKey::hash).collect();
    hashes.sort();
    compute_hash(&format!("selection:{}:{}", hashes.join(","), policy_repr))
}

/// SHA-256 hex digest of a string.
pub fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
