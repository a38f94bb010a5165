//! Checkpoint artifact resolution.
//!
//! Given a selected trial, walk an ordered chain of candidate locations —
//! local disk first, then the run-tracking store — until one yields a
//! hash-verified checkpoint. Every probe that fails is recorded in a
//! diagnostic trail; resolution failures surface that trail in full, since
//! they are the dominant operational failure mode of this subsystem.

pub mod marker;
pub mod tracking;

mod local;

use crate::cache::SelectionCache;
use crate::error::ChampionError;
use crate::keys::{StudyKey, TrialKey};
use crate::trial::TrialRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracking::{
    CHECKPOINT_ARTIFACT, RunInfo, TAG_PARENT_RUN_ID, TAG_STUDY_KEY_HASH, TAG_TRIAL_KEY_HASH,
    TrackingClient, sort_newest_first,
};

/// Where a resolved checkpoint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    LocalDisk,
    RefitRun,
    ParentRun,
}

/// A hash-verified checkpoint location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHandle {
    pub source: CheckpointSource,
    /// Filesystem path for local sources, run id for remote ones.
    pub path_or_run_id: String,
    /// Recorded hash that matched the expected trial key.
    pub verified_hash: String,
    /// Local directory holding the verified checkpoint bytes.
    pub artifact_path: PathBuf,
}

/// The six resolution tiers, attempted strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    LocalHint,
    LocalScan,
    RemoteExact,
    RemoteStudyOnly,
    RemoteParent,
    RemoteAnyRefit,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::LocalHint => "local_hint",
            Tier::LocalScan => "local_scan",
            Tier::RemoteExact => "remote_exact",
            Tier::RemoteStudyOnly => "remote_study_only",
            Tier::RemoteParent => "remote_parent",
            Tier::RemoteAnyRefit => "remote_any_refit",
        }
    }
}

/// Why a probed location was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RejectReason {
    /// The location does not exist.
    Missing,
    /// The location exists but carries no checkpoint artifact.
    NoArtifact,
    /// Nothing at this tier matched the trial's identity.
    NoMatch,
    /// An artifact was found but its recorded hash disagrees.
    HashMismatch { expected: String, actual: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Missing => write!(f, "missing"),
            RejectReason::NoArtifact => write!(f, "no checkpoint artifact"),
            RejectReason::NoMatch => write!(f, "no match"),
            RejectReason::HashMismatch { expected, actual } => {
                write!(f, "hash mismatch (expected {expected}, found {actual})")
            }
        }
    }
}

/// One rejected probe in the resolution trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub tier: Tier,
    pub location: String,
    pub reason: RejectReason,
}

impl TrailEntry {
    pub fn new(tier: Tier, location: impl Into<String>, reason: RejectReason) -> Self {
        Self {
            tier,
            location: location.into(),
            reason,
        }
    }
}

/// Ordered record of every location checked and why it was rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionTrail(Vec<TrailEntry>);

impl ResolutionTrail {
    pub fn push(&mut self, entry: TrailEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[TrailEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of probes rejected on hash verification. Distinguishes "never
    /// found" from "found but mismatched" when resolution exhausts.
    pub fn hash_mismatches(&self) -> usize {
        self.0
            .iter()
            .filter(|e| matches!(e.reason, RejectReason::HashMismatch { .. }))
            .count()
    }

    /// True when some probe at the given tier was recorded.
    pub fn attempted(&self, tier: Tier) -> bool {
        self.0.iter().any(|e| e.tier == tier)
    }
}

impl fmt::Display for ResolutionTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.0 {
            writeln!(
                f,
                "  - [{}] {}: {}",
                entry.tier.name(),
                entry.location,
                entry.reason
            )?;
        }
        Ok(())
    }
}

/// Resolves a trial's checkpoint through the six-tier fallback chain.
pub struct ArtifactResolver {
    output_root: PathBuf,
    experiment: String,
    client: Arc<dyn TrackingClient>,
    cache: Arc<SelectionCache>,
}

impl ArtifactResolver {
    pub fn new(
        output_root: PathBuf,
        experiment: impl Into<String>,
        client: Arc<dyn TrackingClient>,
        cache: Arc<SelectionCache>,
    ) -> Self {
        Self {
            output_root,
            experiment: experiment.into(),
            client,
            cache,
        }
    }

    /// Resolve the checkpoint backing `trial`, consulting the resolution
    /// cache first and populating it on success.
    pub fn resolve(
        &self,
        trial: &TrialRecord,
        expected_study: &StudyKey,
        expected_trial: &TrialKey,
    ) -> Result<CheckpointHandle, ChampionError> {
        let trial_hash = expected_trial.hash();
        if let Some(hit) = self.cache.resolutions.get(&trial_hash) {
            tracing::debug!(trial = %trial_hash, "Resolution cache hit");
            return Ok(hit);
        }
        let handle = self.resolve_uncached(trial, &expected_study.hash(), &trial_hash)?;
        Ok(self.cache.resolutions.insert(trial_hash, handle))
    }

    fn resolve_uncached(
        &self,
        trial: &TrialRecord,
        study_hash: &str,
        trial_hash: &str,
    ) -> Result<CheckpointHandle, ChampionError> {
        let mut trail = ResolutionTrail::default();

        // Tier 1: the trial's own checkpoint hint.
        if let Some(found) = local::probe_hint(trial, study_hash, trial_hash, &mut trail)? {
            return Ok(self.local_handle(found));
        }

        // Tier 2: hash-based scan of the output root.
        if let Some(found) =
            local::scan_output_root(&self.output_root, trial, study_hash, trial_hash, &mut trail)?
        {
            return Ok(self.local_handle(found));
        }

        // Tier 3: refit run with exact study + trial tags.
        if let Some(handle) = self.try_remote_exact(study_hash, trial_hash, &mut trail)? {
            return Ok(handle);
        }

        // Tier 4: study-only tag match for refits predating trial tagging.
        if let Some(handle) = self.try_remote_study_only(trial, study_hash, trial_hash, &mut trail)?
        {
            return Ok(handle);
        }

        // Tier 5: checkpoint attached directly to the parent HPO run.
        if let Some(handle) = self.try_remote_parent(study_hash, trial_hash, &mut trail)? {
            return Ok(handle);
        }

        // Tier 6: any refit run in the experiment, explicitly low-confidence.
        if let Some(handle) = self.try_any_refit(study_hash, trial_hash, &mut trail)? {
            return Ok(handle);
        }

        Err(ChampionError::CheckpointNotFound {
            trial_key_hash: trial_hash.to_string(),
            trail,
        })
    }

    fn local_handle(&self, found: local::ResolvedLocal) -> CheckpointHandle {
        tracing::info!(dir = %found.dir.display(), "Checkpoint resolved on local disk");
        CheckpointHandle {
            source: CheckpointSource::LocalDisk,
            path_or_run_id: found.dir.display().to_string(),
            verified_hash: found.verified_hash,
            artifact_path: found.dir,
        }
    }

    fn try_remote_exact(
        &self,
        study_hash: &str,
        trial_hash: &str,
        trail: &mut ResolutionTrail,
    ) -> Result<Option<CheckpointHandle>, ChampionError> {
        let filter = [
            (TAG_STUDY_KEY_HASH, study_hash),
            (TAG_TRIAL_KEY_HASH, trial_hash),
        ];
        let mut runs = self.client.list_runs(&self.experiment, &filter)?;
        runs.retain(|r| r.could_be_refit());
        sort_newest_first(&mut runs);
        if runs.is_empty() {
            trail.push(TrailEntry::new(
                Tier::RemoteExact,
                format!("experiment '{}' tags {{study, trial}}", self.experiment),
                RejectReason::NoMatch,
            ));
            return Ok(None);
        }
        self.verify_runs(&runs, CheckpointSource::RefitRun, Tier::RemoteExact, study_hash, trial_hash, trail)
    }

    fn try_remote_study_only(
        &self,
        trial: &TrialRecord,
        study_hash: &str,
        trial_hash: &str,
        trail: &mut ResolutionTrail,
    ) -> Result<Option<CheckpointHandle>, ChampionError> {
        let filter = [(TAG_STUDY_KEY_HASH, study_hash)];
        let mut runs = self.client.list_runs(&self.experiment, &filter)?;
        // Runs carrying a trial tag were the exact tier's business: a match
        // was already tried, a different hash is a different trial.
        runs.retain(|r| r.could_be_refit() && r.tag(TAG_TRIAL_KEY_HASH).is_none());
        sort_newest_first(&mut runs);
        // Prefer a refit explicitly linked to this trial's run over an
        // unlinked match.
        if let Some(trial_run_id) = &trial.run_id {
            runs.sort_by_key(|r| {
                let linked = r.tag(TAG_PARENT_RUN_ID) == Some(trial_run_id.as_str())
                    || r.parent_run_id.as_deref() == Some(trial_run_id.as_str());
                !linked
            });
        }
        if runs.is_empty() {
            trail.push(TrailEntry::new(
                Tier::RemoteStudyOnly,
                format!("experiment '{}' tags {{study}}", self.experiment),
                RejectReason::NoMatch,
            ));
            return Ok(None);
        }
        self.verify_runs(&runs, CheckpointSource::RefitRun, Tier::RemoteStudyOnly, study_hash, trial_hash, trail)
    }

    fn try_remote_parent(
        &self,
        study_hash: &str,
        trial_hash: &str,
        trail: &mut ResolutionTrail,
    ) -> Result<Option<CheckpointHandle>, ChampionError> {
        let filter = [(TAG_STUDY_KEY_HASH, study_hash)];
        let mut runs = self.client.list_runs(&self.experiment, &filter)?;
        runs.retain(|r| r.looks_like_parent());
        sort_newest_first(&mut runs);
        if runs.is_empty() {
            trail.push(TrailEntry::new(
                Tier::RemoteParent,
                format!("experiment '{}' parent HPO runs", self.experiment),
                RejectReason::NoMatch,
            ));
            return Ok(None);
        }
        self.verify_runs(&runs, CheckpointSource::ParentRun, Tier::RemoteParent, study_hash, trial_hash, trail)
    }

    fn try_any_refit(
        &self,
        study_hash: &str,
        trial_hash: &str,
        trail: &mut ResolutionTrail,
    ) -> Result<Option<CheckpointHandle>, ChampionError> {
        let mut runs = self.client.list_runs(&self.experiment, &[])?;
        runs.retain(|r| r.could_be_refit() && r.has_checkpoint_artifact());
        // Most recent first; the original behavior left the pick among
        // multiple qualifying runs unspecified.
        sort_newest_first(&mut runs);
        if runs.is_empty() {
            trail.push(TrailEntry::new(
                Tier::RemoteAnyRefit,
                format!("experiment '{}' any refit run", self.experiment),
                RejectReason::NoMatch,
            ));
            return Ok(None);
        }
        tracing::warn!(
            experiment = %self.experiment,
            candidates = runs.len(),
            "Falling back to any refit run in the experiment (low confidence)"
        );
        let handle = self.verify_runs(
            &runs,
            CheckpointSource::RefitRun,
            Tier::RemoteAnyRefit,
            study_hash,
            trial_hash,
            trail,
        )?;
        if let Some(h) = &handle {
            tracing::warn!(run_id = %h.path_or_run_id, "Low-confidence fallback accepted");
        }
        Ok(handle)
    }

    /// Try candidate runs in order: download the checkpoint artifact and
    /// verify hash continuity. Rejections land in the trail; the first run
    /// that verifies wins.
    fn verify_runs(
        &self,
        runs: &[RunInfo],
        source: CheckpointSource,
        tier: Tier,
        study_hash: &str,
        trial_hash: &str,
        trail: &mut ResolutionTrail,
    ) -> Result<Option<CheckpointHandle>, ChampionError> {
        for run in runs {
            if !run.has_checkpoint_artifact() {
                trail.push(TrailEntry::new(
                    tier,
                    format!("run {}", run.run_id),
                    RejectReason::NoArtifact,
                ));
                continue;
            }
            let dest = self.output_root.join(local::DOWNLOADS_DIR).join(&run.run_id);
            std::fs::create_dir_all(&dest)?;
            let downloaded = self
                .client
                .download_artifact(&run.run_id, CHECKPOINT_ARTIFACT, &dest)?;
            match marker::verify_dir(&downloaded, study_hash, trial_hash)? {
                Ok(verified_hash) => {
                    tracing::info!(
                        run_id = %run.run_id,
                        tier = tier.name(),
                        "Checkpoint resolved from tracking store"
                    );
                    return Ok(Some(CheckpointHandle {
                        source,
                        path_or_run_id: run.run_id.clone(),
                        verified_hash,
                        artifact_path: downloaded,
                    }));
                }
                Err(reason) => {
                    tracing::debug!(run_id = %run.run_id, tier = tier.name(), %reason, "Rejected");
                    trail.push(TrailEntry::new(tier, format!("run {}", run.run_id), reason));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trail_counts_hash_mismatches() {
        let mut trail = ResolutionTrail::default();
        trail.push(TrailEntry::new(Tier::LocalHint, "hint", RejectReason::Missing));
        trail.push(TrailEntry::new(
            Tier::LocalScan,
            "dir",
            RejectReason::HashMismatch {
                expected: "aaa".into(),
                actual: "bbb".into(),
            },
        ));
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.hash_mismatches(), 1);
        assert!(trail.attempted(Tier::LocalHint));
        assert!(!trail.attempted(Tier::RemoteExact));
    }

    #[test]
    fn test_trail_display_lists_every_probe() {
        let mut trail = ResolutionTrail::default();
        trail.push(TrailEntry::new(Tier::LocalHint, "hint", RejectReason::Missing));
        trail.push(TrailEntry::new(Tier::RemoteExact, "run r1", RejectReason::NoArtifact));
        let rendered = trail.to_string();
        assert!(rendered.contains("[local_hint] hint: missing"));
        assert!(rendered.contains("[remote_exact] run r1: no checkpoint artifact"));
    }
}
