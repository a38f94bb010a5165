//! Local-disk resolution tiers: the trial's own checkpoint hint and the
//! hash-based scan of the configured output root.

use crate::error::ChampionError;
use crate::resolve::marker;
use crate::resolve::{RejectReason, ResolutionTrail, Tier, TrailEntry};
use crate::trial::TrialRecord;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory under the output root reserved for remote downloads; never a
/// checkpoint location of its own.
pub(crate) const DOWNLOADS_DIR: &str = "_downloads";

/// Shortest directory-name prefix of a trial hash accepted by the v2 scan.
const MIN_HASH_PREFIX: usize = 12;

pub(crate) struct ResolvedLocal {
    pub dir: PathBuf,
    pub verified_hash: String,
}

/// Tier 1: the trial's recorded checkpoint hint, when it is a filesystem
/// path, verified in place.
pub(crate) fn probe_hint(
    trial: &TrialRecord,
    expected_study_hash: &str,
    expected_trial_hash: &str,
    trail: &mut ResolutionTrail,
) -> Result<Option<ResolvedLocal>, ChampionError> {
    let Some(hint) = &trial.checkpoint_hint else {
        trail.push(TrailEntry::new(
            Tier::LocalHint,
            "checkpoint_hint",
            RejectReason::Missing,
        ));
        return Ok(None);
    };
    if hint.contains("://") {
        // A URI hint is not locally probeable; later tiers handle the store.
        trail.push(TrailEntry::new(Tier::LocalHint, hint, RejectReason::NoMatch));
        return Ok(None);
    }
    verify_candidate(
        Tier::LocalHint,
        Path::new(hint),
        expected_study_hash,
        expected_trial_hash,
        trail,
    )
}

/// Tier 2: scan the output root for directories whose name encodes the trial
/// identity. Supports the v2 layout (`<root>/<trial_key_hash>/`, full hash or
/// a prefix of at least 12 characters) and the legacy layout
/// (`<root>/<backbone>/trial-<n>/`) kept for artifacts produced before
/// hash-named folders.
pub(crate) fn scan_output_root(
    output_root: &Path,
    trial: &TrialRecord,
    expected_study_hash: &str,
    expected_trial_hash: &str,
    trail: &mut ResolutionTrail,
) -> Result<Option<ResolvedLocal>, ChampionError> {
    if !output_root.is_dir() {
        trail.push(TrailEntry::new(
            Tier::LocalScan,
            output_root.display().to_string(),
            RejectReason::Missing,
        ));
        return Ok(None);
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(output_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name == DOWNLOADS_DIR {
            continue;
        }
        if name.as_ref() == expected_trial_hash
            || (name.len() >= MIN_HASH_PREFIX && expected_trial_hash.starts_with(name.as_ref()))
        {
            candidates.push(entry.into_path());
        }
    }
    // Full-hash matches are probed before prefix matches.
    candidates.sort_by_key(|p| std::cmp::Reverse(p.file_name().map(|n| n.len()).unwrap_or(0)));

    let legacy = output_root
        .join(trial.backbone())
        .join(format!("trial-{}", trial.trial_number));
    if legacy.is_dir() {
        candidates.push(legacy);
    }

    if candidates.is_empty() {
        trail.push(TrailEntry::new(
            Tier::LocalScan,
            format!("{}/{{{expected_trial_hash}}}", output_root.display()),
            RejectReason::NoMatch,
        ));
        return Ok(None);
    }

    for candidate in candidates {
        if let Some(resolved) = verify_candidate(
            Tier::LocalScan,
            &candidate,
            expected_study_hash,
            expected_trial_hash,
            trail,
        )? {
            return Ok(Some(resolved));
        }
    }
    Ok(None)
}

fn verify_candidate(
    tier: Tier,
    dir: &Path,
    expected_study_hash: &str,
    expected_trial_hash: &str,
    trail: &mut ResolutionTrail,
) -> Result<Option<ResolvedLocal>, ChampionError> {
    match marker::verify_dir(dir, expected_study_hash, expected_trial_hash)? {
        Ok(verified_hash) => Ok(Some(ResolvedLocal {
            dir: dir.to_path_buf(),
            verified_hash,
        })),
        Err(reason) => {
            tracing::debug!(tier = tier.name(), dir = %dir.display(), %reason, "Rejected");
            trail.push(TrailEntry::new(tier, dir.display().to_string(), reason));
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StudyKey;
    use crate::resolve::marker::CheckpointMarker;
    use tempfile::TempDir;

    fn trial() -> TrialRecord {
        TrialRecord::new(StudyKey::new("distilbert", "fp-a", "fp-b"), 3)
    }

    fn write_valid_marker(dir: &Path, t: &TrialRecord) {
        CheckpointMarker::new(
            &t.study_key.hash(),
            &t.trial_key().hash(),
            t.backbone(),
            t.trial_number,
        )
        .write(dir)
        .unwrap();
    }

    #[test]
    fn test_hint_missing_is_trailed() {
        let t = trial();
        let mut trail = ResolutionTrail::default();
        let out = probe_hint(&t, &t.study_key.hash(), &t.trial_key().hash(), &mut trail).unwrap();
        assert!(out.is_none());
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn test_uri_hint_is_skipped_locally() {
        let mut t = trial();
        t.checkpoint_hint = Some("s3://bucket/run/checkpoint".to_string());
        let mut trail = ResolutionTrail::default();
        let out = probe_hint(&t, &t.study_key.hash(), &t.trial_key().hash(), &mut trail).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_valid_hint_resolves() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        let mut t = trial();
        write_valid_marker(&dir, &t);
        t.checkpoint_hint = Some(dir.display().to_string());

        let mut trail = ResolutionTrail::default();
        let out = probe_hint(&t, &t.study_key.hash(), &t.trial_key().hash(), &mut trail)
            .unwrap()
            .unwrap();
        assert_eq!(out.verified_hash, t.trial_key().hash());
        assert!(trail.is_empty());
    }

    #[test]
    fn test_scan_finds_v2_full_hash_dir() {
        let tmp = TempDir::new().unwrap();
        let t = trial();
        let dir = tmp.path().join(t.trial_key().hash());
        write_valid_marker(&dir, &t);

        let mut trail = ResolutionTrail::default();
        let out = scan_output_root(
            tmp.path(),
            &t,
            &t.study_key.hash(),
            &t.trial_key().hash(),
            &mut trail,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.dir, dir);
    }

    #[test]
    fn test_scan_finds_v2_prefix_dir() {
        let tmp = TempDir::new().unwrap();
        let t = trial();
        let prefix: String = t.trial_key().hash().chars().take(16).collect();
        let dir = tmp.path().join(prefix);
        write_valid_marker(&dir, &t);

        let mut trail = ResolutionTrail::default();
        let out = scan_output_root(
            tmp.path(),
            &t,
            &t.study_key.hash(),
            &t.trial_key().hash(),
            &mut trail,
        )
        .unwrap();
        assert!(out.is_some());
    }

    #[test]
    fn test_scan_rejects_short_prefix() {
        let tmp = TempDir::new().unwrap();
        let t = trial();
        let prefix: String = t.trial_key().hash().chars().take(6).collect();
        std::fs::create_dir_all(tmp.path().join(prefix)).unwrap();

        let mut trail = ResolutionTrail::default();
        let out = scan_output_root(
            tmp.path(),
            &t,
            &t.study_key.hash(),
            &t.trial_key().hash(),
            &mut trail,
        )
        .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_scan_finds_legacy_layout() {
        let tmp = TempDir::new().unwrap();
        let t = trial();
        let dir = tmp.path().join("distilbert").join("trial-3");
        write_valid_marker(&dir, &t);

        let mut trail = ResolutionTrail::default();
        let out = scan_output_root(
            tmp.path(),
            &t,
            &t.study_key.hash(),
            &t.trial_key().hash(),
            &mut trail,
        )
        .unwrap();
        assert_eq!(out.unwrap().dir, dir);
    }

    #[test]
    fn test_scan_rejects_corrupted_hash_and_trails_it() {
        let tmp = TempDir::new().unwrap();
        let t = trial();
        let dir = tmp.path().join(t.trial_key().hash());
        CheckpointMarker::new(&t.study_key.hash(), "corrupted", t.backbone(), t.trial_number)
            .write(&dir)
            .unwrap();

        let mut trail = ResolutionTrail::default();
        let out = scan_output_root(
            tmp.path(),
            &t,
            &t.study_key.hash(),
            &t.trial_key().hash(),
            &mut trail,
        )
        .unwrap();
        assert!(out.is_none());
        assert_eq!(trail.hash_mismatches(), 1);
    }
}
