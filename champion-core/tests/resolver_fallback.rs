//! Integration tests for the six-tier checkpoint resolution chain.
//!
//! These exercise the resolver end-to-end against a local output root and an
//! in-memory tracking-store fake, verifying tier ordering, hash-mismatch
//! rejection, and resolution-cache idempotence.

use champion_core::error::ChampionError;
use champion_core::resolve::marker::CheckpointMarker;
use champion_core::resolve::tracking::{
    RunInfo, TAG_PARENT_RUN_ID, TAG_RUN_KIND, TAG_STUDY_KEY_HASH, TAG_TRIAL_KEY_HASH,
    TrackingClient,
};
use champion_core::resolve::{ArtifactResolver, CheckpointSource};
use champion_core::{SelectionCache, StudyKey, TrialRecord};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-memory tracking store: a fixed run list plus one marker per run that
/// gets materialized on download. Counts calls so tests can assert the
/// remote store was or was not consulted.
#[derive(Default)]
struct InMemoryTracking {
    runs: Vec<RunInfo>,
    markers: HashMap<String, CheckpointMarker>,
    list_calls: AtomicUsize,
    download_calls: AtomicUsize,
    list_filters: Mutex<Vec<Vec<(String, String)>>>,
}

impl InMemoryTracking {
    fn add_run(&mut self, run: RunInfo, marker: Option<CheckpointMarker>) {
        if let Some(marker) = marker {
            self.markers.insert(run.run_id.clone(), marker);
        }
        self.runs.push(run);
    }
}

impl TrackingClient for InMemoryTracking {
    fn list_runs(
        &self,
        _experiment: &str,
        tag_filter: &[(&str, &str)],
    ) -> Result<Vec<RunInfo>, ChampionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_filters.lock().unwrap().push(
            tag_filter
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        Ok(self
            .runs
            .iter()
            .filter(|run| {
                tag_filter
                    .iter()
                    .all(|(key, value)| run.tags.get(*key).map(String::as_str) == Some(*value))
            })
            .cloned()
            .collect())
    }

    fn download_artifact(
        &self,
        run_id: &str,
        artifact_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, ChampionError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let marker = self
            .markers
            .get(run_id)
            .ok_or_else(|| ChampionError::tracking(format!("run {run_id} has no artifacts")))?;
        let dir = dest_dir.join(artifact_path);
        marker.write(&dir)?;
        Ok(dir)
    }
}

fn trial() -> TrialRecord {
    let mut t = TrialRecord::new(StudyKey::new("distilbert", "fp-search", "fp-exec"), 3);
    t.metrics.insert("accuracy".into(), 0.91);
    t
}

fn valid_marker(t: &TrialRecord) -> CheckpointMarker {
    CheckpointMarker::new(
        &t.study_key.hash(),
        &t.trial_key().hash(),
        t.backbone(),
        t.trial_number,
    )
}

fn corrupt_marker(t: &TrialRecord) -> CheckpointMarker {
    CheckpointMarker::new(
        &t.study_key.hash(),
        "deadbeef-corrupted",
        t.backbone(),
        t.trial_number,
    )
}

fn run(id: &str, tags: &[(&str, &str)], with_artifact: bool, day: u32) -> RunInfo {
    RunInfo {
        run_id: id.to_string(),
        parent_run_id: None,
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        artifacts: if with_artifact {
            vec!["checkpoint/model.bin".to_string()]
        } else {
            Vec::new()
        },
        end_time: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
    }
}

fn resolver(root: &Path, client: Arc<dyn TrackingClient>) -> (ArtifactResolver, Arc<SelectionCache>) {
    let cache = Arc::new(SelectionCache::new());
    (
        ArtifactResolver::new(root.to_path_buf(), "hpo", client, Arc::clone(&cache)),
        cache,
    )
}

#[test]
fn local_hint_short_circuits_before_remote() {
    let root = TempDir::new().unwrap();
    let mut t = trial();
    let dir = root.path().join("hinted-checkpoint");
    valid_marker(&t).write(&dir).unwrap();
    t.checkpoint_hint = Some(dir.display().to_string());

    let client = Arc::new(InMemoryTracking::default());
    let (resolver, _) = resolver(root.path(), client.clone());
    let handle = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();

    assert_eq!(handle.source, CheckpointSource::LocalDisk);
    assert_eq!(handle.verified_hash, t.trial_key().hash());
    assert_eq!(client.list_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn refit_run_with_exact_tags_resolves_at_tier_three() {
    let root = TempDir::new().unwrap();
    let t = trial();
    let study_hash = t.study_key.hash();
    let trial_hash = t.trial_key().hash();

    let mut client = InMemoryTracking::default();
    client.add_run(
        run(
            "refit-1",
            &[
                (TAG_RUN_KIND, "refit"),
                (TAG_STUDY_KEY_HASH, &study_hash),
                (TAG_TRIAL_KEY_HASH, &trial_hash),
            ],
            true,
            10,
        ),
        Some(valid_marker(&t)),
    );
    let client = Arc::new(client);
    let (resolver, _) = resolver(root.path(), client.clone());
    let handle = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();

    assert_eq!(handle.source, CheckpointSource::RefitRun);
    assert_eq!(handle.path_or_run_id, "refit-1");
    assert_eq!(handle.verified_hash, trial_hash);
    assert!(handle.artifact_path.join("checkpoint.json").exists());
    // The first store query is the exact-tag filter: local tiers ran (and
    // were rejected) without touching the client.
    let filters = client.list_filters.lock().unwrap();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].len(), 2);
}

#[test]
fn corrupted_exact_match_falls_through_to_study_only() {
    let root = TempDir::new().unwrap();
    let t = trial();
    let study_hash = t.study_key.hash();
    let trial_hash = t.trial_key().hash();

    let mut client = InMemoryTracking::default();
    client.add_run(
        run(
            "refit-corrupt",
            &[
                (TAG_RUN_KIND, "refit"),
                (TAG_STUDY_KEY_HASH, &study_hash),
                (TAG_TRIAL_KEY_HASH, &trial_hash),
            ],
            true,
            10,
        ),
        Some(corrupt_marker(&t)),
    );
    // Legacy refit, study tag only: the trial-tagged corrupt run must not win.
    client.add_run(
        run(
            "refit-legacy",
            &[(TAG_RUN_KIND, "refit"), (TAG_STUDY_KEY_HASH, &study_hash)],
            true,
            5,
        ),
        Some(valid_marker(&t)),
    );
    let client = Arc::new(client);
    let (resolver, _) = resolver(root.path(), client);
    let handle = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();

    assert_eq!(handle.source, CheckpointSource::RefitRun);
    assert_eq!(handle.path_or_run_id, "refit-legacy");
}

#[test]
fn study_only_tier_prefers_run_linked_to_trial() {
    let root = TempDir::new().unwrap();
    let mut t = trial();
    t.run_id = Some("trial-run-7".to_string());
    let study_hash = t.study_key.hash();

    let mut client = InMemoryTracking::default();
    // Newer but unlinked.
    client.add_run(
        run(
            "refit-unlinked",
            &[(TAG_RUN_KIND, "refit"), (TAG_STUDY_KEY_HASH, &study_hash)],
            true,
            20,
        ),
        Some(valid_marker(&t)),
    );
    // Older but explicitly linked to the trial run.
    client.add_run(
        run(
            "refit-linked",
            &[
                (TAG_RUN_KIND, "refit"),
                (TAG_STUDY_KEY_HASH, &study_hash),
                (TAG_PARENT_RUN_ID, "trial-run-7"),
            ],
            true,
            2,
        ),
        Some(valid_marker(&t)),
    );
    let client = Arc::new(client);
    let (resolver, _) = resolver(root.path(), client);
    let handle = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();

    assert_eq!(handle.path_or_run_id, "refit-linked");
}

#[test]
fn parent_run_checkpoint_resolves_at_tier_five() {
    let root = TempDir::new().unwrap();
    let t = trial();
    let study_hash = t.study_key.hash();

    let mut client = InMemoryTracking::default();
    client.add_run(
        run(
            "hpo-parent",
            &[(TAG_RUN_KIND, "hpo"), (TAG_STUDY_KEY_HASH, &study_hash)],
            true,
            1,
        ),
        Some(valid_marker(&t)),
    );
    let client = Arc::new(client);
    let (resolver, _) = resolver(root.path(), client);
    let handle = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();

    assert_eq!(handle.source, CheckpointSource::ParentRun);
    assert_eq!(handle.path_or_run_id, "hpo-parent");
}

#[test]
fn last_resort_accepts_untagged_refit_most_recent_first() {
    let root = TempDir::new().unwrap();
    let t = trial();

    let mut client = InMemoryTracking::default();
    // No study/trial tags anywhere: only the last-resort tier can see these.
    client.add_run(run("refit-old", &[], true, 1), Some(valid_marker(&t)));
    client.add_run(run("refit-new", &[], true, 25), Some(valid_marker(&t)));
    let client = Arc::new(client);
    let (resolver, _) = resolver(root.path(), client);
    let handle = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();

    assert_eq!(handle.source, CheckpointSource::RefitRun);
    assert_eq!(handle.path_or_run_id, "refit-new");
}

#[test]
fn exhausted_chain_reports_mismatches_in_trail() {
    let root = TempDir::new().unwrap();
    let t = trial();
    let study_hash = t.study_key.hash();
    let trial_hash = t.trial_key().hash();

    // Local candidate with a corrupted hash.
    let local_dir = root.path().join(trial_hash.clone());
    corrupt_marker(&t).write(&local_dir).unwrap();

    let mut client = InMemoryTracking::default();
    client.add_run(
        run(
            "refit-corrupt",
            &[
                (TAG_RUN_KIND, "refit"),
                (TAG_STUDY_KEY_HASH, &study_hash),
                (TAG_TRIAL_KEY_HASH, &trial_hash),
            ],
            true,
            3,
        ),
        Some(corrupt_marker(&t)),
    );
    let client = Arc::new(client);
    let (resolver, _) = resolver(root.path(), client);
    let err = resolver
        .resolve(&t, &t.study_key, &t.trial_key())
        .unwrap_err();

    match err {
        ChampionError::CheckpointNotFound { trail, .. } => {
            assert!(trail.hash_mismatches() >= 2);
            let message = trail.to_string();
            assert!(message.contains("hash mismatch"));
        }
        other => panic!("expected CheckpointNotFound, got {other}"),
    }
}

#[test]
fn never_found_is_distinguished_from_mismatched() {
    let root = TempDir::new().unwrap();
    let t = trial();
    let client = Arc::new(InMemoryTracking::default());
    let (resolver, _) = resolver(root.path(), client);
    let err = resolver
        .resolve(&t, &t.study_key, &t.trial_key())
        .unwrap_err();

    match &err {
        ChampionError::CheckpointNotFound { trail, .. } => {
            assert_eq!(trail.hash_mismatches(), 0);
            // One rejection per attempted tier.
            assert_eq!(trail.len(), 6);
        }
        other => panic!("expected CheckpointNotFound, got {other}"),
    }
    assert!(err.to_string().contains("no candidate artifact found"));
}

#[test]
fn second_resolution_hits_cache_without_remote_calls() {
    let root = TempDir::new().unwrap();
    let t = trial();
    let study_hash = t.study_key.hash();
    let trial_hash = t.trial_key().hash();

    let mut client = InMemoryTracking::default();
    client.add_run(
        run(
            "refit-1",
            &[
                (TAG_RUN_KIND, "refit"),
                (TAG_STUDY_KEY_HASH, &study_hash),
                (TAG_TRIAL_KEY_HASH, &trial_hash),
            ],
            true,
            10,
        ),
        Some(valid_marker(&t)),
    );
    let client = Arc::new(client);
    let (resolver, cache) = resolver(root.path(), client.clone());

    let first = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();
    let lists_after_first = client.list_calls.load(Ordering::SeqCst);
    let downloads_after_first = client.download_calls.load(Ordering::SeqCst);

    let second = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();
    assert_eq!(first, second);
    assert_eq!(client.list_calls.load(Ordering::SeqCst), lists_after_first);
    assert_eq!(
        client.download_calls.load(Ordering::SeqCst),
        downloads_after_first
    );

    // Explicit invalidation forces a fresh search.
    assert!(cache.resolutions.invalidate(&trial_hash));
    let third = resolver.resolve(&t, &t.study_key, &t.trial_key()).unwrap();
    assert_eq!(first, third);
    assert!(client.list_calls.load(Ordering::SeqCst) > lists_after_first);
}
