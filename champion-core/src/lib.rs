//! # champion-core — HPO champion selection & checkpoint resolution
//!
//! This crate picks the best model configuration out of a set of
//! hyperparameter-optimization studies and locates the physical checkpoint
//! artifact backing that pick, even when the artifact is not co-located with
//! the trial that produced it.
//!
//! Two entry points cover everything the rest of the system needs:
//! 1. **Selection** — per-backbone best trials reduced to one champion under
//!    an accuracy-floor / fastest-eligible / gain-guard policy.
//! 2. **Resolution** — a six-tier fallback search (local disk, then the
//!    run-tracking store) guarded by content-derived hashes, so a mismatched
//!    artifact is never silently accepted.
//!
//! Both are memoized through [`cache::SelectionCache`]; invalidation is
//! explicit and caller-triggered.

// Foundation
pub mod config;
pub mod error;

// Identity & data model
pub mod keys;
pub mod trial;

// Selection
pub mod selection;
pub mod speed;

// Resolution
pub mod cache;
pub mod resolve;

// Re-exports
pub use cache::SelectionCache;
pub use config::ChampionConfig;
pub use error::ChampionError;
pub use keys::{StudyKey, TrialKey};
pub use resolve::tracking::TrackingClient;
pub use resolve::{ArtifactResolver, CheckpointHandle, CheckpointSource};
pub use selection::{SelectionEngine, SelectionPolicy, SelectionResult};
pub use speed::SpeedScoreProvider;
pub use trial::{BenchmarkSample, Study, TrialRecord};

use std::sync::Arc;

/// Facade wiring the selection engine, artifact resolver and caches.
///
/// External collaborators (benchmarking, deployment conversion, reporting)
/// only ever need [`select_best_configuration`](Self::select_best_configuration)
/// and [`resolve_checkpoint`](Self::resolve_checkpoint).
pub struct ChampionSelect {
    engine: SelectionEngine,
    resolver: ArtifactResolver,
    cache: Arc<SelectionCache>,
    policy: SelectionPolicy,
}

impl ChampionSelect {
    pub fn new(config: ChampionConfig, client: Arc<dyn TrackingClient>) -> Self {
        let cache = Arc::new(SelectionCache::new());
        let engine = SelectionEngine::new(SpeedScoreProvider::new(config.speed_proxy));
        let resolver = ArtifactResolver::new(
            config.output_root,
            config.experiment,
            client,
            Arc::clone(&cache),
        );
        Self {
            engine,
            resolver,
            cache,
            policy: config.policy,
        }
    }

    /// Select the champion configuration among the given studies under the
    /// configured policy, memoized by study-set fingerprint.
    pub fn select_best_configuration(
        &self,
        studies: &[Study],
    ) -> Result<SelectionResult, ChampionError> {
        self.select_with_policy(studies, &self.policy)
    }

    /// Same as [`select_best_configuration`](Self::select_best_configuration)
    /// with an explicit policy.
    pub fn select_with_policy(
        &self,
        studies: &[Study],
        policy: &SelectionPolicy,
    ) -> Result<SelectionResult, ChampionError> {
        let fingerprint = self.selection_fingerprint(studies, policy);
        self.cache
            .selections
            .get_or_try_insert_with(&fingerprint, || self.engine.select(studies, policy))
    }

    /// Resolve the checkpoint backing `trial`, expecting the keys derived
    /// from the trial's own study identity.
    pub fn resolve_checkpoint(
        &self,
        trial: &TrialRecord,
    ) -> Result<CheckpointHandle, ChampionError> {
        self.resolver
            .resolve(trial, &trial.study_key, &trial.trial_key())
    }

    /// Resolve against explicitly supplied expected keys.
    pub fn resolve_checkpoint_as(
        &self,
        trial: &TrialRecord,
        expected_study: &StudyKey,
        expected_trial: &TrialKey,
    ) -> Result<CheckpointHandle, ChampionError> {
        self.resolver.resolve(trial, expected_study, expected_trial)
    }

    /// Drop the cached selection for this study set, e.g. after a new trial
    /// completed in one of them.
    pub fn invalidate_selection(&self, studies: &[Study]) -> bool {
        let fingerprint = self.selection_fingerprint(studies, &self.policy);
        self.cache.selections.invalidate(&fingerprint)
    }

    /// Drop the cached resolution for one trial.
    pub fn invalidate_resolution(&self, trial: &TrialRecord) -> bool {
        self.cache.resolutions.invalidate(&trial.trial_key().hash())
    }

    pub fn clear_caches(&self) {
        self.cache.clear();
    }

    fn selection_fingerprint(&self, studies: &[Study], policy: &SelectionPolicy) -> String {
        let study_keys: Vec<StudyKey> = studies.iter().map(|s| s.key.clone()).collect();
        keys::study_set_fingerprint(&study_keys, &policy.fingerprint_repr())
    }
}
