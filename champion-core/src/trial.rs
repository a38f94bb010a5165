//! Trial and study records — the immutable data model of a finished sweep.

use crate::keys::{StudyKey, TrialKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A measured inference benchmark attached to a trial.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BenchmarkSample {
    /// Median request latency in milliseconds.
    pub latency_ms: Option<f64>,
    /// Requests per second.
    pub throughput_rps: Option<f64>,
}

impl BenchmarkSample {
    /// True when the sample carries at least one usable measurement.
    pub fn is_usable(&self) -> bool {
        self.latency_ms.is_some() || self.throughput_rps.is_some()
    }
}

/// One completed trial within a study. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_number: usize,
    pub study_key: StudyKey,
    /// Objective metrics keyed by name; accuracy values lie in [0, 1].
    pub metrics: HashMap<String, f64>,
    pub param_count: u64,
    pub benchmark: Option<BenchmarkSample>,
    /// Path or URI where the producing run believes its checkpoint lives.
    pub checkpoint_hint: Option<String>,
    /// Id of the trial run in the tracking store, when known.
    pub run_id: Option<String>,
}

impl TrialRecord {
    pub fn new(study_key: StudyKey, trial_number: usize) -> Self {
        Self {
            trial_number,
            study_key,
            metrics: HashMap::new(),
            param_count: 0,
            benchmark: None,
            checkpoint_hint: None,
            run_id: None,
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.metric("accuracy")
    }

    pub fn trial_key(&self) -> TrialKey {
        TrialKey::new(&self.study_key, self.trial_number)
    }

    pub fn backbone(&self) -> &str {
        &self.study_key.backbone
    }
}

/// All trials for one backbone under one search-space/execution fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub key: StudyKey,
    pub trials: Vec<TrialRecord>,
}

impl Study {
    pub fn new(key: StudyKey) -> Self {
        Self {
            key,
            trials: Vec::new(),
        }
    }

    pub fn add_trial(&mut self, trial: TrialRecord) {
        self.trials.push(trial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_metric_lookup() {
        let key = StudyKey::new("distilbert", "fp-a", "fp-b");
        let mut trial = TrialRecord::new(key, 3);
        trial.metrics.insert("accuracy".into(), 0.91);
        assert_eq!(trial.accuracy(), Some(0.91));
        assert_eq!(trial.metric("f1"), None);
    }

    #[test]
    fn test_benchmark_usability() {
        assert!(!BenchmarkSample::default().is_usable());
        let sample = BenchmarkSample {
            latency_ms: Some(12.5),
            throughput_rps: None,
        };
        assert!(sample.is_usable());
    }
}
