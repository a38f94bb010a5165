//! Speed scoring — measured benchmarks first, static proxy table as fallback.
//!
//! Scores are positive floats where lower means faster. The proxy table is
//! explicitly constructed and immutable; it is never ambient global state.

use crate::error::ChampionError;
use crate::trial::TrialRecord;
use std::collections::HashMap;

/// Yields a speed score for a trial from its benchmark, or from a static
/// backbone → score proxy table when no benchmark was measured.
#[derive(Debug, Clone)]
pub struct SpeedScoreProvider {
    proxy: HashMap<String, f64>,
}

impl SpeedScoreProvider {
    /// Build a provider around a proxy table. Backbone keys are lowercased
    /// so lookups match `StudyKey` normalization.
    pub fn new(proxy: HashMap<String, f64>) -> Self {
        let proxy = proxy
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self { proxy }
    }

    /// Speed score for one trial, lower is faster.
    ///
    /// A usable benchmark always wins over the proxy table: latency when
    /// measured, else inverse throughput. Without either, an absent proxy
    /// entry is an error — silently defaulting would corrupt the ranking.
    pub fn score_for(&self, trial: &TrialRecord) -> Result<f64, ChampionError> {
        if let Some(benchmark) = &trial.benchmark {
            if let Some(latency) = benchmark.latency_ms {
                return Ok(latency);
            }
            if let Some(throughput) = benchmark.throughput_rps
                && throughput > 0.0
            {
                return Ok(1000.0 / throughput);
            }
        }
        self.proxy
            .get(trial.backbone())
            .copied()
            .ok_or_else(|| ChampionError::UnknownBackbone(trial.backbone().to_string()))
    }

    /// True when a score can be derived for the trial at all.
    pub fn can_score(&self, trial: &TrialRecord) -> bool {
        trial.benchmark.as_ref().is_some_and(|b| b.is_usable())
            || self.proxy.contains_key(trial.backbone())
    }
}

/// Normalize scores relative to the fastest candidate in the set.
///
/// Every score is divided by the set minimum, so the fastest candidate
/// normalizes to exactly 1.0 and slower candidates to proportionally larger
/// values. A single score trivially normalizes to 1.0.
pub fn normalize(scores: &[f64]) -> Result<Vec<f64>, ChampionError> {
    if scores.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite() || **s <= 0.0) {
        return Err(ChampionError::invalid_input(format!(
            "speed scores must be finite and positive, got {bad}"
        )));
    }
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    Ok(scores.iter().map(|s| s / min).collect())
}
