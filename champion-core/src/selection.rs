//! Champion selection — accuracy-floor filtering, fastest-eligible pick,
//! and the conservative accuracy-gain guard.

use crate::error::ChampionError;
use crate::speed::{self, SpeedScoreProvider};
use crate::trial::{Study, TrialRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accuracy/speed tradeoff policy for cross-study selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Metric maximized within each study.
    #[serde(default = "default_objective_metric")]
    pub objective_metric: String,
    /// Accuracy floor, absolute or relative to the best candidate.
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f64,
    /// When true the floor is `best_accuracy * accuracy_threshold`.
    #[serde(default = "default_true")]
    pub use_relative_threshold: bool,
    /// Minimum accuracy gain that justifies rejecting the fastest eligible
    /// candidate in favor of the most accurate one.
    #[serde(default = "default_min_accuracy_gain")]
    pub min_accuracy_gain: f64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            objective_metric: default_objective_metric(),
            accuracy_threshold: default_accuracy_threshold(),
            use_relative_threshold: true,
            min_accuracy_gain: default_min_accuracy_gain(),
        }
    }
}

fn default_objective_metric() -> String {
    "accuracy".to_string()
}

fn default_accuracy_threshold() -> f64 {
    0.95
}

fn default_true() -> bool {
    true
}

fn default_min_accuracy_gain() -> f64 {
    0.01
}

impl SelectionPolicy {
    /// Deterministic textual form used in cache fingerprints.
    pub fn fingerprint_repr(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.objective_metric,
            self.accuracy_threshold,
            self.use_relative_threshold,
            self.min_accuracy_gain
        )
    }
}

/// One candidate as it entered the cross-study comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsideredCandidate {
    pub backbone: String,
    pub trial: TrialRecord,
    pub accuracy: f64,
    pub speed_score: f64,
    pub eligible: bool,
}

/// Outcome of one selection call. Immutable; cached by study-set fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub winning_trial: TrialRecord,
    pub accuracy: f64,
    pub speed_score: f64,
    pub normalized_speed: f64,
    pub threshold_applied: f64,
    /// Every scoreable candidate, in backbone order, for audit trails.
    pub candidates_considered: Vec<ConsideredCandidate>,
}

/// Stateless selection over per-backbone studies.
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    speed: SpeedScoreProvider,
}

impl SelectionEngine {
    pub fn new(speed: SpeedScoreProvider) -> Self {
        Self { speed }
    }

    /// Best trial within one study: maximal objective metric, ties broken by
    /// the lowest trial number so reruns are reproducible.
    pub fn best_trial_for_study<'a>(
        &self,
        trials: &'a [TrialRecord],
        objective_metric: &str,
    ) -> Result<&'a TrialRecord, ChampionError> {
        if trials.is_empty() {
            return Err(ChampionError::invalid_input("study has no trials"));
        }
        let mut best: Option<(&TrialRecord, f64)> = None;
        for trial in trials {
            let Some(value) = trial.metric(objective_metric) else {
                continue;
            };
            best = match best {
                None => Some((trial, value)),
                Some((cur, cur_value)) => {
                    if value > cur_value
                        || (value == cur_value && trial.trial_number < cur.trial_number)
                    {
                        Some((trial, value))
                    } else {
                        Some((cur, cur_value))
                    }
                }
            };
        }
        best.map(|(trial, _)| trial).ok_or_else(|| {
            ChampionError::invalid_input(format!(
                "no trial in study carries metric '{objective_metric}'"
            ))
        })
    }

    /// Reduce studies to their per-backbone best trial, then pick the overall
    /// champion under the policy.
    pub fn select(
        &self,
        studies: &[Study],
        policy: &SelectionPolicy,
    ) -> Result<SelectionResult, ChampionError> {
        if studies.is_empty() {
            return Err(ChampionError::invalid_input("no studies supplied"));
        }
        let mut per_backbone: BTreeMap<String, TrialRecord> = BTreeMap::new();
        for study in studies {
            let best = self
                .best_trial_for_study(&study.trials, &policy.objective_metric)?
                .clone();
            match per_backbone.get(&study.key.backbone) {
                Some(existing) => {
                    let held = existing.metric(&policy.objective_metric).unwrap_or(0.0);
                    let new = best.metric(&policy.objective_metric).unwrap_or(0.0);
                    if new > held || (new == held && best.trial_number < existing.trial_number) {
                        per_backbone.insert(study.key.backbone.clone(), best);
                    }
                }
                None => {
                    per_backbone.insert(study.key.backbone.clone(), best);
                }
            }
        }
        self.select_across_studies(&per_backbone, policy)
    }

    /// Cross-study champion selection over per-backbone best trials.
    pub fn select_across_studies(
        &self,
        candidates: &BTreeMap<String, TrialRecord>,
        policy: &SelectionPolicy,
    ) -> Result<SelectionResult, ChampionError> {
        // Score every candidate. A backbone without benchmark and proxy entry
        // is excluded from the comparison, not fatal to the selection.
        let mut scored: Vec<(String, TrialRecord, f64, f64)> = Vec::new();
        for (backbone, trial) in candidates {
            let Some(accuracy) = trial.metric(&policy.objective_metric) else {
                tracing::warn!(
                    backbone = %backbone,
                    metric = %policy.objective_metric,
                    "Candidate excluded: best trial lacks objective metric"
                );
                continue;
            };
            match self.speed.score_for(trial) {
                Ok(score) => scored.push((backbone.clone(), trial.clone(), accuracy, score)),
                Err(ChampionError::UnknownBackbone(name)) => {
                    tracing::warn!(backbone = %name, "Candidate excluded: no speed data");
                }
                Err(e) => return Err(e),
            }
        }
        if scored.is_empty() {
            return Err(ChampionError::NoEligibleCandidate {
                floor: 0.0,
                candidates: 0,
            });
        }

        let best_accuracy = scored
            .iter()
            .map(|(_, _, acc, _)| *acc)
            .fold(f64::NEG_INFINITY, f64::max);
        let floor = if policy.use_relative_threshold {
            best_accuracy * policy.accuracy_threshold
        } else {
            policy.accuracy_threshold
        };

        let eligible: Vec<usize> = (0..scored.len())
            .filter(|&i| scored[i].2 >= floor)
            .collect();
        if eligible.is_empty() {
            // Structurally the best-accuracy candidate always clears the
            // floor; guard against float edge cases at the boundary anyway.
            return Err(ChampionError::NoEligibleCandidate {
                floor,
                candidates: scored.len(),
            });
        }

        // Normalization is local to the eligible set only.
        let eligible_scores: Vec<f64> = eligible.iter().map(|&i| scored[i].3).collect();
        let normalized = speed::normalize(&eligible_scores)?;

        // Fastest eligible, ties broken by higher accuracy then by backbone
        // name. `scored` inherits BTreeMap order, so equal (speed, accuracy)
        // pairs resolve to the lexicographically smallest backbone.
        let mut pick = 0usize;
        for idx in 1..eligible.len() {
            let better_speed = normalized[idx] < normalized[pick];
            let tied_speed = normalized[idx] == normalized[pick];
            let better_accuracy = scored[eligible[idx]].2 > scored[eligible[pick]].2;
            if better_speed || (tied_speed && better_accuracy) {
                pick = idx;
            }
        }
        let mut winner = eligible[pick];
        let mut winner_normalized = normalized[pick];

        // Gain guard: speed is a tiebreaker among near-equal-accuracy
        // options, not a license to trade away a large accuracy win.
        let most_accurate = (0..scored.len())
            .find(|&i| scored[i].2 == best_accuracy)
            .unwrap_or(winner);
        if winner != most_accurate {
            let gain = best_accuracy - scored[winner].2;
            if gain >= policy.min_accuracy_gain {
                tracing::info!(
                    fastest = %scored[winner].0,
                    most_accurate = %scored[most_accurate].0,
                    gain,
                    "Gain guard triggered: keeping the most accurate candidate"
                );
                winner = most_accurate;
                winner_normalized = eligible
                    .iter()
                    .position(|&i| i == winner)
                    .map(|pos| normalized[pos])
                    .unwrap_or(1.0);
            }
        }

        let eligible_set: std::collections::BTreeSet<usize> = eligible.iter().copied().collect();
        let candidates_considered = scored
            .iter()
            .enumerate()
            .map(|(i, (backbone, trial, accuracy, score))| ConsideredCandidate {
                backbone: backbone.clone(),
                trial: trial.clone(),
                accuracy: *accuracy,
                speed_score: *score,
                eligible: eligible_set.contains(&i),
            })
            .collect();

        let (_, winning_trial, accuracy, speed_score) = scored[winner].clone();
        tracing::info!(
            backbone = %winning_trial.backbone(),
            trial = winning_trial.trial_number,
            accuracy,
            normalized_speed = winner_normalized,
            "Champion selected"
        );
        Ok(SelectionResult {
            winning_trial,
            accuracy,
            speed_score,
            normalized_speed: winner_normalized,
            threshold_applied: floor,
            candidates_considered,
        })
    }
}
