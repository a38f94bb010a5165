//! Configuration types for champion selection and resolution.

use crate::selection::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration for the selection subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChampionConfig {
    /// Root directory scanned for checkpoint folders; remote downloads land
    /// under `<output_root>/_downloads/`.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Tracking-store experiment holding the run families.
    #[serde(default = "default_experiment")]
    pub experiment: String,
    /// Static backbone → speed-score proxy table, used for candidates
    /// without a measured benchmark. Lower is faster.
    #[serde(default = "default_speed_proxy")]
    pub speed_proxy: HashMap<String, f64>,
    /// Default accuracy/speed tradeoff policy.
    #[serde(default)]
    pub policy: SelectionPolicy,
}

impl Default for ChampionConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            experiment: default_experiment(),
            speed_proxy: default_speed_proxy(),
            policy: SelectionPolicy::default(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".champion/checkpoints")
}

fn default_experiment() -> String {
    "hpo".to_string()
}

/// Relative inference-cost units derived from parameter counts of the
/// common text backbones; roughly params / 33M.
fn default_speed_proxy() -> HashMap<String, f64> {
    HashMap::from([
        ("albert-base-v2".to_string(), 0.4),
        ("distilbert-base-uncased".to_string(), 2.0),
        ("distilbert".to_string(), 2.0),
        ("electra-base-discriminator".to_string(), 3.3),
        ("bert-base-uncased".to_string(), 3.3),
        ("roberta-base".to_string(), 3.8),
        ("deberta-v3-base".to_string(), 5.6),
        ("deberta".to_string(), 10.0),
        ("deberta-v3-large".to_string(), 13.2),
    ])
}
