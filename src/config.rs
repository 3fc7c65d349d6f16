//! Run Configuration
//!
//! The tunable parameters of a permutation test: permutation budget, worker
//! count, swap iterations, null model, p-value tail convention and base seed.
//! Loaded from JSON (missing fields fall back to defaults) and overridden by
//! command-line flags in the binaries.

use crate::error::{NullModelError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How the one-tailed empirical p-value is computed from the null distribution
///
/// With `n` null values and `k = count(null > observed)`:
/// - `PlusOneCorrection`: `p = (k + 1) / n` (never zero; at most `(n + 1) / n`)
/// - `Raw`: `p = k / n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    #[default]
    PlusOneCorrection,
    Raw,
}

impl TailPolicy {
    /// p-value for `exceed` null values strictly above the observed value out of `n`
    pub fn p_value(self, exceed: usize, n: usize) -> f64 {
        if n == 0 {
            return f64::NAN;
        }
        match self {
            TailPolicy::PlusOneCorrection => (exceed + 1) as f64 / n as f64,
            TailPolicy::Raw => exceed as f64 / n as f64,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TailPolicy::PlusOneCorrection => "plus_one_correction",
            TailPolicy::Raw => "raw",
        }
    }
}

impl std::str::FromStr for TailPolicy {
    type Err = NullModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plus_one_correction" | "plus-one" | "plus_one" => Ok(TailPolicy::PlusOneCorrection),
            "raw" => Ok(TailPolicy::Raw),
            other => Err(NullModelError::InvalidConfig(format!(
                "unknown tail policy '{}' (expected plus_one_correction or raw)",
                other
            ))),
        }
    }
}

/// Matrix randomization scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullModel {
    /// Within-site swaps: keeps per-site richness and totals
    #[default]
    Richness,
    /// Checkerboard swaps: additionally keeps per-species incidence
    IndependentSwap,
}

impl NullModel {
    pub fn as_str(self) -> &'static str {
        match self {
            NullModel::Richness => "richness",
            NullModel::IndependentSwap => "independent_swap",
        }
    }
}

impl std::str::FromStr for NullModel {
    type Err = NullModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "richness" => Ok(NullModel::Richness),
            "independent_swap" | "independentswap" => Ok(NullModel::IndependentSwap),
            other => Err(NullModelError::InvalidConfig(format!(
                "unknown null model '{}' (expected richness or independent_swap)",
                other
            ))),
        }
    }
}

/// Parameters for one permutation-test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Total permutations requested
    pub nperm: usize,
    /// Worker count (size of the thread pool)
    pub workers: usize,
    /// Swap attempts per randomized matrix
    pub swap_iterations: usize,
    pub tail: TailPolicy,
    pub null_model: NullModel,
    /// Base seed; worker `w` uses `seed + w`. Drawn at random when absent.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            nperm: 1000,
            workers: 4,
            swap_iterations: 1000,
            tail: TailPolicy::default(),
            null_model: NullModel::default(),
            seed: None,
        }
    }
}

/// How the permutation budget is split across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub workers: usize,
    pub per_worker: usize,
    pub requested: usize,
}

impl Partition {
    /// Permutations actually run (`workers × per_worker`)
    pub fn effective(&self) -> usize {
        self.workers * self.per_worker
    }

    /// Permutations lost to rounding down
    pub fn dropped(&self) -> usize {
        self.requested - self.effective()
    }
}

impl RunConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| NullModelError::io(path, e))?;
        let config: RunConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nperm == 0 {
            return Err(NullModelError::InvalidConfig("nperm must be > 0".to_string()));
        }
        if self.workers == 0 {
            return Err(NullModelError::InvalidConfig("workers must be > 0".to_string()));
        }
        if self.workers > self.nperm {
            return Err(NullModelError::InvalidConfig(format!(
                "workers ({}) exceeds nperm ({}); every worker needs at least one permutation",
                self.workers, self.nperm
            )));
        }
        Ok(())
    }

    /// Split `nperm` into equal per-worker batches, rounding down
    ///
    /// A budget that is not a multiple of the worker count loses the
    /// remainder; the loss is logged and visible through [`Partition::dropped`].
    pub fn partition(&self) -> Result<Partition> {
        self.validate()?;

        let partition = Partition {
            workers: self.workers,
            per_worker: self.nperm / self.workers,
            requested: self.nperm,
        };

        if partition.dropped() > 0 {
            tracing::warn!(
                "nperm={} is not divisible by workers={}; running {} permutations ({} dropped)",
                self.nperm,
                self.workers,
                partition.effective(),
                partition.dropped()
            );
        }

        Ok(partition)
    }

    /// Configured seed, or a fresh random one
    pub fn resolve_seed(&self) -> u64 {
        match self.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                tracing::info!("No seed configured; drew base seed {}", seed);
                seed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partition_even_split() {
        let config = RunConfig { nperm: 100, workers: 4, ..Default::default() };
        let partition = config.partition().unwrap();
        assert_eq!(partition.per_worker, 25);
        assert_eq!(partition.effective(), 100);
        assert_eq!(partition.dropped(), 0);
    }

    #[test]
    fn test_partition_rounds_down() {
        let config = RunConfig { nperm: 999, workers: 4, ..Default::default() };
        let partition = config.partition().unwrap();
        assert_eq!(partition.per_worker, 249);
        assert_eq!(partition.effective(), 996);
        assert_eq!(partition.dropped(), 3);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let zero = RunConfig { nperm: 0, ..Default::default() };
        assert!(zero.validate().is_err());

        let no_workers = RunConfig { workers: 0, ..Default::default() };
        assert!(no_workers.validate().is_err());

        let too_many = RunConfig { nperm: 3, workers: 4, ..Default::default() };
        assert!(matches!(too_many.partition(), Err(NullModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let json = r#"{ "nperm": 200, "tail": "raw", "null_model": "independent_swap" }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.nperm, 200);
        assert_eq!(config.workers, 4);
        assert_eq!(config.swap_iterations, 1000);
        assert_eq!(config.tail, TailPolicy::Raw);
        assert_eq!(config.null_model, NullModel::IndependentSwap);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_tail_policy_p_values() {
        assert_relative_eq!(TailPolicy::PlusOneCorrection.p_value(0, 10), 0.1);
        assert_relative_eq!(TailPolicy::PlusOneCorrection.p_value(10, 10), 1.1);
        assert_relative_eq!(TailPolicy::Raw.p_value(0, 10), 0.0);
        assert_relative_eq!(TailPolicy::Raw.p_value(10, 10), 1.0);
        assert!(TailPolicy::Raw.p_value(0, 0).is_nan());
    }

    #[test]
    fn test_parse_policies() {
        assert_eq!("raw".parse::<TailPolicy>().unwrap(), TailPolicy::Raw);
        assert_eq!("richness".parse::<NullModel>().unwrap(), NullModel::Richness);
        assert!("two_sided".parse::<TailPolicy>().is_err());
    }

    #[test]
    fn test_configured_seed_is_kept() {
        let config = RunConfig { seed: Some(42), ..Default::default() };
        assert_eq!(config.resolve_seed(), 42);
    }
}
