//! Run options shared by the binaries
//!
//! A JSON config file (optional) supplies the base [`RunConfig`]; individual
//! flags override its fields.

use crate::config::{NullModel, RunConfig, TailPolicy};
use crate::error::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// JSON run configuration; flags below override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of null permutations
    #[arg(long)]
    pub nperm: Option<usize>,

    /// Worker threads (nperm is split evenly, remainder dropped)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Swap attempts per randomized matrix
    #[arg(long)]
    pub iterations: Option<usize>,

    /// p-value convention: plus_one_correction or raw
    #[arg(long)]
    pub tail: Option<TailPolicy>,

    /// Null model: richness or independent_swap
    #[arg(long = "null-model")]
    pub null_model: Option<NullModel>,

    /// Base seed (worker w uses seed + w)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Debug-level logging with per-worker progress
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Config file (or defaults) with flag overrides applied, validated
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        if let Some(nperm) = self.nperm {
            config.nperm = nperm;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(iterations) = self.iterations {
            config.swap_iterations = iterations;
        }
        if let Some(tail) = self.tail {
            config.tail = tail;
        }
        if let Some(null_model) = self.null_model {
            config.null_model = null_model;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NullModelError;

    #[test]
    fn test_flags_override_defaults() {
        let args = RunArgs {
            nperm: Some(99),
            workers: Some(3),
            tail: Some(TailPolicy::Raw),
            seed: Some(5),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.nperm, 99);
        assert_eq!(config.workers, 3);
        assert_eq!(config.tail, TailPolicy::Raw);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.swap_iterations, RunConfig::default().swap_iterations);
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("ses_cli_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"nperm": 200, "workers": 8, "null_model": "independent_swap"}"#).unwrap();

        let args = RunArgs {
            config: Some(path.clone()),
            workers: Some(2),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.nperm, 200);
        assert_eq!(config.workers, 2);
        assert_eq!(config.null_model, NullModel::IndependentSwap);
    }

    #[test]
    fn test_resolve_validates() {
        let args = RunArgs {
            nperm: Some(0),
            ..Default::default()
        };
        assert!(matches!(args.resolve(), Err(NullModelError::InvalidConfig(_))));
    }
}
