//! Error types for null-model permutation tests
//!
//! A run either completes with a full report or fails with one of these.
//! Degenerate null distributions (zero standard deviation) are not errors;
//! they surface as diagnostics on the report.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while preparing or running a permutation test
#[derive(Debug, Error)]
pub enum NullModelError {
    /// Auxiliary data (tree, traits) does not line up with the community matrix.
    /// Raised before any permutation work starts.
    #[error("input shape mismatch: {0}")]
    InputShapeMismatch(String),

    /// The metric evaluator failed on one randomized matrix
    #[error(
        "evaluator failed on worker {worker}, permutation {permutation} \
         (global index {global_index}): {reason:#}"
    )]
    EvaluatorFailure {
        worker: usize,
        permutation: usize,
        global_index: usize,
        reason: anyhow::Error,
    },

    /// The metric evaluator failed on the un-permuted matrix
    #[error("evaluator failed on the observed matrix: {reason:#}")]
    ObservedFailure { reason: anyhow::Error },

    /// Unusable run parameters (zero permutations, more workers than permutations, ...)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed input text (Newick, CSV cells)
    #[error("parse error: {0}")]
    Parse(String),

    /// File I/O error with path context
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Table reading/writing through polars
    #[error("data error: {0}")]
    Data(#[from] polars::prelude::PolarsError),

    /// Report serialization
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, NullModelError>;

impl NullModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised by the evaluator inside a worker
    pub fn is_evaluator_failure(&self) -> bool {
        matches!(self, Self::EvaluatorFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluator_failure_names_worker_and_permutation() {
        let err = NullModelError::EvaluatorFailure {
            worker: 2,
            permutation: 7,
            global_index: 57,
            reason: anyhow::anyhow!("convex hull is degenerate"),
        };
        let msg = err.to_string();
        assert!(msg.contains("worker 2"));
        assert!(msg.contains("permutation 7"));
        assert!(msg.contains("global index 57"));
        assert!(msg.contains("convex hull is degenerate"));
        assert!(err.is_evaluator_failure());
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = NullModelError::io(
            "data/community.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().starts_with("data/community.csv"));
        assert!(!err.is_evaluator_failure());
    }
}
