//! Null-model permutation tests for community diversity metrics
//!
//! Compares an observed metric table against a null distribution built by
//! randomizing the community matrix many times on a pool of workers, and
//! reports per-cell standardized effect sizes (SES) and p-values.
//!
//! - `matrix/`, `tree/`, `traits/`: input data (sites × species, phylogeny, trait space)
//! - `randomize/`: richness-preserving and fixed-fixed swap null models
//! - `evaluator/`: metric evaluators (Sørensen partitions, functional dispersion, external programs)
//! - `driver/`: parallel permutation batches with per-worker seeded RNG
//! - `aggregate/`: null mean, sd and p-value per cell
//! - `report/`: SES and result tables
//! - `analysis/`: the coordinator tying it together
//! - `cli/`, `logging/`: shared pieces of the binaries

pub mod aggregate;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod matrix;
pub mod randomize;
pub mod report;
pub mod table;
pub mod traits;
pub mod tree;

// Re-export commonly used types
pub use aggregate::{summarize, CellStats, NullSummary};
pub use analysis::SesAnalysis;
pub use config::{NullModel, Partition, RunConfig, TailPolicy};
pub use driver::{NullDistribution, PermutationDriver};
pub use error::{NullModelError, Result};
pub use evaluator::{
    CommandEvaluator, Evaluator, FunctionalDispersion, IndexKind, PhyloSorensenPartition, SorensenPartition,
};
pub use matrix::{pair_count, pair_index, pair_labels, CommunityMatrix};
pub use randomize::Randomizer;
pub use report::{standardized_effect_size, CellResult, Diagnostic, RunMetadata, SesReport};
pub use table::{MetricTable, ResultIndex, TableLayout, TableShape};
pub use traits::TraitSpace;
pub use tree::PhyloTree;
