//! Metric evaluators
//!
//! An evaluator maps a community matrix plus read-only auxiliary data (a
//! tree, a trait space, or nothing) to a fixed-shape [`MetricTable`]. The
//! permutation driver calls it once per randomized matrix, concurrently from
//! several workers, so implementations must be pure with respect to their
//! inputs.
//!
//! Built-in evaluators:
//! - [`SorensenPartition`]: pairwise SIM/SNE/SOR from incidences
//! - [`PhyloSorensenPartition`]: pairwise SIM/SNE/SOR from shared branch length
//! - [`FunctionalDispersion`]: per-site FDis and MPD in trait space
//! - [`CommandEvaluator`]: any metric computed by an external program

pub mod command;
pub mod dispersion;
pub mod sorensen;

pub use command::{CommandEvaluator, IndexKind};
pub use dispersion::FunctionalDispersion;
pub use sorensen::{sorensen_components, PhyloSorensenPartition, SorensenPartition};

use crate::error::Result;
use crate::matrix::CommunityMatrix;
use crate::table::{MetricTable, TableLayout};

/// Community matrix → metric table
pub trait Evaluator: Sync {
    /// Read-only context shared by every evaluation
    type Aux: Sync;

    /// Short name used in logs and report metadata
    fn name(&self) -> &str;

    /// Metric names and cell labels for `matrix`
    ///
    /// Called once before any permutation work. Incompatible auxiliary data
    /// must be reported here as `InputShapeMismatch`.
    fn layout(&self, matrix: &CommunityMatrix, aux: &Self::Aux) -> Result<TableLayout>;

    /// Evaluate one (observed or randomized) matrix
    fn evaluate(&self, matrix: &CommunityMatrix, aux: &Self::Aux) -> anyhow::Result<MetricTable>;
}
