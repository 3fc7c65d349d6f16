//! Pairwise Sørensen dissimilarity and its turnover/nestedness partition
//!
//! For two sites with shared quantity `a` and unique quantities `b`, `c`:
//! - SIM (turnover)    = min(b,c) / (a + min(b,c))
//! - SNE (nestedness)  = (max(b,c) - min(b,c)) / (2a + b + c) × a / (a + min(b,c))
//! - SOR (total)       = (b + c) / (2a + b + c),  SOR = SIM + SNE
//!
//! The taxonomic version counts species; the phylogenetic version measures
//! branch length. Pairs where a ratio is 0/0 (an empty site) yield NaN.

use super::Evaluator;
use crate::error::{NullModelError, Result};
use crate::matrix::{pair_count, CommunityMatrix};
use crate::table::{MetricTable, ResultIndex, TableLayout, TableShape};
use crate::tree::PhyloTree;

const METRICS: [&str; 3] = ["beta.sim", "beta.sne", "beta.sor"];

/// `[SIM, SNE, SOR]` for shared `a` and unique `b`, `c`
pub fn sorensen_components(a: f64, b: f64, c: f64) -> [f64; 3] {
    let min = b.min(c);
    let max = b.max(c);
    let sim = min / (min + a);
    let sne = ((max - min) / (2.0 * a + b + c)) * (a / (a + min));
    let sor = (b + c) / (2.0 * a + b + c);
    [sim, sne, sor]
}

fn pair_layout(matrix: &CommunityMatrix) -> Result<TableLayout> {
    if matrix.n_sites() < 2 {
        return Err(NullModelError::InputShapeMismatch(format!(
            "pairwise beta diversity needs at least 2 sites, found {}",
            matrix.n_sites()
        )));
    }
    Ok(TableLayout::new(
        METRICS.iter().map(|m| m.to_string()).collect(),
        ResultIndex::pairs_of(matrix.sites()),
    ))
}

/// Fill a pairwise table from a per-pair `(a, b, c)` function
fn fill_pairs(n_sites: usize, abc: impl Fn(usize, usize) -> (f64, f64, f64)) -> MetricTable {
    let shape = TableShape {
        n_metrics: METRICS.len(),
        n_cells: pair_count(n_sites),
    };
    let mut table = MetricTable::filled(shape, f64::NAN);

    let mut cell = 0;
    for i in 0..n_sites {
        for j in (i + 1)..n_sites {
            let (a, b, c) = abc(i, j);
            for (metric, value) in sorensen_components(a, b, c).into_iter().enumerate() {
                table.set(metric, cell, value);
            }
            cell += 1;
        }
    }
    table
}

/// Incidence-based pairwise beta diversity
#[derive(Debug, Clone, Copy, Default)]
pub struct SorensenPartition;

impl Evaluator for SorensenPartition {
    type Aux = ();

    fn name(&self) -> &str {
        "sorensen_partition"
    }

    fn layout(&self, matrix: &CommunityMatrix, _aux: &()) -> Result<TableLayout> {
        pair_layout(matrix)
    }

    fn evaluate(&self, matrix: &CommunityMatrix, _aux: &()) -> anyhow::Result<MetricTable> {
        let n_species = matrix.n_species();
        Ok(fill_pairs(matrix.n_sites(), |i, j| {
            let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
            for k in 0..n_species {
                match (matrix.is_present(i, k), matrix.is_present(j, k)) {
                    (true, true) => a += 1.0,
                    (true, false) => b += 1.0,
                    (false, true) => c += 1.0,
                    (false, false) => {}
                }
            }
            (a, b, c)
        }))
    }
}

/// Branch-length-based pairwise beta diversity over a phylogeny whose tips
/// are the matrix species
#[derive(Debug, Clone, Copy, Default)]
pub struct PhyloSorensenPartition;

impl Evaluator for PhyloSorensenPartition {
    type Aux = PhyloTree;

    fn name(&self) -> &str {
        "phylo_sorensen_partition"
    }

    fn layout(&self, matrix: &CommunityMatrix, tree: &PhyloTree) -> Result<TableLayout> {
        tree.tips_for(matrix.species())?;
        pair_layout(matrix)
    }

    fn evaluate(&self, matrix: &CommunityMatrix, tree: &PhyloTree) -> anyhow::Result<MetricTable> {
        let tips = tree.tips_for(matrix.species())?;

        // Branches reached by each site's species
        let covered: Vec<Vec<bool>> = (0..matrix.n_sites())
            .map(|i| {
                let present: Vec<usize> = tips
                    .iter()
                    .enumerate()
                    .filter(|&(k, _)| matrix.is_present(i, k))
                    .map(|(_, &tip)| tip)
                    .collect();
                tree.covered_branches(&present)
            })
            .collect();

        Ok(fill_pairs(matrix.n_sites(), |i, j| {
            let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
            for (node, (&in_i, &in_j)) in covered[i].iter().zip(&covered[j]).enumerate() {
                let length = tree.branch_length(node);
                match (in_i, in_j) {
                    (true, true) => a += length,
                    (true, false) => b += length,
                    (false, true) => c += length,
                    (false, false) => {}
                }
            }
            (a, b, c)
        }))
    }
}
