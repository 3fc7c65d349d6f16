//! Matrix Randomization (null models)
//!
//! Produces a randomized copy of a community matrix with the same labels and
//! dimensions by running a fixed number of swap iterations.
//!
//! - Richness: each iteration picks a site and moves the content of one
//!   occupied cell into one empty cell of the same site. Per-site richness
//!   and per-site totals are preserved.
//! - Independent swap: each iteration picks two sites and two species and,
//!   if they form a checkerboard, flips it. Per-site richness, per-site
//!   totals and per-species incidence are preserved.
//!
//! Sites that are empty or contain every species cannot be reshuffled under
//! the richness model; they come back unchanged. Callers should treat such
//! input as a precondition violation (see
//! [`CommunityMatrix::degenerate_sites`]).

use crate::config::{NullModel, RunConfig};
use crate::matrix::CommunityMatrix;
use rand::Rng;

/// Null-model randomizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Randomizer {
    model: NullModel,
    iterations: usize,
}

impl Randomizer {
    pub fn new(model: NullModel, iterations: usize) -> Self {
        Self { model, iterations }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.null_model, config.swap_iterations)
    }

    pub fn model(&self) -> NullModel {
        self.model
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Randomized copy of `matrix`; the input is never modified
    pub fn randomize<R: Rng + ?Sized>(&self, matrix: &CommunityMatrix, rng: &mut R) -> CommunityMatrix {
        let mut out = matrix.clone();
        match self.model {
            NullModel::Richness => richness_swaps(&mut out, self.iterations, rng),
            NullModel::IndependentSwap => independent_swaps(&mut out, self.iterations, rng),
        }
        out
    }
}

fn richness_swaps<R: Rng + ?Sized>(matrix: &mut CommunityMatrix, iterations: usize, rng: &mut R) {
    let n_species = matrix.n_species();

    // (site, richness) for every site with at least one occupied and one empty cell
    let eligible: Vec<(usize, usize)> = (0..matrix.n_sites())
        .map(|i| (i, matrix.richness(i)))
        .filter(|&(_, richness)| richness > 0 && richness < n_species)
        .collect();
    if eligible.is_empty() {
        return;
    }

    let cells = matrix.cells_mut();
    for _ in 0..iterations {
        let (site, richness) = eligible[rng.gen_range(0..eligible.len())];
        let row = &mut cells[site * n_species..(site + 1) * n_species];

        let occupied_rank = rng.gen_range(0..richness);
        let empty_rank = rng.gen_range(0..n_species - richness);
        let from = nth_position(row, occupied_rank, |v| v > 0);
        let to = nth_position(row, empty_rank, |v| v == 0);

        row.swap(from, to);
    }
}

/// Index of the `rank`-th cell (0-based) satisfying `pred`
fn nth_position(row: &[u32], rank: usize, pred: impl Fn(u32) -> bool) -> usize {
    row.iter()
        .enumerate()
        .filter(|&(_, &v)| pred(v))
        .nth(rank)
        .map(|(idx, _)| idx)
        // rank is always drawn below the matching count
        .unwrap_or(0)
}

fn independent_swaps<R: Rng + ?Sized>(matrix: &mut CommunityMatrix, iterations: usize, rng: &mut R) {
    let n_sites = matrix.n_sites();
    let n_species = matrix.n_species();
    if n_sites < 2 || n_species < 2 {
        return;
    }

    let cells = matrix.cells_mut();
    let at = |site: usize, species: usize| site * n_species + species;

    let mut swapped = 0usize;
    for _ in 0..iterations {
        let r1 = rng.gen_range(0..n_sites);
        let r2 = (r1 + rng.gen_range(1..n_sites)) % n_sites;
        let c1 = rng.gen_range(0..n_species);
        let c2 = (c1 + rng.gen_range(1..n_species)) % n_species;

        let a = cells[at(r1, c1)];
        let b = cells[at(r1, c2)];
        let c = cells[at(r2, c1)];
        let d = cells[at(r2, c2)];

        let diagonal = a > 0 && d > 0 && b == 0 && c == 0;
        let anti_diagonal = b > 0 && c > 0 && a == 0 && d == 0;
        if diagonal || anti_diagonal {
            cells.swap(at(r1, c1), at(r1, c2));
            cells.swap(at(r2, c1), at(r2, c2));
            swapped += 1;
        }
    }

    tracing::trace!("independent swap: {}/{} attempts flipped a checkerboard", swapped, iterations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn labels(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn sample() -> CommunityMatrix {
        CommunityMatrix::from_rows(
            labels("site", 4),
            labels("sp", 6),
            vec![
                vec![1, 1, 1, 0, 0, 0],
                vec![0, 0, 1, 1, 0, 0],
                vec![2, 0, 0, 0, 5, 1],
                vec![0, 1, 0, 1, 0, 1],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_config() {
        let config = RunConfig {
            null_model: NullModel::IndependentSwap,
            swap_iterations: 250,
            ..Default::default()
        };
        let randomizer = Randomizer::from_config(&config);
        assert_eq!(randomizer.model(), NullModel::IndependentSwap);
        assert_eq!(randomizer.iterations(), 250);
    }

    #[test]
    fn test_richness_preserves_rows_and_labels() {
        let m = sample();
        let mut rng = StdRng::seed_from_u64(7);
        let r = Randomizer::new(NullModel::Richness, 1000).randomize(&m, &mut rng);

        assert_eq!(r.sites(), m.sites());
        assert_eq!(r.species(), m.species());
        for i in 0..m.n_sites() {
            assert_eq!(r.richness(i), m.richness(i));
            assert_eq!(r.site_total(i), m.site_total(i));
        }
    }

    #[test]
    fn test_richness_changes_arrangement() {
        let m = sample();
        let mut rng = StdRng::seed_from_u64(11);
        let r = Randomizer::new(NullModel::Richness, 1000).randomize(&m, &mut rng);
        assert_ne!(r, m);
    }

    #[test]
    fn test_independent_swap_preserves_incidence() {
        let m = sample().binarize();
        let mut rng = StdRng::seed_from_u64(3);
        let r = Randomizer::new(NullModel::IndependentSwap, 1000).randomize(&m, &mut rng);

        assert_eq!(r.species_incidence(), m.species_incidence());
        for i in 0..m.n_sites() {
            assert_eq!(r.richness(i), m.richness(i));
        }
        assert_ne!(r, m);
    }

    #[test]
    fn test_same_seed_same_result() {
        let m = sample();
        let randomizer = Randomizer::new(NullModel::Richness, 500);
        let a = randomizer.randomize(&m, &mut StdRng::seed_from_u64(99));
        let b = randomizer.randomize(&m, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_sites_untouched() {
        let m = CommunityMatrix::from_rows(
            labels("site", 3),
            labels("sp", 3),
            vec![vec![0, 0, 0], vec![1, 1, 1], vec![1, 0, 0]],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let r = Randomizer::new(NullModel::Richness, 200).randomize(&m, &mut rng);
        assert_eq!(r.row(0), &[0, 0, 0]);
        assert_eq!(r.row(1), &[1, 1, 1]);
        assert_eq!(r.richness(2), 1);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let m = sample();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(Randomizer::new(NullModel::Richness, 0).randomize(&m, &mut rng), m);
    }
}
