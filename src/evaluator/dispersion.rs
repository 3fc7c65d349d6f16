//! Per-site functional dispersion in trait space
//!
//! - FDis: abundance-weighted mean distance of the site's species to their
//!   weighted centroid (0 for a single species)
//! - MPD: unweighted mean pairwise distance among present species
//!   (NaN with fewer than two species)
//!
//! Empty sites yield NaN for both.

use super::Evaluator;
use crate::error::{NullModelError, Result};
use crate::matrix::CommunityMatrix;
use crate::table::{MetricTable, ResultIndex, TableLayout, TableShape};
use crate::traits::TraitSpace;

const METRICS: [&str; 2] = ["FDis", "MPD"];

#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionalDispersion;

impl Evaluator for FunctionalDispersion {
    type Aux = TraitSpace;

    fn name(&self) -> &str {
        "functional_dispersion"
    }

    fn layout(&self, matrix: &CommunityMatrix, traits: &TraitSpace) -> Result<TableLayout> {
        traits.rows_for(matrix.species())?;
        if matrix.n_sites() == 0 {
            return Err(NullModelError::InputShapeMismatch(
                "community matrix has no sites".to_string(),
            ));
        }
        Ok(TableLayout::new(
            METRICS.iter().map(|m| m.to_string()).collect(),
            ResultIndex::Sites(matrix.sites().to_vec()),
        ))
    }

    fn evaluate(&self, matrix: &CommunityMatrix, traits: &TraitSpace) -> anyhow::Result<MetricTable> {
        let rows = traits.rows_for(matrix.species())?;
        let shape = TableShape {
            n_metrics: METRICS.len(),
            n_cells: matrix.n_sites(),
        };
        let mut table = MetricTable::filled(shape, f64::NAN);

        for site in 0..matrix.n_sites() {
            // (trait row, weight) of every present species
            let present: Vec<(usize, f64)> = matrix
                .row(site)
                .iter()
                .zip(&rows)
                .filter(|(&count, _)| count > 0)
                .map(|(&count, &row)| (row, count as f64))
                .collect();

            table.set(0, site, fdis(traits, &present));
            table.set(1, site, mpd(traits, &present));
        }

        Ok(table)
    }
}

fn fdis(traits: &TraitSpace, present: &[(usize, f64)]) -> f64 {
    let total: f64 = present.iter().map(|&(_, w)| w).sum();
    if total <= 0.0 {
        return f64::NAN;
    }

    let mut centroid = vec![0.0; traits.n_traits()];
    for &(row, w) in present {
        for (c, x) in centroid.iter_mut().zip(traits.coords(row)) {
            *c += w * x / total;
        }
    }

    present
        .iter()
        .map(|&(row, w)| {
            let dist = traits
                .coords(row)
                .iter()
                .zip(&centroid)
                .map(|(x, c)| (x - c).powi(2))
                .sum::<f64>()
                .sqrt();
            w * dist
        })
        .sum::<f64>()
        / total
}

fn mpd(traits: &TraitSpace, present: &[(usize, f64)]) -> f64 {
    if present.len() < 2 {
        return f64::NAN;
    }
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for (i, &(a, _)) in present.iter().enumerate() {
        for &(b, _) in &present[i + 1..] {
            sum += traits.distance(a, b);
            pairs += 1;
        }
    }
    sum / pairs as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn space() -> TraitSpace {
        // Collinear points at 0, 2 and 4 on one axis
        TraitSpace::new(
            names(&["a", "b", "c"]),
            names(&["x"]),
            vec![vec![0.0], vec![2.0], vec![4.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_fdis_and_mpd() {
        let m = CommunityMatrix::from_rows(
            names(&["s1", "s2", "s3"]),
            names(&["a", "b", "c"]),
            vec![vec![1, 0, 1], vec![3, 1, 0], vec![0, 1, 0]],
        )
        .unwrap();
        let table = FunctionalDispersion.evaluate(&m, &space()).unwrap();

        // s1: centroid 2, both species at distance 2
        assert_relative_eq!(table.get(0, 0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(table.get(1, 0), 4.0, epsilon = 1e-12);

        // s2: weights 3 and 1, centroid 0.5; FDis = (3×0.5 + 1×1.5) / 4
        assert_relative_eq!(table.get(0, 1), 0.75, epsilon = 1e-12);
        assert_relative_eq!(table.get(1, 1), 2.0, epsilon = 1e-12);

        // s3: single species
        assert_relative_eq!(table.get(0, 2), 0.0, epsilon = 1e-12);
        assert!(table.get(1, 2).is_nan());
    }

    #[test]
    fn test_layout_is_per_site() {
        let m = CommunityMatrix::from_rows(names(&["s1", "s2"]), names(&["a", "c"]), vec![vec![1, 1], vec![1, 0]])
            .unwrap();
        let layout = FunctionalDispersion.layout(&m, &space()).unwrap();
        assert_eq!(layout.index, ResultIndex::Sites(names(&["s1", "s2"])));
        assert_eq!(layout.metrics, names(&["FDis", "MPD"]));
    }

    #[test]
    fn test_layout_rejects_species_without_traits() {
        let m = CommunityMatrix::from_rows(names(&["s1"]), names(&["a", "q"]), vec![vec![1, 1]]).unwrap();
        assert!(matches!(
            FunctionalDispersion.layout(&m, &space()),
            Err(NullModelError::InputShapeMismatch(_))
        ));
    }
}
