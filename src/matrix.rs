//! Community Matrix
//!
//! Sites × species table of non-negative counts (or 0/1 presence flags after
//! binarization). Row and column labels never change across randomizations;
//! only the cells move.

use crate::data::{csv_bytes, read_table, split_id_and_values};
use crate::error::{NullModelError, Result};
use polars::prelude::{Column, DataFrame, NamedFrom, Series};
use rustc_hash::FxHashSet;
use std::path::Path;

/// Sites × species abundance/incidence matrix (row-major)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityMatrix {
    sites: Vec<String>,
    species: Vec<String>,
    cells: Vec<u32>,
}

impl CommunityMatrix {
    /// Build from labels and row-major cells
    pub fn new(sites: Vec<String>, species: Vec<String>, cells: Vec<u32>) -> Result<Self> {
        if cells.len() != sites.len() * species.len() {
            return Err(NullModelError::InputShapeMismatch(format!(
                "{} cells for {} sites × {} species",
                cells.len(),
                sites.len(),
                species.len()
            )));
        }
        check_unique(&sites, "site")?;
        check_unique(&species, "species")?;

        Ok(Self { sites, species, cells })
    }

    /// Build from one `Vec` per site
    pub fn from_rows(sites: Vec<String>, species: Vec<String>, rows: Vec<Vec<u32>>) -> Result<Self> {
        if rows.len() != sites.len() {
            return Err(NullModelError::InputShapeMismatch(format!(
                "{} rows for {} site labels",
                rows.len(),
                sites.len()
            )));
        }
        let mut cells = Vec::with_capacity(sites.len() * species.len());
        for (site, row) in sites.iter().zip(&rows) {
            if row.len() != species.len() {
                return Err(NullModelError::InputShapeMismatch(format!(
                    "site '{}' has {} cells, expected {}",
                    site,
                    row.len(),
                    species.len()
                )));
            }
            cells.extend_from_slice(row);
        }
        Self::new(sites, species, cells)
    }

    /// Build from a table whose first column is the site id and whose other
    /// columns are species counts
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let (sites, species, columns) = split_id_and_values(df, "community matrix")?;

        let mut cells = vec![0u32; sites.len() * species.len()];
        let n_species = species.len();
        for (j, column) in columns.iter().enumerate() {
            for (i, &value) in column.iter().enumerate() {
                if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
                    return Err(NullModelError::Parse(format!(
                        "community matrix: cell ({}, {}) = {} is not a non-negative integer",
                        sites[i], species[j], value
                    )));
                }
                cells[i * n_species + j] = value as u32;
            }
        }

        Self::new(sites, species, cells)
    }

    /// Load from CSV or Parquet
    pub fn load(path: &Path) -> Result<Self> {
        let df = read_table(path)?;
        let matrix = Self::from_dataframe(&df)?;
        tracing::info!(
            "Loaded community matrix {:?}: {} sites × {} species",
            path,
            matrix.n_sites(),
            matrix.n_species()
        );
        Ok(matrix)
    }

    pub fn n_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn sites(&self) -> &[String] {
        &self.sites
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn get(&self, site: usize, species: usize) -> u32 {
        self.cells[site * self.species.len() + species]
    }

    pub fn is_present(&self, site: usize, species: usize) -> bool {
        self.get(site, species) > 0
    }

    pub fn row(&self, site: usize) -> &[u32] {
        let n = self.species.len();
        &self.cells[site * n..(site + 1) * n]
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [u32] {
        &mut self.cells
    }

    /// Number of species present at a site
    pub fn richness(&self, site: usize) -> usize {
        self.row(site).iter().filter(|&&v| v > 0).count()
    }

    /// Sum of counts at a site
    pub fn site_total(&self, site: usize) -> u64 {
        self.row(site).iter().map(|&v| v as u64).sum()
    }

    /// Number of sites each species occurs in
    pub fn species_incidence(&self) -> Vec<usize> {
        let mut incidence = vec![0usize; self.species.len()];
        for site in 0..self.sites.len() {
            for (j, &v) in self.row(site).iter().enumerate() {
                if v > 0 {
                    incidence[j] += 1;
                }
            }
        }
        incidence
    }

    /// Presence/absence copy (every positive cell becomes 1)
    pub fn binarize(&self) -> Self {
        Self {
            sites: self.sites.clone(),
            species: self.species.clone(),
            cells: self.cells.iter().map(|&v| u32::from(v > 0)).collect(),
        }
    }

    /// Sites whose presences cannot be reshuffled within the row
    /// (empty, or every species present)
    pub fn degenerate_sites(&self) -> Vec<usize> {
        (0..self.sites.len())
            .filter(|&i| {
                let richness = self.richness(i);
                richness == 0 || richness == self.species.len()
            })
            .collect()
    }

    /// Table with a `site` id column followed by one count column per species
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.species.len() + 1);
        columns.push(Series::new("site".into(), self.sites.clone()).into());
        for (j, species) in self.species.iter().enumerate() {
            let counts: Vec<u32> = (0..self.sites.len()).map(|i| self.get(i, j)).collect();
            columns.push(Series::new(species.as_str().into(), counts).into());
        }
        Ok(DataFrame::new(columns)?)
    }

    /// CSV encoding of [`Self::to_dataframe`], as handed to external evaluators
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        csv_bytes(&mut self.to_dataframe()?)
    }
}

fn check_unique(labels: &[String], kind: &str) -> Result<()> {
    let mut seen = FxHashSet::default();
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(NullModelError::InputShapeMismatch(format!(
                "duplicate {} label '{}'",
                kind, label
            )));
        }
    }
    Ok(())
}

/// Number of unordered pairs among `n` items
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Position of pair `(i, j)`, `i < j`, in lower-triangular order:
/// (0,1), (0,2), ..., (0,n-1), (1,2), ...
pub fn pair_index(i: usize, j: usize, n: usize) -> usize {
    debug_assert!(i < j && j < n);
    i * n - i * (i + 1) / 2 + (j - i - 1)
}

/// `"a-b"` labels for every unordered pair, in [`pair_index`] order
pub fn pair_labels(labels: &[String]) -> Vec<String> {
    let n = labels.len();
    let mut pairs = Vec::with_capacity(pair_count(n));
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push(format!("{}-{}", labels[i], labels[j]));
        }
    }
    pairs
}
