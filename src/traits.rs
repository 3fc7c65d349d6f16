//! Trait space
//!
//! Species coordinates in a fixed-dimension trait space (raw traits, or the
//! axes of an ordination computed elsewhere). Rows are matched to the
//! community matrix by species label.

use crate::data::{read_table, split_id_and_values};
use crate::error::{NullModelError, Result};
use polars::prelude::DataFrame;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Species × trait coordinate matrix
#[derive(Debug, Clone, PartialEq)]
pub struct TraitSpace {
    species: Vec<String>,
    traits: Vec<String>,
    coords: Vec<Vec<f64>>,
    index: FxHashMap<String, usize>,
}

impl TraitSpace {
    /// Build from one coordinate row per species
    pub fn new(species: Vec<String>, traits: Vec<String>, coords: Vec<Vec<f64>>) -> Result<Self> {
        if coords.len() != species.len() {
            return Err(NullModelError::InputShapeMismatch(format!(
                "{} coordinate rows for {} species",
                coords.len(),
                species.len()
            )));
        }
        if traits.is_empty() {
            return Err(NullModelError::InputShapeMismatch("trait space has no axes".to_string()));
        }

        let mut index = FxHashMap::default();
        for (i, (name, row)) in species.iter().zip(&coords).enumerate() {
            if row.len() != traits.len() {
                return Err(NullModelError::InputShapeMismatch(format!(
                    "species '{}' has {} trait values, expected {}",
                    name,
                    row.len(),
                    traits.len()
                )));
            }
            if let Some(bad) = row.iter().find(|v| !v.is_finite()) {
                return Err(NullModelError::Parse(format!(
                    "species '{}' has non-finite trait value {}",
                    name, bad
                )));
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(NullModelError::InputShapeMismatch(format!(
                    "duplicate species '{}' in trait table",
                    name
                )));
            }
        }

        Ok(Self { species, traits, coords, index })
    }

    /// Table with species id in the first column and one numeric column per trait
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let (species, traits, columns) = split_id_and_values(df, "trait table")?;
        let coords = (0..species.len())
            .map(|i| columns.iter().map(|col| col[i]).collect())
            .collect();
        Self::new(species, traits, coords)
    }

    /// Load from CSV or Parquet
    pub fn load(path: &Path) -> Result<Self> {
        let df = read_table(path)?;
        let space = Self::from_dataframe(&df)?;
        tracing::info!(
            "Loaded trait space {:?}: {} species × {} traits",
            path,
            space.n_species(),
            space.n_traits()
        );
        Ok(space)
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_traits(&self) -> usize {
        self.traits.len()
    }

    pub fn traits(&self) -> &[String] {
        &self.traits
    }

    pub fn coords(&self, row: usize) -> &[f64] {
        &self.coords[row]
    }

    /// Z-score every trait (mean 0, sample sd 1); constant traits are only centred
    pub fn standardized(&self) -> Self {
        let n = self.coords.len() as f64;
        let mut coords = self.coords.clone();

        for t in 0..self.traits.len() {
            let mean = self.coords.iter().map(|row| row[t]).sum::<f64>() / n;
            let var = if self.coords.len() > 1 {
                self.coords.iter().map(|row| (row[t] - mean).powi(2)).sum::<f64>() / (n - 1.0)
            } else {
                0.0
            };
            let sd = var.sqrt();
            for row in coords.iter_mut() {
                row[t] = if sd > 0.0 { (row[t] - mean) / sd } else { row[t] - mean };
            }
        }

        Self {
            species: self.species.clone(),
            traits: self.traits.clone(),
            coords,
            index: self.index.clone(),
        }
    }

    /// Trait-space row for each species label, in the same order
    ///
    /// Fails with `InputShapeMismatch` listing species without traits.
    pub fn rows_for(&self, species: &[String]) -> Result<Vec<usize>> {
        let mut rows = Vec::with_capacity(species.len());
        let mut missing = Vec::new();
        for name in species {
            match self.index.get(name) {
                Some(&row) => rows.push(row),
                None => missing.push(name.as_str()),
            }
        }

        if !missing.is_empty() {
            let preview: Vec<&str> = missing.iter().take(5).copied().collect();
            return Err(NullModelError::InputShapeMismatch(format!(
                "{} of {} species have no trait row (e.g. {:?})",
                missing.len(),
                species.len(),
                preview
            )));
        }
        Ok(rows)
    }

    /// Euclidean distance between two rows
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        self.coords[a]
            .iter()
            .zip(&self.coords[b])
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}
