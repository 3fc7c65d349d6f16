//! Null Aggregator
//!
//! Reduces a null distribution to per-cell mean, sample standard deviation
//! (n − 1 denominator) and an upper-tail p-value against the observed table.
//!
//! Non-finite null values are left out of every statistic; `n_valid` records
//! how many samples a cell actually used. Cells are reduced in parallel, but
//! each cell sums its samples sequentially in distribution order, so results
//! are bit-identical across runs on the same distribution.

use crate::config::TailPolicy;
use crate::driver::NullDistribution;
use crate::error::{NullModelError, Result};
use crate::table::{MetricTable, TableShape};
use rayon::prelude::*;
use serde::Serialize;

/// Null statistics of one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellStats {
    pub mean: f64,
    pub sd: f64,
    pub p: f64,
    /// Finite null values used
    pub n_valid: usize,
    /// Null values strictly greater than the observed value
    pub exceed: usize,
}

impl CellStats {
    /// Statistics of one cell's null values against its observed value
    ///
    /// An observed NaN has no meaningful tail, so its p-value is NaN.
    pub fn compute(observed: f64, values: impl Iterator<Item = f64>, tail: TailPolicy) -> Self {
        let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
        let n = finite.len();

        // A constant cell keeps its exact value; summing would round it
        let constant = finite.first().filter(|&&first| finite.iter().all(|&v| v == first)).copied();

        let mean = match constant {
            Some(value) => value,
            None if n > 0 => finite.iter().sum::<f64>() / n as f64,
            None => f64::NAN,
        };

        let sd = if n > 1 && constant.is_some() {
            0.0
        } else if n > 1 {
            let ss: f64 = finite.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            f64::NAN
        };

        let exceed = finite.iter().filter(|&&v| v > observed).count();
        let p = if observed.is_nan() {
            f64::NAN
        } else {
            tail.p_value(exceed, n)
        };

        Self {
            mean,
            sd,
            p,
            n_valid: n,
            exceed,
        }
    }
}

/// Per-cell null statistics in the table's metric-major order
#[derive(Debug, Clone, PartialEq)]
pub struct NullSummary {
    shape: TableShape,
    cells: Vec<CellStats>,
}

impl NullSummary {
    pub fn shape(&self) -> TableShape {
        self.shape
    }

    pub fn get(&self, metric: usize, cell: usize) -> &CellStats {
        &self.cells[metric * self.shape.n_cells + cell]
    }

    pub fn cells(&self) -> &[CellStats] {
        &self.cells
    }

    /// Cells that dropped at least one non-finite null value
    pub fn incomplete_cells(&self, expected: usize) -> usize {
        self.cells.iter().filter(|c| c.n_valid < expected).count()
    }
}

/// Aggregate `null` against `observed`
pub fn summarize(observed: &MetricTable, null: &NullDistribution, tail: TailPolicy) -> Result<NullSummary> {
    let shape = observed.shape();
    if null.shape() != shape {
        return Err(NullModelError::InputShapeMismatch(format!(
            "observed table is {} but null samples are {}",
            shape,
            null.shape()
        )));
    }

    let cells: Vec<CellStats> = (0..shape.len())
        .into_par_iter()
        .map(|k| CellStats::compute(observed.values()[k], null.cell_values(k), tail))
        .collect();

    let summary = NullSummary { shape, cells };
    let incomplete = summary.incomplete_cells(null.len());
    if incomplete > 0 {
        tracing::warn!(
            "{} of {} cells had non-finite null values; their statistics use fewer than {} samples",
            incomplete,
            shape.len(),
            null.len()
        );
    }

    Ok(summary)
}
