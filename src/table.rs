//! Fixed-shape metric tables
//!
//! Every evaluation of a community matrix produces a `MetricTable` of shape
//! (metrics × cells), where a cell is either a site or an unordered site pair.
//! The shape is declared once through a [`TableLayout`] and every null sample
//! must match it.

use crate::matrix::pair_labels;
use serde::Serialize;

/// What the columns of a metric table are indexed by
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "labels", rename_all = "snake_case")]
pub enum ResultIndex {
    /// One cell per site
    Sites(Vec<String>),
    /// One cell per unordered site pair, lower-triangular order
    Pairs(Vec<String>),
}

impl ResultIndex {
    /// Pair index over the given site labels
    pub fn pairs_of(sites: &[String]) -> Self {
        ResultIndex::Pairs(pair_labels(sites))
    }

    pub fn labels(&self) -> &[String] {
        match self {
            ResultIndex::Sites(labels) | ResultIndex::Pairs(labels) => labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels().len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels().is_empty()
    }

    /// Column header for the label column of a report
    pub fn header(&self) -> &'static str {
        match self {
            ResultIndex::Sites(_) => "site",
            ResultIndex::Pairs(_) => "pair",
        }
    }
}

/// Metric names and cell labels of an evaluator's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLayout {
    pub metrics: Vec<String>,
    pub index: ResultIndex,
}

impl TableLayout {
    pub fn new(metrics: Vec<String>, index: ResultIndex) -> Self {
        Self { metrics, index }
    }

    pub fn shape(&self) -> TableShape {
        TableShape {
            n_metrics: self.metrics.len(),
            n_cells: self.index.len(),
        }
    }
}

/// (metric count, cell count)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableShape {
    pub n_metrics: usize,
    pub n_cells: usize,
}

impl TableShape {
    pub fn len(&self) -> usize {
        self.n_metrics * self.n_cells
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for TableShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} metrics × {} cells", self.n_metrics, self.n_cells)
    }
}

/// Dense metric-major numeric table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    shape: TableShape,
    values: Vec<f64>,
}

impl MetricTable {
    /// Table of the given shape filled with `value`
    pub fn filled(shape: TableShape, value: f64) -> Self {
        Self {
            shape,
            values: vec![value; shape.len()],
        }
    }

    /// Build from metric rows (`rows[metric][cell]`)
    ///
    /// Returns `None` when the rows are ragged.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let n_metrics = rows.len();
        let n_cells = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_cells) {
            return None;
        }
        Some(Self {
            shape: TableShape { n_metrics, n_cells },
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn shape(&self) -> TableShape {
        self.shape
    }

    pub fn get(&self, metric: usize, cell: usize) -> f64 {
        self.values[metric * self.shape.n_cells + cell]
    }

    pub fn set(&mut self, metric: usize, cell: usize, value: f64) {
        self.values[metric * self.shape.n_cells + cell] = value;
    }

    /// All cells of one metric
    pub fn metric_row(&self, metric: usize) -> &[f64] {
        let n = self.shape.n_cells;
        &self.values[metric * n..(metric + 1) * n]
    }

    /// Flat metric-major values; flat index `k` is `(k / n_cells, k % n_cells)`
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
