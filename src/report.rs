//! SES report assembly
//!
//! Combines the observed table with its null summary into one labelled
//! result per (metric, cell): observed value, standardized effect size,
//! p-value and the null mean/sd they were computed from.
//!
//! SES = (observed − null mean) / null sd. A cell whose null sd is zero or
//! undefined gets SES = NaN and a [`Diagnostic::DegenerateStatistics`] entry;
//! the run itself still succeeds.

use crate::aggregate::NullSummary;
use crate::config::{NullModel, Partition, RunConfig, TailPolicy};
use crate::data::write_table;
use crate::error::{NullModelError, Result};
use crate::table::{MetricTable, ResultIndex, TableLayout};
use polars::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Standardized effect size, NaN when `sd` is zero or not finite
pub fn standardized_effect_size(observed: f64, mean: f64, sd: f64) -> f64 {
    if sd.is_finite() && sd > 0.0 {
        (observed - mean) / sd
    } else {
        f64::NAN
    }
}

/// Result for one metric at one site or pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellResult {
    pub observed: f64,
    pub ses: f64,
    pub p: f64,
    pub null_mean: f64,
    pub null_sd: f64,
    pub n_valid: usize,
}

/// Conditions worth reporting that do not fail the run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Null sd is zero or undefined, so SES is NaN
    DegenerateStatistics { metric: String, label: String, null_sd: f64 },
    /// Permutations lost because nperm is not a multiple of the worker count
    DroppedPermutations { requested: usize, effective: usize },
}

/// How the null distribution was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub evaluator: String,
    pub null_model: NullModel,
    pub tail: TailPolicy,
    pub requested_nperm: usize,
    pub effective_nperm: usize,
    pub workers: usize,
    pub swap_iterations: usize,
    pub seed: u64,
}

impl RunMetadata {
    pub fn new(evaluator: &str, config: &RunConfig, partition: &Partition, seed: u64) -> Self {
        Self {
            evaluator: evaluator.to_string(),
            null_model: config.null_model,
            tail: config.tail,
            requested_nperm: partition.requested,
            effective_nperm: partition.effective(),
            workers: partition.workers,
            swap_iterations: config.swap_iterations,
            seed,
        }
    }
}

/// Final output of a permutation test
#[derive(Debug, Clone, Serialize)]
pub struct SesReport {
    pub metadata: RunMetadata,
    pub metrics: Vec<String>,
    pub index: ResultIndex,
    /// Metric-major, `metrics.len() × index.len()`
    results: Vec<CellResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SesReport {
    /// Combine observed values and null statistics under `layout`
    pub fn assemble(
        layout: &TableLayout,
        observed: &MetricTable,
        summary: &NullSummary,
        metadata: RunMetadata,
    ) -> Result<Self> {
        let shape = layout.shape();
        if observed.shape() != shape || summary.shape() != shape {
            return Err(NullModelError::InputShapeMismatch(format!(
                "layout is {} but observed is {} and null summary is {}",
                shape,
                observed.shape(),
                summary.shape()
            )));
        }

        let mut diagnostics = Vec::new();
        if metadata.effective_nperm < metadata.requested_nperm {
            diagnostics.push(Diagnostic::DroppedPermutations {
                requested: metadata.requested_nperm,
                effective: metadata.effective_nperm,
            });
        }

        let mut results = Vec::with_capacity(shape.len());
        for (m, metric) in layout.metrics.iter().enumerate() {
            for (c, label) in layout.index.labels().iter().enumerate() {
                let stats = summary.get(m, c);
                let obs = observed.get(m, c);
                let ses = standardized_effect_size(obs, stats.mean, stats.sd);

                if !(stats.sd.is_finite() && stats.sd > 0.0) {
                    diagnostics.push(Diagnostic::DegenerateStatistics {
                        metric: metric.clone(),
                        label: label.clone(),
                        null_sd: stats.sd,
                    });
                }

                results.push(CellResult {
                    observed: obs,
                    ses,
                    p: stats.p,
                    null_mean: stats.mean,
                    null_sd: stats.sd,
                    n_valid: stats.n_valid,
                });
            }
        }

        let degenerate = diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::DegenerateStatistics { .. }))
            .count();
        if degenerate > 0 {
            tracing::warn!(
                "{} of {} cells have a degenerate null distribution; their SES is NaN",
                degenerate,
                shape.len()
            );
        }

        Ok(Self {
            metadata,
            metrics: layout.metrics.clone(),
            index: layout.index.clone(),
            results,
            diagnostics,
        })
    }

    pub fn n_cells(&self) -> usize {
        self.index.len()
    }

    /// Result at (metric index, cell index)
    pub fn cell(&self, metric: usize, cell: usize) -> &CellResult {
        &self.results[metric * self.index.len() + cell]
    }

    /// Result by metric name and site/pair label
    pub fn get(&self, metric: &str, label: &str) -> Option<&CellResult> {
        let m = self.metrics.iter().position(|x| x == metric)?;
        let c = self.index.labels().iter().position(|x| x == label)?;
        Some(self.cell(m, c))
    }

    /// Every result of one metric, in index order
    pub fn metric(&self, metric: &str) -> Option<&[CellResult]> {
        let m = self.metrics.iter().position(|x| x == metric)?;
        let n = self.index.len();
        Some(&self.results[m * n..(m + 1) * n])
    }

    pub fn degenerate_cells(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::DegenerateStatistics { .. }))
            .count()
    }

    /// One row per site/pair; `{metric}_obs`, `_ses`, `_p`, `_null_mean`, `_null_sd` per metric
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(1 + self.metrics.len() * 5);
        columns.push(Series::new(self.index.header().into(), self.index.labels().to_vec()).into());

        for (m, metric) in self.metrics.iter().enumerate() {
            let rows: Vec<&CellResult> = (0..self.n_cells()).map(|c| self.cell(m, c)).collect();
            let field = |suffix: &str, f: fn(&CellResult) -> f64| -> Column {
                let values: Vec<f64> = rows.iter().map(|r| f(r)).collect();
                Series::new(format!("{}_{}", metric, suffix).into(), values).into()
            };
            columns.push(field("obs", |r| r.observed));
            columns.push(field("ses", |r| r.ses));
            columns.push(field("p", |r| r.p));
            columns.push(field("null_mean", |r| r.null_mean));
            columns.push(field("null_sd", |r| r.null_sd));
        }

        Ok(DataFrame::new(columns)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write as JSON (`.json`), Parquet (`.parquet`) or CSV (anything else)
    pub fn write(&self, path: &Path) -> Result<()> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| NullModelError::io(parent, e))?;
            }
            fs::write(path, self.to_json()?).map_err(|e| NullModelError::io(path, e))?;
        } else {
            let mut df = self.to_dataframe()?;
            write_table(&mut df, path)?;
        }

        tracing::info!("Wrote report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::summarize;
    use crate::driver::NullDistribution;
    use approx::assert_relative_eq;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn metadata(requested: usize, effective: usize) -> RunMetadata {
        RunMetadata {
            evaluator: "test".to_string(),
            null_model: NullModel::Richness,
            tail: TailPolicy::PlusOneCorrection,
            requested_nperm: requested,
            effective_nperm: effective,
            workers: 2,
            swap_iterations: 10,
            seed: 42,
        }
    }

    /// Two sites, one metric; site a's null varies, site b's is constant
    fn report() -> SesReport {
        let layout = TableLayout::new(names(&["m"]), ResultIndex::Sites(names(&["a", "b"])));
        let observed = MetricTable::from_rows(vec![vec![5.0, 1.0]]).unwrap();
        let samples = [1.0, 2.0, 3.0]
            .iter()
            .map(|&v| MetricTable::from_rows(vec![vec![v, 1.0]]).unwrap())
            .collect();
        let null = NullDistribution::from_batches(layout.shape(), vec![samples]).unwrap();
        let summary = summarize(&observed, &null, TailPolicy::PlusOneCorrection).unwrap();
        SesReport::assemble(&layout, &observed, &summary, metadata(3, 3)).unwrap()
    }

    #[test]
    fn test_ses_formula_and_sign() {
        assert_relative_eq!(standardized_effect_size(5.0, 2.0, 1.5), 2.0);
        assert!(standardized_effect_size(1.0, 2.0, 0.5) < 0.0);
        assert!(standardized_effect_size(1.0, 1.0, 0.0).is_nan());
        assert!(standardized_effect_size(1.0, 1.0, f64::NAN).is_nan());
    }

    #[test]
    fn test_assemble_flags_degenerate_cells() {
        let report = report();
        let a = report.get("m", "a").unwrap();
        assert_relative_eq!(a.null_mean, 2.0);
        assert_relative_eq!(a.null_sd, 1.0);
        assert_relative_eq!(a.ses, 3.0);
        assert_relative_eq!(a.p, 1.0 / 3.0);

        let b = report.get("m", "b").unwrap();
        assert!(b.ses.is_nan());
        assert_eq!(report.degenerate_cells(), 1);
        assert_eq!(
            report.diagnostics[0],
            Diagnostic::DegenerateStatistics {
                metric: "m".to_string(),
                label: "b".to_string(),
                null_sd: 0.0
            }
        );
    }

    #[test]
    fn test_dataframe_columns() {
        let df = report().to_dataframe().unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["site", "m_obs", "m_ses", "m_p", "m_null_mean", "m_null_sd"]);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_json_contains_metadata() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metadata"]["seed"], 42);
        assert_eq!(value["metadata"]["tail"], "plus_one_correction");
        assert_eq!(value["index"]["kind"], "sites");
        assert_eq!(value["diagnostics"][0]["kind"], "degenerate_statistics");
    }

    #[test]
    fn test_dropped_permutations_diagnostic() {
        let layout = TableLayout::new(names(&["m"]), ResultIndex::Sites(names(&["a"])));
        let observed = MetricTable::from_rows(vec![vec![1.0]]).unwrap();
        let samples = vec![
            MetricTable::from_rows(vec![vec![0.0]]).unwrap(),
            MetricTable::from_rows(vec![vec![2.0]]).unwrap(),
        ];
        let null = NullDistribution::from_batches(layout.shape(), vec![samples]).unwrap();
        let summary = summarize(&observed, &null, TailPolicy::Raw).unwrap();
        let report = SesReport::assemble(&layout, &observed, &summary, metadata(3, 2)).unwrap();
        assert!(report
            .diagnostics
            .contains(&Diagnostic::DroppedPermutations { requested: 3, effective: 2 }));
        assert_eq!(report.degenerate_cells(), 0);
    }
}
