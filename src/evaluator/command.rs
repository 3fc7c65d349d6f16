//! External-program evaluator
//!
//! Delegates metric computation to another program (an R or Python script
//! wrapping a functional- or phylogenetic-diversity library, for instance).
//!
//! Protocol, once per evaluation:
//! 1. The matrix is written to the program's stdin as CSV (`site,<species...>`).
//! 2. The program writes CSV to stdout: a header `metric,<cell labels...>`
//!    followed by one row per metric. `NA`/`NaN` cells are read as NaN.
//!    Labels containing commas are quoted in both directions.
//! 3. A non-zero exit status, unparsable output, unexpected metric names or
//!    cell labels in a different order fail the evaluation.

use super::Evaluator;
use crate::data::csv_strings;
use crate::error::{NullModelError, Result};
use crate::matrix::CommunityMatrix;
use crate::table::{MetricTable, ResultIndex, TableLayout};
use anyhow::{anyhow, bail, Context};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Whether the external program reports per site or per site pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Sites,
    Pairs,
}

impl std::str::FromStr for IndexKind {
    type Err = NullModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sites" | "site" => Ok(IndexKind::Sites),
            "pairs" | "pair" => Ok(IndexKind::Pairs),
            other => Err(NullModelError::InvalidConfig(format!(
                "unknown index kind '{}' (expected sites or pairs)",
                other
            ))),
        }
    }
}

/// Runs `program args...` once per evaluation
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: PathBuf,
    args: Vec<String>,
    metrics: Vec<String>,
    index: IndexKind,
}

impl CommandEvaluator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, metrics: Vec<String>, index: IndexKind) -> Self {
        Self {
            program: program.into(),
            args,
            metrics,
            index,
        }
    }

    fn expected_layout(&self, matrix: &CommunityMatrix) -> TableLayout {
        let index = match self.index {
            IndexKind::Sites => ResultIndex::Sites(matrix.sites().to_vec()),
            IndexKind::Pairs => ResultIndex::pairs_of(matrix.sites()),
        };
        TableLayout::new(self.metrics.clone(), index)
    }

    fn run(&self, input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin of {} unavailable", self.program.display()))?;
        // Feed stdin from a separate thread so a program that writes before
        // draining its input cannot deadlock
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            );
        }

        writer
            .join()
            .map_err(|_| anyhow!("stdin writer thread panicked"))?
            .with_context(|| format!("Failed to write matrix to {}", self.program.display()))?;

        Ok(output.stdout)
    }
}

impl Evaluator for CommandEvaluator {
    type Aux = ();

    fn name(&self) -> &str {
        "command"
    }

    fn layout(&self, matrix: &CommunityMatrix, _aux: &()) -> Result<TableLayout> {
        if self.metrics.is_empty() {
            return Err(NullModelError::InvalidConfig(
                "external evaluator needs at least one metric name".to_string(),
            ));
        }
        let layout = self.expected_layout(matrix);
        if layout.index.is_empty() {
            return Err(NullModelError::InputShapeMismatch(format!(
                "no {} to evaluate for {} site(s)",
                layout.index.header(),
                matrix.n_sites()
            )));
        }
        Ok(layout)
    }

    fn evaluate(&self, matrix: &CommunityMatrix, _aux: &()) -> anyhow::Result<MetricTable> {
        let stdout = self.run(matrix.to_csv_bytes()?)?;
        parse_metric_csv(&stdout, &self.expected_layout(matrix))
    }
}

/// Parse `metric,<labels...>` CSV into a table matching `layout` exactly
pub fn parse_metric_csv(output: &[u8], layout: &TableLayout) -> anyhow::Result<MetricTable> {
    if output.iter().all(u8::is_ascii_whitespace) {
        bail!("empty evaluator output");
    }
    let df = csv_strings(output.to_vec()).context("unparsable evaluator output")?;
    let columns = df.get_columns();
    if columns[0].name().trim() != "metric" {
        bail!("evaluator output must start with a 'metric' column, found '{}'", columns[0].name());
    }

    let labels: Vec<&str> = columns.iter().skip(1).map(|c| c.name().trim()).collect();
    let expected = layout.index.labels();
    if labels.len() != expected.len() || labels.iter().zip(expected).any(|(got, want)| *got != want.as_str()) {
        bail!(
            "evaluator output columns do not match the expected {} order (got {} columns, expected {}; first expected '{}')",
            layout.index.header(),
            labels.len(),
            expected.len(),
            expected.first().map_or("", String::as_str)
        );
    }
    if df.height() != layout.metrics.len() {
        bail!("evaluator output has {} metric rows, expected {}", df.height(), layout.metrics.len());
    }

    let names = columns[0].str()?;
    let mut rows = Vec::with_capacity(layout.metrics.len());
    for (m, metric) in layout.metrics.iter().enumerate() {
        let name = names.get(m).unwrap_or_default().trim();
        if name != metric.as_str() {
            bail!("expected metric '{}' in output, found '{}'", metric, name);
        }
        let values = columns[1..]
            .iter()
            .map(|column| parse_value(column.str()?.get(m).unwrap_or_default().trim()))
            .collect::<anyhow::Result<Vec<f64>>>()
            .with_context(|| format!("metric '{}'", metric))?;
        rows.push(values);
    }

    MetricTable::from_rows(rows).ok_or_else(|| anyhow!("ragged evaluator output"))
}

fn parse_value(field: &str) -> anyhow::Result<f64> {
    match field {
        "NA" | "NaN" | "nan" | "" => Ok(f64::NAN),
        "Inf" | "inf" => Ok(f64::INFINITY),
        "-Inf" | "-inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse::<f64>()
            .with_context(|| format!("invalid number '{}'", other)),
    }
}
