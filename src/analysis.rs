//! SES Analysis - coordinator for one permutation test
//!
//! Wires the pieces together in a fixed order:
//! 1. Validate the run configuration and split nperm across workers
//! 2. Ask the evaluator for its layout (auxiliary data checked here, before
//!    any permutation work)
//! 3. Evaluate the observed matrix
//! 4. Generate the null distribution on the worker pool
//! 5. Aggregate and assemble the report

use crate::aggregate::summarize;
use crate::config::RunConfig;
use crate::driver::PermutationDriver;
use crate::error::{NullModelError, Result};
use crate::evaluator::Evaluator;
use crate::matrix::CommunityMatrix;
use crate::randomize::Randomizer;
use crate::report::{RunMetadata, SesReport};
use std::time::Instant;

/// One evaluator + its auxiliary data + run parameters
pub struct SesAnalysis<'a, E: Evaluator> {
    evaluator: &'a E,
    aux: &'a E::Aux,
    config: RunConfig,
}

impl<'a, E: Evaluator> SesAnalysis<'a, E> {
    pub fn new(evaluator: &'a E, aux: &'a E::Aux, config: RunConfig) -> Self {
        Self { evaluator, aux, config }
    }

    /// Run the full permutation test on `matrix`
    pub fn run(&self, matrix: &CommunityMatrix) -> Result<SesReport> {
        let start = Instant::now();
        let partition = self.config.partition()?;

        let layout = self.evaluator.layout(matrix, self.aux)?;
        if layout.shape().is_empty() {
            return Err(NullModelError::InputShapeMismatch(format!(
                "evaluator '{}' declares an empty result table",
                self.evaluator.name()
            )));
        }
        tracing::info!(
            "SES analysis: evaluator={}, {} sites × {} species, {} metrics over {} {}s",
            self.evaluator.name(),
            matrix.n_sites(),
            matrix.n_species(),
            layout.metrics.len(),
            layout.index.len(),
            layout.index.header()
        );

        let degenerate = matrix.degenerate_sites();
        if !degenerate.is_empty() {
            let names: Vec<&str> = degenerate.iter().map(|&i| matrix.sites()[i].as_str()).collect();
            tracing::warn!(
                "{} site(s) are empty or hold every species and cannot be randomized: {}",
                names.len(),
                names.join(", ")
            );
        }

        let observed = self
            .evaluator
            .evaluate(matrix, self.aux)
            .map_err(|reason| NullModelError::ObservedFailure { reason })?;
        if observed.shape() != layout.shape() {
            return Err(NullModelError::InputShapeMismatch(format!(
                "observed table is {}, layout declares {}",
                observed.shape(),
                layout.shape()
            )));
        }

        let seed = self.config.resolve_seed();
        let driver = PermutationDriver::new(
            self.evaluator,
            self.aux,
            Randomizer::from_config(&self.config),
            partition,
            seed,
        );
        let null = driver.run(matrix, layout.shape())?;

        let summary = summarize(&observed, &null, self.config.tail)?;
        let metadata = RunMetadata::new(self.evaluator.name(), &self.config, &partition, seed);
        let report = SesReport::assemble(&layout, &observed, &summary, metadata)?;

        tracing::info!(
            "SES analysis finished in {:.2}s ({} permutations, {} degenerate cells)",
            start.elapsed().as_secs_f64(),
            partition.effective(),
            report.degenerate_cells()
        );

        Ok(report)
    }
}
