//! Permutation Driver
//!
//! Splits the permutation budget into equal batches, one per worker, and runs
//! randomize → evaluate on every worker of a dedicated rayon pool. The pool
//! lives only for the duration of [`PermutationDriver::run`].
//!
//! - Worker `w` draws from its own `StdRng` seeded with `base_seed + w`, so a
//!   run is reproducible for a given seed and worker count.
//! - Each worker keeps its samples in generation order; batches are
//!   concatenated in worker order after the join.
//! - The first evaluator failure stops every worker before its next
//!   permutation, and the run fails with that worker and permutation index.

use crate::config::Partition;
use crate::error::{NullModelError, Result};
use crate::evaluator::Evaluator;
use crate::matrix::CommunityMatrix;
use crate::randomize::Randomizer;
use crate::table::{MetricTable, TableShape};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// All null samples of one run
#[derive(Debug, Clone)]
pub struct NullDistribution {
    shape: TableShape,
    batch_sizes: Vec<usize>,
    samples: Vec<MetricTable>,
}

impl NullDistribution {
    /// Assemble from per-worker batches (each in generation order)
    pub fn from_batches(shape: TableShape, batches: Vec<Vec<MetricTable>>) -> Result<Self> {
        let batch_sizes = batches.iter().map(Vec::len).collect();
        let samples: Vec<MetricTable> = batches.into_iter().flatten().collect();
        if let Some(bad) = samples.iter().find(|s| s.shape() != shape) {
            return Err(NullModelError::InputShapeMismatch(format!(
                "null sample of shape {} in a distribution of shape {}",
                bad.shape(),
                shape
            )));
        }
        Ok(Self { shape, batch_sizes, samples })
    }

    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// Number of null samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[MetricTable] {
        &self.samples
    }

    /// Samples contributed by each worker
    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    /// Every null value at flat cell index `k` (metric-major)
    pub fn cell_values(&self, k: usize) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(move |s| s.values()[k])
    }
}

/// Runs the permutation batches for one evaluator
pub struct PermutationDriver<'a, E: Evaluator> {
    evaluator: &'a E,
    aux: &'a E::Aux,
    randomizer: Randomizer,
    partition: Partition,
    base_seed: u64,
}

impl<'a, E: Evaluator> PermutationDriver<'a, E> {
    pub fn new(
        evaluator: &'a E,
        aux: &'a E::Aux,
        randomizer: Randomizer,
        partition: Partition,
        base_seed: u64,
    ) -> Self {
        Self {
            evaluator,
            aux,
            randomizer,
            partition,
            base_seed,
        }
    }

    /// Seed of worker `worker`'s random stream
    pub fn worker_seed(&self, worker: usize) -> u64 {
        self.base_seed.wrapping_add(worker as u64)
    }

    /// Generate `partition.effective()` null samples of the given shape
    pub fn run(&self, matrix: &CommunityMatrix, shape: TableShape) -> Result<NullDistribution> {
        let workers = self.partition.workers;
        let total = self.partition.effective();
        tracing::info!(
            "Running {} permutations on {} workers ({} each, base seed {})",
            total,
            workers,
            self.partition.per_worker,
            self.base_seed
        );
        tracing::debug!(
            "Null model {} with {} swaps per permutation",
            self.randomizer.model().as_str(),
            self.randomizer.iterations()
        );

        let start = Instant::now();
        let abort = AtomicBool::new(false);
        let progress = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("perm-worker-{}", i))
            .build()
            .map_err(|e| NullModelError::InvalidConfig(format!("failed to build worker pool: {}", e)))?;

        // None marks a worker stopped by another worker's failure
        let outcomes: Vec<Result<Option<Vec<MetricTable>>>> = pool.install(|| {
            (0..workers)
                .into_par_iter()
                .map(|worker| self.run_worker(worker, matrix, shape, &abort, &progress))
                .collect()
        });
        drop(pool);

        // The abort flag is only raised by a failing worker, so a stopped
        // worker always comes with an error in the outcomes
        let batches: Vec<Vec<MetricTable>> = outcomes
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let elapsed = start.elapsed();
        tracing::info!(
            "Generated {} null samples in {:.2}s ({:.0} perms/sec)",
            total,
            elapsed.as_secs_f64(),
            total as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
        );

        NullDistribution::from_batches(shape, batches)
    }

    fn run_worker(
        &self,
        worker: usize,
        matrix: &CommunityMatrix,
        shape: TableShape,
        abort: &AtomicBool,
        progress: &AtomicUsize,
    ) -> Result<Option<Vec<MetricTable>>> {
        let per_worker = self.partition.per_worker;
        let total = self.partition.effective();
        let report_every = (total / 10).max(1);

        let mut rng = StdRng::seed_from_u64(self.worker_seed(worker));
        let mut samples = Vec::with_capacity(per_worker);

        for permutation in 0..per_worker {
            if abort.load(Ordering::Relaxed) {
                return Ok(None);
            }

            let randomized = self.randomizer.randomize(matrix, &mut rng);
            let outcome = match self.evaluator.evaluate(&randomized, self.aux) {
                Ok(table) if table.shape() == shape => Ok(table),
                Ok(table) => Err(anyhow::anyhow!(
                    "evaluator returned {}, expected {}",
                    table.shape(),
                    shape
                )),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(table) => samples.push(table),
                Err(reason) => {
                    abort.store(true, Ordering::Relaxed);
                    let global_index = worker * per_worker + permutation;
                    tracing::error!(
                        "Worker {} failed at permutation {} (global {}): {:#}",
                        worker,
                        permutation,
                        global_index,
                        reason
                    );
                    return Err(NullModelError::EvaluatorFailure {
                        worker,
                        permutation,
                        global_index,
                        reason,
                    });
                }
            }

            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if done % report_every == 0 || done == total {
                tracing::debug!(
                    "Progress: {}/{} permutations ({:.1}%)",
                    done,
                    total,
                    done as f64 / total as f64 * 100.0
                );
            }
        }

        Ok(Some(samples))
    }
}
