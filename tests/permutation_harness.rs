//! End-to-end permutation test runs with stub and built-in evaluators

use approx::assert_relative_eq;
use ses_nullmodel::{
    CommunityMatrix, Diagnostic, Evaluator, MetricTable, NullModel, NullModelError, PhyloSorensenPartition,
    PhyloTree, ResultIndex, RunConfig, SesAnalysis, SorensenPartition, TableLayout, TailPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};

fn labels(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{}", prefix, i + 1)).collect()
}

fn community() -> CommunityMatrix {
    CommunityMatrix::from_rows(
        labels("site", 3),
        labels("sp", 5),
        vec![vec![1, 1, 0, 0, 1], vec![0, 1, 1, 0, 0], vec![1, 0, 1, 1, 0]],
    )
    .unwrap()
}

fn config(nperm: usize, workers: usize, seed: u64) -> RunConfig {
    RunConfig {
        nperm,
        workers,
        swap_iterations: 25,
        seed: Some(seed),
        ..Default::default()
    }
}

/// Same value for every matrix
struct Constant(f64);

impl Evaluator for Constant {
    type Aux = ();

    fn name(&self) -> &str {
        "constant"
    }

    fn layout(&self, matrix: &CommunityMatrix, _aux: &()) -> ses_nullmodel::Result<TableLayout> {
        Ok(TableLayout::new(vec!["k".to_string()], ResultIndex::Sites(matrix.sites().to_vec())))
    }

    fn evaluate(&self, matrix: &CommunityMatrix, _aux: &()) -> anyhow::Result<MetricTable> {
        Ok(MetricTable::from_rows(vec![vec![self.0; matrix.n_sites()]]).unwrap())
    }
}

/// Counts evaluations; fails from the `fail_after`-th call on
struct Counting {
    calls: AtomicUsize,
    fail_after: usize,
}

impl Evaluator for Counting {
    type Aux = ();

    fn name(&self) -> &str {
        "counting"
    }

    fn layout(&self, matrix: &CommunityMatrix, _aux: &()) -> ses_nullmodel::Result<TableLayout> {
        Ok(TableLayout::new(vec!["n".to_string()], ResultIndex::Sites(matrix.sites().to_vec())))
    }

    fn evaluate(&self, matrix: &CommunityMatrix, _aux: &()) -> anyhow::Result<MetricTable> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_after {
            anyhow::bail!("numerical library error on call {}", call);
        }
        Ok(MetricTable::from_rows(vec![vec![1.0; matrix.n_sites()]]).unwrap())
    }
}

#[test]
fn constant_metric_gives_zero_sd_and_degenerate_ses() {
    let report = SesAnalysis::new(&Constant(0.5), &(), config(10, 2, 3)).run(&community()).unwrap();

    assert_eq!(report.metadata.effective_nperm, 10);
    for c in 0..3 {
        let cell = report.cell(0, c);
        assert_relative_eq!(cell.null_mean, cell.observed);
        assert_eq!(cell.null_sd, 0.0);
        assert!(cell.ses.is_nan());
        // No null value strictly exceeds the observed one
        assert_relative_eq!(cell.p, 1.0 / 10.0);
    }
    assert_eq!(report.degenerate_cells(), 3);
    assert!(report
        .diagnostics
        .iter()
        .all(|d| matches!(d, Diagnostic::DegenerateStatistics { .. })));
}

#[test]
fn inexact_constant_metric_is_still_degenerate() {
    for value in [0.1, 0.3, 0.7, 1.0 / 3.0] {
        let report = SesAnalysis::new(&Constant(value), &(), config(10, 2, 3)).run(&community()).unwrap();
        for c in 0..3 {
            let cell = report.cell(0, c);
            assert_eq!(cell.null_mean, value);
            assert_eq!(cell.null_sd, 0.0);
            assert!(cell.ses.is_nan());
        }
        assert_eq!(report.degenerate_cells(), 3);
    }
}

#[test]
fn sample_count_same_for_one_and_four_workers() {
    let counting = |workers| {
        let evaluator = Counting { calls: AtomicUsize::new(0), fail_after: usize::MAX };
        let report = SesAnalysis::new(&evaluator, &(), config(100, workers, 1)).run(&community()).unwrap();
        // One observed evaluation plus one per permutation
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 101);
        report.cell(0, 0).n_valid
    };
    assert_eq!(counting(4), 100);
    assert_eq!(counting(1), 100);
}

#[test]
fn indivisible_nperm_rounds_down() {
    let report = SesAnalysis::new(&Constant(0.5), &(), config(10, 3, 3)).run(&community()).unwrap();
    assert_eq!(report.metadata.requested_nperm, 10);
    assert_eq!(report.metadata.effective_nperm, 9);
    assert_eq!(report.cell(0, 0).n_valid, 9);
    assert!(report
        .diagnostics
        .contains(&Diagnostic::DroppedPermutations { requested: 10, effective: 9 }));
}

#[test]
fn pair_names_for_four_sites() {
    let sites: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
    let m = CommunityMatrix::from_rows(
        sites,
        labels("sp", 4),
        vec![vec![1, 1, 0, 0], vec![0, 1, 1, 0], vec![0, 0, 1, 1], vec![1, 0, 0, 1]],
    )
    .unwrap();

    let report = SesAnalysis::new(&SorensenPartition, &(), config(8, 2, 2)).run(&m).unwrap();
    assert_eq!(report.index.labels(), &["A-B", "A-C", "A-D", "B-C", "B-D", "C-D"]);
    assert_eq!(report.index.header(), "pair");
}

#[test]
fn evaluator_failure_identifies_worker_and_permutation() {
    // Observed call succeeds, first null evaluation fails
    let evaluator = Counting { calls: AtomicUsize::new(0), fail_after: 1 };
    let err = SesAnalysis::new(&evaluator, &(), config(20, 2, 4)).run(&community()).unwrap_err();

    match &err {
        NullModelError::EvaluatorFailure { worker, permutation, global_index, .. } => {
            assert!(*worker < 2);
            assert_eq!(*global_index, worker * 10 + permutation);
        }
        other => panic!("expected evaluator failure, got {}", other),
    }
    assert!(err.to_string().contains("numerical library error"));
}

#[test]
fn tree_mismatch_fails_before_any_permutation() {
    let tree = PhyloTree::from_newick("((sp1:1,sp2:1):1,(sp3:1,sp4:1):1);").unwrap();
    let err = SesAnalysis::new(&PhyloSorensenPartition, &tree, config(10, 2, 1))
        .run(&community())
        .unwrap_err();

    match err {
        NullModelError::InputShapeMismatch(msg) => assert!(msg.contains("sp5")),
        other => panic!("expected input shape mismatch, got {}", other),
    }
}

#[test]
fn fixed_seed_is_reproducible() {
    let run = || {
        SesAnalysis::new(&SorensenPartition, &(), config(40, 4, 2024))
            .run(&community())
            .unwrap()
    };
    let (a, b) = (run(), run());
    for m in 0..3 {
        for c in 0..3 {
            let (x, y) = (a.cell(m, c), b.cell(m, c));
            assert_eq!(x.null_mean.to_bits(), y.null_mean.to_bits());
            assert_eq!(x.null_sd.to_bits(), y.null_sd.to_bits());
            assert_eq!(x.p.to_bits(), y.p.to_bits());
        }
    }
}

#[test]
fn independent_swap_and_raw_tail_are_recorded() {
    let mut cfg = config(12, 3, 8);
    cfg.null_model = NullModel::IndependentSwap;
    cfg.tail = TailPolicy::Raw;

    let report = SesAnalysis::new(&Constant(0.5), &(), cfg).run(&community()).unwrap();
    assert_eq!(report.metadata.null_model, NullModel::IndependentSwap);
    assert_eq!(report.metadata.tail, TailPolicy::Raw);
    assert_eq!(report.cell(0, 0).p, 0.0);
}

#[test]
fn report_round_trips_through_csv() {
    let report = SesAnalysis::new(&SorensenPartition, &(), config(10, 2, 6)).run(&community()).unwrap();
    let path = std::env::temp_dir().join(format!("ses_report_{}.csv", std::process::id()));
    report.write(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("pair,beta.sim_obs,beta.sim_ses,beta.sim_p"));
    assert_eq!(text.lines().count(), 1 + 3);
}
