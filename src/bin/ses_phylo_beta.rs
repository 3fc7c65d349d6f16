//! SES of pairwise phylogenetic beta diversity (SIM / SNE / SOR)
//!
//! Reads a sites × species community table and a Newick tree, binarizes the
//! community, and compares the observed turnover/nestedness partition of every
//! site pair against a null distribution of randomized communities.
//!
//! Usage:
//!   ses_phylo_beta --community comm.csv --tree tree.nwk --nperm 999 --workers 9 \
//!       --seed 1 --output results/phylo_beta_ses.csv
//!
//! With --taxonomic the tree is optional and species incidences are used instead
//! of branch lengths.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ses_nullmodel::cli::RunArgs;
use ses_nullmodel::logging::init_tracing;
use ses_nullmodel::{CommunityMatrix, PhyloSorensenPartition, PhyloTree, SesAnalysis, SesReport, SorensenPartition};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "ses_phylo_beta", about = "Null-model SES for pairwise (phylogenetic) Sørensen beta diversity")]
struct Cli {
    /// Community table (CSV or Parquet): first column site ids, one column per species
    #[arg(long)]
    community: PathBuf,

    /// Newick tree whose tips are the community's species
    #[arg(long)]
    tree: Option<PathBuf>,

    /// Use species incidences instead of branch lengths
    #[arg(long)]
    taxonomic: bool,

    /// Result table (.csv, .parquet or .json)
    #[arg(short, long, default_value = "phylo_beta_ses.csv")]
    output: PathBuf,

    /// Also write the full JSON report next to the table
    #[arg(long)]
    json: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.run.verbose);

    println!("\n{}", "=".repeat(80));
    println!("PHYLOGENETIC BETA DIVERSITY - NULL MODEL SES");
    println!("{}", "=".repeat(80));

    let total_start = Instant::now();
    let config = cli.run.resolve().context("Invalid run configuration")?;

    // ========================================================================
    // Step 1: Load community
    // ========================================================================
    println!("\nStep 1: Loading community matrix...");
    let matrix = CommunityMatrix::load(&cli.community)
        .with_context(|| format!("Failed to load community from: {}", cli.community.display()))?
        .binarize();
    println!("  Sites: {}", matrix.n_sites());
    println!("  Species: {}", matrix.n_species());
    println!("  Site pairs: {}", ses_nullmodel::pair_count(matrix.n_sites()));

    // ========================================================================
    // Step 2: Run permutations
    // ========================================================================
    println!("\nStep 2: Running null model...");
    println!("  Null model: {}", config.null_model.as_str());
    println!("  Permutations: {} on {} workers", config.nperm, config.workers);
    println!("  Swap iterations: {}", config.swap_iterations);

    let report = if cli.taxonomic {
        println!("  Mode: taxonomic (species incidence)");
        SesAnalysis::new(&SorensenPartition, &(), config).run(&matrix)?
    } else {
        let Some(tree_path) = &cli.tree else {
            bail!("--tree is required unless --taxonomic is given");
        };
        let tree = PhyloTree::load(tree_path)
            .with_context(|| format!("Failed to load tree from: {}", tree_path.display()))?;
        println!("  Mode: phylogenetic ({} tips, {} nodes)", tree.n_tips(), tree.n_nodes());
        let pool = tree.tips_for(matrix.species())?;
        println!("  Species pool PD: {:.4}", tree.faith_pd(&pool));
        SesAnalysis::new(&PhyloSorensenPartition, &tree, config).run(&matrix)?
    };

    // ========================================================================
    // Step 3: Write results
    // ========================================================================
    println!("\nStep 3: Writing results...");
    write_outputs(&report, &cli.output, cli.json.as_deref())?;

    print_summary(&report);
    println!("\nTotal time: {:.2}s", total_start.elapsed().as_secs_f64());
    println!("{}", "=".repeat(80));

    Ok(())
}

fn write_outputs(report: &SesReport, output: &Path, json: Option<&Path>) -> Result<()> {
    report
        .write(output)
        .with_context(|| format!("Failed to write results to: {}", output.display()))?;
    println!("  Table: {}", output.display());

    if let Some(path) = json {
        report
            .write(path)
            .with_context(|| format!("Failed to write JSON report to: {}", path.display()))?;
        println!("  Report: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &SesReport) {
    println!("\nSummary (seed {}, {} permutations):", report.metadata.seed, report.metadata.effective_nperm);
    for metric in &report.metrics {
        let Some(cells) = report.metric(metric) else { continue };
        let finite: Vec<f64> = cells.iter().map(|c| c.ses).filter(|s| s.is_finite()).collect();
        let mean_ses = if finite.is_empty() {
            f64::NAN
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        let significant = cells.iter().filter(|c| c.p <= 0.05).count();
        println!(
            "  {:<10} mean SES {:>8.3}  p<=0.05: {}/{}",
            metric,
            mean_ses,
            significant,
            cells.len()
        );
    }
    if report.degenerate_cells() > 0 {
        println!("  Degenerate cells (SES = NaN): {}", report.degenerate_cells());
    }
}
