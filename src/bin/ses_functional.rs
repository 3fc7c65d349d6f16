//! SES of per-site functional diversity
//!
//! Two evaluator back ends:
//! - built-in: FDis and MPD from a species × traits table (--traits)
//! - external: any program that reads the community CSV on stdin and writes
//!   `metric,<site...>` rows on stdout (--command), e.g. an R script computing
//!   FRic and FDiv with a functional-diversity package
//!
//! Usage:
//!   ses_functional --community comm.csv --traits traits.csv --standardize --nperm 999
//!   ses_functional --community comm.csv --command Rscript --arg fd.R \
//!       --metric FRic --metric FDiv --nperm 999 --workers 9

use anyhow::{bail, Context, Result};
use clap::Parser;
use ses_nullmodel::cli::RunArgs;
use ses_nullmodel::evaluator::IndexKind;
use ses_nullmodel::logging::init_tracing;
use ses_nullmodel::{CommandEvaluator, CommunityMatrix, FunctionalDispersion, SesAnalysis, SesReport, TraitSpace};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "ses_functional", about = "Null-model SES for per-site functional diversity")]
struct Cli {
    /// Community table (CSV or Parquet): first column site ids, one column per species
    #[arg(long)]
    community: PathBuf,

    /// Species × traits table for the built-in FDis/MPD evaluator
    #[arg(long, conflicts_with = "command")]
    traits: Option<PathBuf>,

    /// z-score each trait before computing distances
    #[arg(long, requires = "traits")]
    standardize: bool,

    /// External evaluator program
    #[arg(long)]
    command: Option<PathBuf>,

    /// Argument passed to the external program (repeatable)
    #[arg(long = "arg", requires = "command", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Metric rows the external program reports, in order (repeatable)
    #[arg(long = "metric", requires = "command")]
    metrics: Vec<String>,

    /// Whether the external program reports per site or per site pair
    #[arg(long, default_value = "sites")]
    index: IndexKind,

    /// Use presence/absence instead of abundances
    #[arg(long)]
    binarize: bool,

    /// Result table (.csv, .parquet or .json)
    #[arg(short, long, default_value = "functional_ses.csv")]
    output: PathBuf,

    /// Also write the full JSON report
    #[arg(long)]
    json: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.run.verbose);

    println!("\n{}", "=".repeat(80));
    println!("FUNCTIONAL DIVERSITY - NULL MODEL SES");
    println!("{}", "=".repeat(80));

    let total_start = Instant::now();
    let config = cli.run.resolve().context("Invalid run configuration")?;

    // ========================================================================
    // Step 1: Load community
    // ========================================================================
    println!("\nStep 1: Loading community matrix...");
    let mut matrix = CommunityMatrix::load(&cli.community)
        .with_context(|| format!("Failed to load community from: {}", cli.community.display()))?;
    if cli.binarize {
        matrix = matrix.binarize();
    }
    println!("  Sites: {}", matrix.n_sites());
    println!("  Species: {}", matrix.n_species());

    // ========================================================================
    // Step 2: Run permutations
    // ========================================================================
    println!("\nStep 2: Running null model...");
    println!("  Null model: {}", config.null_model.as_str());
    println!("  Permutations: {} on {} workers", config.nperm, config.workers);

    let report = match (&cli.traits, &cli.command) {
        (Some(traits_path), None) => {
            let mut traits = TraitSpace::load(traits_path)
                .with_context(|| format!("Failed to load traits from: {}", traits_path.display()))?;
            if cli.standardize {
                traits = traits.standardized();
            }
            println!("  Evaluator: FDis/MPD over {} traits ({})", traits.n_traits(), traits.traits().join(", "));
            SesAnalysis::new(&FunctionalDispersion, &traits, config).run(&matrix)?
        }
        (None, Some(program)) => {
            println!("  Evaluator: {} {}", program.display(), cli.args.join(" "));
            println!("  Metrics: {}", cli.metrics.join(", "));
            let evaluator = CommandEvaluator::new(program, cli.args.clone(), cli.metrics.clone(), cli.index);
            SesAnalysis::new(&evaluator, &(), config).run(&matrix)?
        }
        _ => bail!("give exactly one of --traits or --command"),
    };

    // ========================================================================
    // Step 3: Write results
    // ========================================================================
    println!("\nStep 3: Writing results...");
    write_outputs(&report, &cli.output, cli.json.as_deref())?;

    println!("\nSummary (seed {}, {} permutations):", report.metadata.seed, report.metadata.effective_nperm);
    for metric in &report.metrics {
        let Some(cells) = report.metric(metric) else { continue };
        let low = cells.iter().filter(|c| c.ses < -1.96).count();
        let high = cells.iter().filter(|c| c.ses > 1.96).count();
        println!("  {:<8} SES < -1.96: {:>4}  SES > 1.96: {:>4}  (of {})", metric, low, high, cells.len());
    }
    if report.degenerate_cells() > 0 {
        println!("  Degenerate cells (SES = NaN): {}", report.degenerate_cells());
    }

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
