//! Evaluation CLI: builds a cuckoo stripe index per column and reports
//! correctness and size figures.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use cuckoo_stripe::{
    cuckoo::default_max_load_factor, generate_uniform_column, Column, CuckooAlgorithm,
    CuckooIndexFactory, IndexFactory, IndexOptions, IndexStructure, Table,
};

#[derive(Debug, Parser)]
#[command(name = "cuckoo-stripe")]
#[command(about = "Build and evaluate cuckoo stripe indexes", long_about = None)]
#[command(version)]
struct Cli {
    /// Input CSV file; a synthetic uniform column is generated when absent
    #[arg(long)]
    input_csv_path: Option<PathBuf>,

    /// Columns to index and test (comma-separated)
    #[arg(long, value_delimiter = ',')]
    columns_to_test: Vec<String>,

    /// Rows per stripe
    #[arg(long, default_value_t = 10_000)]
    num_rows_per_stripe: usize,

    /// Target false-positive fraction per lookup
    #[arg(long, default_value_t = 0.01)]
    scan_rate: f64,

    /// Slots per cuckoo bucket (1, 2, 4 or 8)
    #[arg(long, default_value_t = 1)]
    slots_per_bucket: usize,

    /// Placement strategy
    #[arg(long, value_enum, default_value_t = AlgArg::SkewedKicking)]
    cuckoo_alg: AlgArg,

    /// Row order applied before indexing
    #[arg(long, value_enum, default_value_t = SortingArg::None)]
    sorting: SortingArg,

    /// Choose prefix vs. suffix fingerprint bits per bucket
    #[arg(long)]
    prefix_bits_optimization: bool,

    /// Negative lookups per column for the measured scan rate
    #[arg(long, default_value_t = 1000)]
    num_lookups: usize,

    /// Rows to generate when no CSV is given
    #[arg(long, default_value_t = 100_000)]
    generate_num_values: usize,

    /// Distinct values to generate when no CSV is given
    #[arg(long, default_value_t = 1000)]
    num_unique_values: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlgArg {
    Kicking,
    SkewedKicking,
}

impl From<AlgArg> for CuckooAlgorithm {
    fn from(arg: AlgArg) -> Self {
        match arg {
            AlgArg::Kicking => CuckooAlgorithm::Kicking,
            AlgArg::SkewedKicking => CuckooAlgorithm::SkewedKicking,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortingArg {
    /// Keep the input row order
    None,
    /// Sort rows lexicographically, lowest-cardinality column first
    ByCardinality,
    /// Shuffle rows (seeded)
    Random,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut table = match &cli.input_csv_path {
        Some(path) => {
            if cli.columns_to_test.is_empty() {
                bail!("--columns-to-test is required with --input-csv-path");
            }
            Table::from_csv(path, &cli.columns_to_test)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => Table::create(
            "generated",
            vec![generate_uniform_column(
                cli.generate_num_values,
                cli.num_unique_values,
                42,
            )],
        )?,
    };

    match cli.sorting {
        SortingArg::None => {}
        SortingArg::ByCardinality => table.sort_with_cardinality_key(),
        SortingArg::Random => table.shuffle(),
    }

    let options = IndexOptions {
        cuckoo_alg: cli.cuckoo_alg.into(),
        max_load_factor: default_max_load_factor(cli.slots_per_bucket)
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        scan_rate: cli.scan_rate,
        slots_per_bucket: cli.slots_per_bucket,
        prefix_bits_optimization: cli.prefix_bits_optimization,
        rle_block_bitmaps: false,
    };
    let factory =
        CuckooIndexFactory::new(options).map_err(|e| anyhow::anyhow!("bad configuration: {e}"))?;

    for column in table.columns() {
        evaluate_column(column, &factory, &cli)?;
    }
    Ok(())
}

/// Upper bound on exhaustively verified positive lookups per column.
const MAX_POSITIVE_CHECKS: usize = 1000;

fn evaluate_column(column: &Column, factory: &CuckooIndexFactory, cli: &Cli) -> Result<()> {
    let num_stripes = column.num_rows() / cli.num_rows_per_stripe;
    if num_stripes == 0 {
        bail!(
            "column '{}' has {} rows, fewer than one stripe of {}",
            column.name(),
            column.num_rows(),
            cli.num_rows_per_stripe
        );
    }

    let index = factory
        .create(column, cli.num_rows_per_stripe)
        .with_context(|| format!("failed to build index for column '{}'", column.name()))?;

    let positive_errors = check_positive_lookups(column, index.as_ref(), cli);
    if positive_errors > 0 {
        bail!(
            "{positive_errors} positive lookups disagreed with ground truth on '{}'",
            column.name()
        );
    }
    let measured_scan_rate = negative_lookup_scan_rate(column, index.as_ref(), cli, num_stripes);

    let num_values = column.num_distinct_values() as f64;
    println!("column: {}", column.name());
    println!("  index: {}", index.name());
    println!(
        "  rows: {}, distinct values: {}, stripes: {num_stripes}",
        column.num_rows(),
        column.num_distinct_values()
    );
    println!(
        "  size: {} bytes ({:.2} bits/value), compressed: {} bytes ({:.2} bits/value)",
        index.byte_size(),
        index.byte_size() as f64 * 8.0 / num_values,
        index.compressed_byte_size(),
        index.compressed_byte_size() as f64 * 8.0 / num_values,
    );
    println!(
        "  scan rate: measured {measured_scan_rate:.4} (target {})",
        cli.scan_rate
    );
    Ok(())
}

/// Compares a sample of member lookups against ground truth; the count of
/// disagreements.
fn check_positive_lookups(column: &Column, index: &dyn IndexStructure, cli: &Cli) -> usize {
    let num_stripes = column.num_rows() / cli.num_rows_per_stripe;
    let mut errors = 0;
    for value in column.distinct_values().into_iter().take(MAX_POSITIVE_CHECKS) {
        for stripe_id in 0..num_stripes {
            let expected = column.stripe_contains(cli.num_rows_per_stripe, stripe_id, value);
            if index.stripe_contains(stripe_id, value) != expected {
                errors += 1;
            }
        }
    }
    errors
}

/// Average fraction of stripes surviving pruning over non-member lookups.
fn negative_lookup_scan_rate(
    column: &Column,
    index: &dyn IndexStructure,
    cli: &Cli,
    num_stripes: usize,
) -> f64 {
    let start = i64::from(column.max()) + 1;
    let mut false_positive_stripes = 0usize;
    for i in 0..cli.num_lookups as i64 {
        let value = (start + i).min(i64::from(i32::MAX)) as i32;
        false_positive_stripes += index
            .get_qualifying_stripes(value, num_stripes)
            .count_ones();
    }
    false_positive_stripes as f64 / (num_stripes * cli.num_lookups.max(1)) as f64
}
