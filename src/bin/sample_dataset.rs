use anyhow::{Context, Result};
use clap::Parser;
use parquet::basic::Compression;
use railclean::{export::write_batch, load::read_parquet_head};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Copy the first rows of a dataset into a small file for quick experiments.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    #[arg(short, long, default_value_t = 2000)]
    rows: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let batch = read_parquet_head(&args.input, Some(args.rows))
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!(rows = batch.num_rows(), "sampled");

    let report = write_batch(&batch, &args.output, Compression::SNAPPY)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "wrote {} rows to {} ({:.2} MB)",
        report.rows,
        report.path.display(),
        report.megabytes()
    );
    Ok(())
}
