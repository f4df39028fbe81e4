use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glob::glob;
use railclean::{
    check_file,
    config::{Codec, Thresholds},
    CleaningConfig, CleaningSession, RunSummary, ValidationReport,
};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Clean and validate train punctuality datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the rule sequence, validate, and export the cleaned dataset.
    Clean(CleanArgs),
    /// Validate existing files without changing them.
    Check(CheckArgs),
}

/// Threshold overrides shared by both commands.
#[derive(Args)]
struct ThresholdArgs {
    /// YAML config file; flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, allow_hyphen_values = true)]
    max_negative_delay: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    extreme_delay_threshold: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    min_realistic_delay: Option<f64>,
}

impl ThresholdArgs {
    fn load(&self) -> Result<CleaningConfig> {
        let mut cfg = match &self.config {
            Some(path) => CleaningConfig::from_yaml_file(path)?,
            None => CleaningConfig::default(),
        };
        let t = &mut cfg.thresholds;
        if let Some(v) = self.max_negative_delay {
            t.max_negative_delay = v;
        }
        if let Some(v) = self.extreme_delay_threshold {
            t.extreme_delay_threshold = v;
        }
        if let Some(v) = self.min_realistic_delay {
            t.min_realistic_delay = v;
        }
        Ok(cfg)
    }
}

#[derive(Args)]
struct CleanArgs {
    #[command(flatten)]
    thresholds: ThresholdArgs,
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Audit log destination.
    #[arg(long)]
    log: Option<PathBuf>,
    #[arg(long)]
    unknown_station: Option<String>,
    /// Leave leading and trailing whitespace in string columns alone.
    #[arg(long)]
    no_trim: bool,
    /// snappy, zstd or brotli.
    #[arg(long)]
    codec: Option<Codec>,
    #[arg(long)]
    level: Option<u32>,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// Files or glob patterns.
    #[arg(required = true)]
    patterns: Vec<String>,
    #[command(flatten)]
    thresholds: ThresholdArgs,
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct CheckResult {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckResult {
    fn passed(&self) -> bool {
        self.report.as_ref().is_some_and(ValidationReport::is_ok)
    }
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Clean(args) => clean(args),
        Command::Check(args) => check(args),
    }
}

fn clean(args: CleanArgs) -> Result<()> {
    let mut cfg = args.thresholds.load()?;
    if args.input.is_some() {
        cfg.input = args.input;
    }
    if args.output.is_some() {
        cfg.output = args.output;
    }
    if args.log.is_some() {
        cfg.log = args.log;
    }
    if let Some(label) = args.unknown_station {
        cfg.unknown_station_label = label;
    }
    if args.no_trim {
        cfg.trim_strings = false;
    }
    if let Some(codec) = args.codec {
        cfg.compression.codec = codec;
    }
    if args.level.is_some() {
        cfg.compression.level = args.level;
    }

    let session = CleaningSession::open(cfg)?;
    let summary = session.run()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(s: &RunSummary) {
    println!("input:   {}", s.input.display());
    println!("output:  {} ({:.1} MB, {})", s.output.display(), s.export.megabytes(), s.export.codec);
    println!("log:     {}", s.log.display());
    println!("rows:    {} -> {} ({} duplicates removed)", s.rows_in, s.rows_out, s.duplicates_removed);
    println!("before:  {}", s.before);
    println!("after:   {}", s.after);
    for (label, n) in s.effects.iter().filter(|(_, n)| **n > 0) {
        println!("  {:<24} {:>10}", label, n);
    }
    println!("took {:.2}s", s.duration_secs);
}

fn expand(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let before = paths.len();
        for entry in glob(pattern).with_context(|| format!("bad glob pattern '{}'", pattern))? {
            paths.push(entry?);
        }
        // a plain path that doesn't exist should still be reported as a load failure
        if paths.len() == before && !Path::new(pattern).exists() && !pattern.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(pattern));
        }
    }
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        bail!("no files matched {:?}", patterns);
    }
    Ok(paths)
}

fn check(args: CheckArgs) -> Result<()> {
    let thresholds: Thresholds = args.thresholds.load()?.thresholds;
    thresholds.validate()?;
    let paths = expand(&args.patterns)?;
    info!(files = paths.len(), "checking");

    let results: Vec<CheckResult> = paths
        .par_iter()
        .map(|path| match check_file(path, thresholds) {
            Ok(report) => CheckResult {
                path: path.clone(),
                report: Some(report),
                error: None,
            },
            Err(e) => {
                error!(path = %path.display(), error = %e, "check failed");
                CheckResult {
                    path: path.clone(),
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for r in &results {
            match (&r.report, &r.error) {
                (Some(report), _) => println!("{}: {}", r.path.display(), report),
                (None, Some(e)) => println!("{}: {}", r.path.display(), e),
                (None, None) => {}
            }
        }
    }

    let failed = results.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        bail!("{} of {} files failed validation", failed, results.len());
    }
    info!(files = results.len(), "all files passed");
    Ok(())
}
