//! Cortex Monitor - cost and routing report over performance logs.

mod display;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cortex_core::{CostEstimator, generate_report};

/// Summarizes expert usage, cost and savings from Cortex performance logs.
#[derive(Parser, Debug)]
#[command(name = "cortex-monitor", author, version, about)]
struct Args {
    /// Directory holding performance logs (searched recursively)
    #[arg(long, default_value = "cortex/logs")]
    logs: PathBuf,

    /// Number of days to report on
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    days: u32,

    /// Pricing table (TOML) to use instead of the built-in prices
    #[arg(long)]
    pricing: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, conflicts_with = "plain")]
    json: bool,

    /// Print the plain-text report without colors or tables
    #[arg(long)]
    plain: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let estimator = CostEstimator::from_optional_file(args.pricing.as_deref())
        .context("Failed to load pricing table")?;
    let since = Utc::now() - Duration::days(i64::from(args.days));
    let report = generate_report(&args.logs, since, &estimator)
        .with_context(|| format!("Failed to read logs from {}", args.logs.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if args.plain {
        print!("{}", report.render());
    } else {
        display::print_report(&report);
    }
    Ok(())
}
