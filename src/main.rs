use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;

use logsink::{LoggerFactory, Metrics, Severity, load_config};

// CLI Arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "logsink.yaml", env = "LOGSINK_CONFIG")]
    config: PathBuf,

    /// Severity given to each line read from stdin
    #[arg(short, long, default_value = "info")]
    level: String,

    /// Print collected metrics to stderr on exit
    #[arg(long)]
    print_metrics: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let severity: Severity = args.level.parse()?;

    let metrics = Metrics::new()?;
    let (logger, cleanup) = LoggerFactory::new()
        .with_metrics(metrics.clone())
        .build(&config)
        .context("Failed to initialize logging")?;

    logger.debug(
        "Configuration loaded",
        &[("config", serde_json::to_value(&config)?)],
    );

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        if line.is_empty() {
            continue;
        }
        logger.log(severity, &line, &[]);
    }

    cleanup.run();

    if args.print_metrics {
        eprint!("{}", metrics.gather()?);
    }

    Ok(())
}
