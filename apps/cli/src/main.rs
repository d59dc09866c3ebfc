//! Command-line driver for fetchpack
//!
//! Reads a JSON manifest of objects, retrieves them from an origin and
//! either writes one stored archive or saves every object under a
//! directory. Ctrl-C cancels the run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fetchpack::{
    parse_manifest, ConsoleProgressReporter, DirectorySink, HttpFetcher, IntoProgressCallback,
    NullProgressReporter, ProgressCallback, RetrievalConfig, RetrievalReport, RetrievalStrategy, Retriever,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[derive(Debug, Parser)]
#[command(name = "fetchpack", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Cli {
    /// JSON array of {identifier, display_name, byte_size_hint}
    #[arg(long)]
    manifest: PathBuf,

    /// Base URL objects are fetched from (`<base-url>/<identifier>`)
    #[arg(long, env = "FETCHPACK_BASE_URL")]
    base_url: String,

    /// Owner/session qualifier appended as a query parameter
    #[arg(long)]
    owner: Option<String>,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Total attempts per object, including the first
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Print a JSON summary of the run when it finishes
    #[arg(long)]
    summary_json: bool,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Retrieve everything concurrently into one stored archive
    Archive {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Retrieve one object at a time, saving each under a directory
    Files {
        #[arg(short, long)]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok(); // Ignore error if .env not present
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli)?;
    let manifest = tokio::fs::read_to_string(&cli.manifest)
        .await
        .with_context(|| format!("Failed to read manifest {}", cli.manifest.display()))?;
    let objects = parse_manifest(&manifest)?;
    info!(objects = objects.len(), "Loaded manifest {}", cli.manifest.display());

    let fetcher = HttpFetcher::from_config(&cli.base_url, &config)?;
    let mut retriever = Retriever::new(fetcher, config);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling retrieval");
                cancel.cancel();
            }
        }
    });

    let progress: ProgressCallback = if cli.quiet {
        NullProgressReporter.into_callback()
    } else {
        ConsoleProgressReporter::new(cli.verbose).into_callback()
    };

    let (strategy, archive_output) = match &cli.command {
        Command::Archive { output } => (RetrievalStrategy::Archived, Some(output)),
        Command::Files { dir } => {
            retriever = retriever.with_sink(DirectorySink::new(dir));
            (RetrievalStrategy::Progressive, None)
        }
    };

    let report = retriever
        .retrieve(&objects, strategy, Some(progress), &cancel)
        .await
        .context("Retrieval did not complete")?;

    let summary = match &report {
        RetrievalReport::Archived(run) => {
            if let Some(output) = archive_output {
                let path = run.archive.save_to(output).await?;
                println!(
                    "Wrote {} entries ({} bytes) to {}",
                    run.archive.entry_count(),
                    run.archive.len(),
                    path.display()
                );
            }
            serde_json::to_value(run.summary())?
        }
        RetrievalReport::Saved(run) => {
            println!("Saved {} files", run.saved.len());
            serde_json::to_value(run)?
        }
    };

    if !report.failed().is_empty() {
        eprintln!("{} objects could not be retrieved:", report.failed().len());
        for failure in report.failed() {
            eprintln!("  {} ({} attempts): {}", failure.display_name, failure.attempts, failure.reason);
        }
    }

    if cli.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    let metrics = retriever.metrics();
    info!(
        succeeded = metrics.objects_succeeded,
        failed = metrics.objects_failed,
        retries = metrics.retries_attempted,
        "Success rate {:.1}%, average size {:.0} bytes",
        metrics.success_rate() * 100.0,
        metrics.average_size()
    );
    Ok(())
}

/// Defaults, then `FETCHPACK_*` variables, then command-line flags
fn build_config(cli: &Cli) -> Result<RetrievalConfig> {
    let mut config = RetrievalConfig::from_env().context("Invalid FETCHPACK_* environment")?;

    if let Some(owner) = &cli.owner {
        config.owner_qualifier = Some(owner.clone());
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts_per_object = max_attempts;
    }

    config.validate()?;
    Ok(config)
}
