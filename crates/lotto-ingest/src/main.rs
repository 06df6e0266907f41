//! Lotto Ingest - lottery archive ingestion batch

use anyhow::{bail, Context, Result};
use clap::Parser;
use lotto_common::logging::{init_logging, LogConfig, LogFile, LogLevel, LogOutput, DEFAULT_LOG_DIR};
use lotto_ingest::config::{GameSelector, IngestConfig, IngestMode};
use lotto_ingest::connector::SourceConnector;
use lotto_ingest::orchestrator::IngestionOrchestrator;
use lotto_ingest::registry::SourceRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lotto-ingest")]
#[command(author, version, about = "Lottery archive ingestion batch")]
struct Cli {
    /// Root of the data repository holding partitions and coverage
    #[arg(long, env = "LOTTO_DATA_REPO")]
    data_repo: PathBuf,

    /// `all` or a comma-separated list of game ids
    #[arg(long, default_value = "all")]
    games: GameSelector,

    /// `incremental` or `full`
    #[arg(long, default_value = "incremental")]
    mode: IngestMode,

    /// Also append logs to exactly this file (not rotated)
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let mut builder = LogConfig::builder().level(log_level).file(LogFile::Daily {
        dir: PathBuf::from(DEFAULT_LOG_DIR),
        prefix: "lotto-ingest".to_string(),
    });
    if let Some(path) = &cli.log_path {
        builder = builder
            .file(LogFile::Exact(path.clone()))
            .output(LogOutput::Both);
    }

    // Environment variables take precedence
    let log_config = builder.build().merge_env()?;
    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("invalid ingestion configuration")?;
    if !cli.data_repo.is_dir() {
        bail!("data repository {} is not a directory", cli.data_repo.display());
    }

    let connector = Arc::new(
        SourceConnector::new(config.retry_policy(), &config.user_agent)
            .context("failed to build HTTP client")?,
    );
    let registry = SourceRegistry::from_games(&config.games, connector);
    let orchestrator = IngestionOrchestrator::for_data_repo(registry, &cli.data_repo);

    info!(
        data_repo = %cli.data_repo.display(),
        mode = %cli.mode,
        "Starting ingestion"
    );
    let report = orchestrator.run(&cli.games, cli.mode).await;

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        added = report.total_added(),
        "Ingestion complete"
    );
    Ok(())
}
