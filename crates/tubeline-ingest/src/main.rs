//! Tubeline - tube status ingestion pipeline

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{signal, sync::watch};
use tracing::{error, info, warn};
use tubeline_common::logging::{init_logging, LogConfig, LogLevel};

use tubeline_ingest::{
    bronze::ArchiveOutcome,
    config::{PipelineConfig, StorageBackend, DEFAULT_PREVIEW_ROWS},
    models::CleansedStatusRecord,
    storage::{ArtifactStore, LocalArtifactStore, S3ArtifactStore, S3Config},
    tables::{
        BronzeTable, MemoryBronzeTable, MemorySilverTable, PgBronzeTable, PgSilverTable,
        SilverTable, TableName,
    },
    Pipeline,
};

/// Tube line status pipeline: feed -> bronze -> silver
#[derive(Parser, Debug)]
#[command(name = "tubeline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Table backend
    #[arg(long, value_enum, env = "TUBELINE_BACKEND", default_value_t = Backend::Postgres, global = true)]
    backend: Backend,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    database_url: Option<String>,

    /// Directory that local artifact keys resolve under
    #[arg(long, env = "TUBELINE_LOCAL_ROOT", default_value = "/", global = true)]
    local_root: PathBuf,

    /// Feed URL
    #[arg(long, global = true)]
    feed_url: Option<String>,

    /// Staging location
    #[arg(long, global = true)]
    staging_dir: Option<String>,

    /// Archive location
    #[arg(long, global = true)]
    archive_dir: Option<String>,

    /// Fetch attempts per cycle
    #[arg(long, global = true)]
    fetch_attempts: Option<u32>,

    /// Seconds between fetch attempts
    #[arg(long, global = true)]
    fetch_backoff_secs: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run one full cycle
    Run,

    /// Run cycles back to back until interrupted
    Watch {
        /// Seconds between the end of one cycle and the start of the next
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },

    /// Transform and promote pending raw records without fetching
    Promote,

    /// Show the latest cleansed rows
    Preview {
        /// Number of rows
        #[arg(short, long, default_value_t = DEFAULT_PREVIEW_ROWS)]
        limit: i64,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Postgres,
    /// In-process tables, lost on exit
    Memory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("tubeline")
        .build()
        .merge_env()?;
    init_logging(&log_config)?;

    let config = load_config(&cli)?;
    let pipeline = build_pipeline(&cli, config).await?;

    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => {
            let report = pipeline.run_cycle().await?;
            println!("{}", report.completion_message());
            print_rows(&pipeline.preview(DEFAULT_PREVIEW_ROWS).await?);
        }
        Command::Watch { interval_secs } => {
            watch_cycles(&pipeline, Duration::from_secs(interval_secs)).await;
        }
        Command::Promote => {
            let report = pipeline.run_transform().await?;
            println!(
                "Transformed {} of {} pending record(s): {} cleansed row(s) written, {} promoted, {} skipped",
                report.transform.transformed_keys.len(),
                report.transform.records_selected,
                report.transform.rows_written,
                report.promoted_count,
                report.transform.skipped.len(),
            );
            for skipped in &report.transform.skipped {
                println!("  skipped {}: {}", skipped.identity_key, skipped.error);
            }
        }
        Command::Preview { limit } => {
            print_rows(&pipeline.preview(limit).await?);
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;

    if let Some(url) = &cli.feed_url {
        config.feed_url = url.clone();
    }
    if let Some(dir) = &cli.staging_dir {
        config.staging_dir = dir.clone();
    }
    if let Some(dir) = &cli.archive_dir {
        config.archive_dir = dir.clone();
    }
    if let Some(attempts) = cli.fetch_attempts {
        config.fetch_attempts = attempts;
    }
    if let Some(backoff) = cli.fetch_backoff_secs {
        config.fetch_backoff_secs = backoff;
    }

    config.validate()?;
    Ok(config)
}

async fn build_pipeline(cli: &Cli, config: PipelineConfig) -> Result<Pipeline> {
    let store: Arc<dyn ArtifactStore> = match config.storage {
        StorageBackend::Local => Arc::new(LocalArtifactStore::new(&cli.local_root)),
        StorageBackend::S3 => Arc::new(S3ArtifactStore::new(S3Config::from_env()?)),
    };

    let bronze: Arc<dyn BronzeTable>;
    let silver: Arc<dyn SilverTable>;
    match cli.backend {
        Backend::Postgres => {
            let Some(url) = cli.database_url.as_deref() else {
                bail!("DATABASE_URL must be set for the postgres backend (or use --backend memory)");
            };

            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            info!("Database connection pool established");

            bronze = Arc::new(PgBronzeTable::new(pool.clone(), TableName::parse(&config.bronze_table)?));
            silver = Arc::new(PgSilverTable::new(pool, TableName::parse(&config.silver_table)?));
        }
        Backend::Memory => {
            warn!("Using in-memory tables; nothing is persisted");
            bronze = Arc::new(MemoryBronzeTable::new());
            silver = Arc::new(MemorySilverTable::new());
        }
    }

    Ok(Pipeline::new(config, store, bronze, silver)?)
}

/// Run cycles one after another. A failed cycle is logged and the next one
/// starts after the interval; a running cycle is never interrupted.
async fn watch_cycles(pipeline: &Pipeline, interval: Duration) {
    let (tx, mut shutdown) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    info!(interval_secs = interval.as_secs(), "Watching feed");

    loop {
        match pipeline.run_cycle().await {
            Ok(report) => {
                if let ArchiveOutcome::RelocationFailed(failure) = &report.archive {
                    warn!(error = %failure, "Cycle finished with unarchived payload");
                }
                info!("{}", report.completion_message());
            }
            Err(e) => error!(error = %e, "Cycle failed"),
        }

        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!("Watch stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping after the current cycle"),
        _ = terminate => info!("Received terminate signal, stopping after the current cycle"),
    }
}

fn print_rows(rows: &[CleansedStatusRecord]) {
    if rows.is_empty() {
        println!("No cleansed rows yet");
        return;
    }

    println!(
        "{:>12}  {:<27}  {:<16}  {:>8}  {:<26}  disruption_reason",
        "identity_key", "observation_timestamp", "line", "severity", "description"
    );
    for row in rows {
        println!(
            "{:>12}  {:<27}  {:<16}  {:>8}  {:<26}  {}",
            row.identity_key,
            row.observation_timestamp.to_rfc3339(),
            row.line.as_deref().unwrap_or("-"),
            row.status_severity.map_or_else(|| "-".to_string(), |s| s.to_string()),
            row.status_severity_description.as_deref().unwrap_or("-"),
            row.disruption_reason.as_deref().unwrap_or("-"),
        );
    }
}
