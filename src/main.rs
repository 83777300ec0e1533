use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use steam_catalog_migrate::cli::migrate::{self, MigrateConfig};
use steam_catalog_migrate::tracing::{init_tracing, DEFAULT_FILTER};
use steam_catalog_migrate::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "steam-catalog-migrate",
    version,
    about = "Load the Steam games CSV export into the normalized catalog schema"
)]
struct Cli {
    /// CSV export to load (default: env CSV_PATH or games.csv)
    csv: Option<PathBuf>,
    /// Optional override for the database URL (sqlite:... selects SQLite)
    #[arg(long)]
    db_url: Option<String>,
    /// Emit a progress line every N records (default: env PROGRESS_INTERVAL or 100)
    #[arg(long)]
    progress_every: Option<usize>,
    /// Create missing catalog tables before loading (otherwise follows AUTO_MIGRATE)
    #[arg(long, default_value_t = false)]
    init_schema: bool,
    /// Write the run summary as JSON to this path ("-" for stdout)
    #[arg(long)]
    summary_json: Option<PathBuf>,
    /// Log row counts for every catalog table after the run
    #[arg(long, default_value_t = false)]
    report_counts: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();

    let cfg = MigrateConfig {
        csv_path: cli.csv,
        database_url: cli.db_url,
        progress_every: cli.progress_every,
        init_schema: cli.init_schema.then_some(true),
        summary_json: cli.summary_json,
        report_counts: cli.report_counts.then_some(true),
    };

    match migrate::run(cfg).await {
        Ok(summary) => {
            info!(
                total = summary.total_records,
                loaded = summary.loaded,
                failed = summary.failed.total(),
                "done"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = ?e, "migration aborted");
            Err(e)
        }
    }
}
