use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::database_ops::db::open_store;
use crate::database_ops::pipeline::{run_migration, MigrationOptions, MigrationSummary, DEFAULT_PROGRESS_EVERY};
use crate::source::read_records;
use crate::util::env as env_util;

pub const DEFAULT_CSV_PATH: &str = "games.csv";

#[derive(Debug, Clone, Default)]
pub struct MigrateConfig {
    /// CSV export to load (defaults to env CSV_PATH or `games.csv`).
    pub csv_path: Option<PathBuf>,
    /// Optional override for the database connection string.
    pub database_url: Option<String>,
    /// Override PROGRESS_INTERVAL (defaults to env/100).
    pub progress_every: Option<usize>,
    /// Force schema creation before loading (otherwise follows AUTO_MIGRATE).
    pub init_schema: Option<bool>,
    /// Write the run summary as JSON here; `-` means stdout.
    pub summary_json: Option<PathBuf>,
    /// Log per-table row counts after the run (otherwise follows REPORT_COUNTS).
    pub report_counts: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub csv_path: PathBuf,
    pub database_url: String,
    pub progress_every: usize,
    pub init_schema: bool,
    pub summary_json: Option<PathBuf>,
    pub report_counts: bool,
}

impl MigrateConfig {
    /// CLI value, then environment, then default.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        env_util::init_env();
        let database_url = match self.database_url {
            Some(url) => url,
            None => env_util::db_url()?,
        };
        Ok(ResolvedConfig {
            csv_path: self
                .csv_path
                .or_else(|| env_util::env_opt("CSV_PATH").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_PATH)),
            database_url,
            progress_every: self
                .progress_every
                .unwrap_or_else(|| env_util::env_parse("PROGRESS_INTERVAL", DEFAULT_PROGRESS_EVERY)),
            init_schema: self
                .init_schema
                .unwrap_or_else(|| env_util::env_flag("AUTO_MIGRATE", false)),
            summary_json: self.summary_json,
            report_counts: self
                .report_counts
                .unwrap_or_else(|| env_util::env_flag("REPORT_COUNTS", false)),
        })
    }
}

pub async fn run(cfg: MigrateConfig) -> Result<MigrationSummary> {
    let cfg = cfg.resolve()?;
    env_util::config_snapshot(
        "migrate",
        &[
            ("CSV_PATH", cfg.csv_path.display().to_string()),
            ("DATABASE_URL", cfg.database_url.clone()),
            ("PROGRESS_INTERVAL", cfg.progress_every.to_string()),
            ("AUTO_MIGRATE", cfg.init_schema.to_string()),
        ],
    );

    let records = read_records(&cfg.csv_path)?;
    let mut store = open_store(&cfg.database_url).await?;
    if cfg.init_schema {
        store.apply_schema().await?;
    }

    let opts = MigrationOptions {
        progress_every: cfg.progress_every,
    };
    let summary = run_migration(store.as_mut(), &records, &opts).await?;

    if cfg.report_counts {
        for (table, rows) in store.table_counts().await? {
            info!(target = "db_counts", table, rows, "table rows");
        }
    }

    if let Some(path) = &cfg.summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        if path.as_os_str() == "-" {
            println!("{json}");
        } else {
            fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), "summary written");
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("steam-migrate-{}-{nanos}-{name}", std::process::id()))
    }

    #[test]
    fn explicit_values_win() {
        let cfg = MigrateConfig {
            csv_path: Some(PathBuf::from("input.csv")),
            database_url: Some("sqlite::memory:".into()),
            progress_every: Some(7),
            init_schema: Some(true),
            summary_json: None,
            report_counts: Some(false),
        }
        .resolve()
        .unwrap();
        assert_eq!(cfg.csv_path, PathBuf::from("input.csv"));
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.progress_every, 7);
        assert!(cfg.init_schema);
        assert!(!cfg.report_counts);
    }

    #[tokio::test]
    async fn migrates_a_csv_file_end_to_end() {
        let csv = scratch("games.csv");
        let summary_path = scratch("summary.json");
        fs::write(
            &csv,
            "AppID,Name,Release date,Genres,Windows,Mac,Linux,Price,Supported languages\n\
             20200,Galactic Bowling,\"Oct 21, 2008\",\"Casual,Indie,Sports\",True,False,False,19.99,['English']\n\
             655370,Train Bandit,\"Oct 12, 2017\",\"Action,Indie\",True,True,False,0.99,\"['English', 'French']\"\n\
             ,Orphan,,Indie,True,False,False,,\n",
        )
        .unwrap();

        let summary = run(MigrateConfig {
            csv_path: Some(csv.clone()),
            database_url: Some("sqlite::memory:".into()),
            progress_every: Some(1),
            init_schema: Some(true),
            summary_json: Some(summary_path.clone()),
            report_counts: Some(true),
        })
        .await
        .unwrap();

        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped_no_id, 1);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(written["inserted"], 2);
        assert_eq!(written["references"]["genre"], 4);
        assert_eq!(written["references"]["platform"], 3);

        let _ = fs::remove_file(csv);
        let _ = fs::remove_file(summary_path);
    }

    #[tokio::test]
    async fn missing_csv_is_an_error() {
        let result = run(MigrateConfig {
            csv_path: Some(scratch("absent.csv")),
            database_url: Some("sqlite::memory:".into()),
            ..Default::default()
        })
        .await;
        assert!(result.is_err());
    }
}
