//! Migration driver: catalog phase, then every record in input order.

use anyhow::Result;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};

use super::catalog::{build_reference_catalog, ReferenceKind};
use super::db::{CatalogStore, PrimaryStatus};
use super::loader::{load_record, LoadStage, RecordOutcome, SkipReason};
use crate::source::SourceRecord;

pub const DEFAULT_PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Emit a progress line every this many records; zero disables it.
    pub progress_every: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureCounts {
    pub primary: usize,
    pub associations: usize,
    pub existence_check: usize,
    pub details: usize,
}

impl FailureCounts {
    fn bump(&mut self, stage: LoadStage) {
        match stage {
            LoadStage::Primary => self.primary += 1,
            LoadStage::Associations => self.associations += 1,
            LoadStage::ExistenceCheck => self.existence_check += 1,
            LoadStage::Details => self.details += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.primary + self.associations + self.existence_check + self.details
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub total_records: usize,
    /// Records that went through the details unit.
    pub loaded: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub skipped_no_id: usize,
    pub missing_primary: usize,
    pub failed: FailureCounts,
    /// Catalog size per category after the catalog phase.
    pub references: BTreeMap<ReferenceKind, usize>,
    pub elapsed_ms: u128,
}

impl MigrationSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Done { primary, .. } => {
                self.loaded += 1;
                match primary {
                    PrimaryStatus::Inserted => self.inserted += 1,
                    PrimaryStatus::AlreadyPresent => self.already_present += 1,
                }
            }
            RecordOutcome::Skipped(SkipReason::NoIdentifier) => self.skipped_no_id += 1,
            RecordOutcome::Skipped(SkipReason::MissingPrimary { .. }) => self.missing_primary += 1,
            RecordOutcome::Failed { stage, .. } => self.failed.bump(*stage),
        }
    }
}

fn report(index: usize, outcome: &RecordOutcome) {
    match outcome {
        RecordOutcome::Done { .. } | RecordOutcome::Skipped(SkipReason::NoIdentifier) => {}
        RecordOutcome::Skipped(SkipReason::MissingPrimary { app_id }) => {
            warn!(row = index + 1, app_id, "game row missing after insert, details skipped");
        }
        RecordOutcome::Failed {
            app_id,
            stage,
            error,
        } => {
            error!(row = index + 1, app_id, %stage, error = ?error, "record load failed");
        }
    }
}

/// Run the whole migration. Only a catalog failure is an error; record
/// failures are logged, counted and skipped. Each record is tried once.
pub async fn run_migration<S>(
    store: &mut S,
    records: &[SourceRecord],
    opts: &MigrationOptions,
) -> Result<MigrationSummary>
where
    S: CatalogStore + ?Sized,
{
    let started = Instant::now();
    let total = records.len();
    info!(total, "starting migration");

    let maps = build_reference_catalog(store, records).await?;
    let mut summary = MigrationSummary {
        total_records: total,
        references: ReferenceKind::ALL
            .iter()
            .map(|kind| (*kind, maps.count(*kind)))
            .collect(),
        ..Default::default()
    };
    info!(
        references = %summary.references.iter().map(|(kind, rows)| format!("{kind}={rows}")).join(", "),
        "reference catalog ready"
    );

    for (idx, record) in records.iter().enumerate() {
        if opts.progress_every > 0 && idx % opts.progress_every == 0 {
            info!("processing record {}/{}", idx + 1, total);
        }
        let outcome = load_record(store, record, &maps).await;
        report(idx, &outcome);
        summary.record(&outcome);
    }

    summary.elapsed_ms = started.elapsed().as_millis();
    info!(
        loaded = summary.loaded,
        inserted = summary.inserted,
        already_present = summary.already_present,
        skipped_no_id = summary.skipped_no_id,
        failed = summary.failed.total(),
        elapsed_ms = summary.elapsed_ms as u64,
        "migration finished"
    );
    Ok(summary)
}
