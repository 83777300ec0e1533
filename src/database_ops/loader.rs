//! Per-record load: primary row, associations, existence gate, details.
//!
//! Two commit units per record: the primary row (associations are committed
//! as they go) and the details unit. A details failure never undoes the first.

use anyhow::Error;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info_span, warn, Instrument};

use super::catalog::{ReferenceKind, ReferenceMaps, CATALOG_BINDINGS};
use super::columns;
use super::db::{CatalogStore, PrimaryStatus};
use super::models::{extract_app_id, GameDetails, GameRow};
use crate::normalization::{parse_csv_list, parse_flag};
use crate::source::SourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Primary,
    Associations,
    ExistenceCheck,
    Details,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStage::Primary => "primary",
            LoadStage::Associations => "associations",
            LoadStage::ExistenceCheck => "existence_check",
            LoadStage::Details => "details",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No usable app id; nothing was written.
    NoIdentifier,
    /// The primary row is not in storage after its insert; associations may
    /// have been attempted, details were not.
    MissingPrimary { app_id: i64 },
}

#[derive(Debug)]
pub enum RecordOutcome {
    Done {
        app_id: i64,
        primary: PrimaryStatus,
    },
    Skipped(SkipReason),
    Failed {
        app_id: i64,
        stage: LoadStage,
        error: Error,
    },
}

/// Every `(kind, reference id)` pair the record links to. Names missing from
/// the catalog are dropped.
pub fn association_targets(record: &SourceRecord, maps: &ReferenceMaps) -> Vec<(ReferenceKind, i64)> {
    let mut targets = Vec::new();
    for binding in CATALOG_BINDINGS
        .iter()
        .filter(|b| b.kind != ReferenceKind::Language)
    {
        for column in binding.columns {
            for name in parse_csv_list(record.get(column)) {
                if let Some(id) = maps.get(binding.kind, &name) {
                    targets.push((binding.kind, id));
                }
            }
        }
    }
    for platform in columns::PLATFORMS {
        if parse_flag(record.get(platform)) {
            if let Some(id) = maps.get(ReferenceKind::Platform, platform) {
                targets.push((ReferenceKind::Platform, id));
            }
        }
    }
    targets
}

/// Load one record. Never returns an error; every failure is folded into the
/// outcome so the caller can log and move on.
pub async fn load_record<S>(store: &mut S, record: &SourceRecord, maps: &ReferenceMaps) -> RecordOutcome
where
    S: CatalogStore + ?Sized,
{
    let Some(app_id) = extract_app_id(record) else {
        return RecordOutcome::Skipped(SkipReason::NoIdentifier);
    };
    // Diagnostics raised while normalizing cells carry the app id via the span.
    load_identified(store, record, maps, app_id)
        .instrument(info_span!("record", app_id))
        .await
}

async fn load_identified<S>(
    store: &mut S,
    record: &SourceRecord,
    maps: &ReferenceMaps,
    app_id: i64,
) -> RecordOutcome
where
    S: CatalogStore + ?Sized,
{
    let game = GameRow::from_record(app_id, record);
    let primary = match store.insert_game(&game).await {
        Ok(status) => status,
        Err(error) => {
            return RecordOutcome::Failed {
                app_id,
                stage: LoadStage::Primary,
                error,
            }
        }
    };
    if primary == PrimaryStatus::AlreadyPresent {
        warn!(app_id, name = game.name.as_deref().unwrap_or(""), "duplicate record, keeping stored row");
    }

    let targets = association_targets(record, maps);
    for (kind, reference_id) in &targets {
        if let Err(error) = store.link(*kind, app_id, *reference_id).await {
            return RecordOutcome::Failed {
                app_id,
                stage: LoadStage::Associations,
                error,
            };
        }
    }
    debug!(app_id, links = targets.len(), "associations written");

    match store.game_exists(app_id).await {
        Ok(true) => {}
        Ok(false) => return RecordOutcome::Skipped(SkipReason::MissingPrimary { app_id }),
        Err(error) => {
            return RecordOutcome::Failed {
                app_id,
                stage: LoadStage::ExistenceCheck,
                error,
            }
        }
    }

    let details = GameDetails::from_record(record, maps);
    if let Err(error) = store.insert_details(app_id, &details).await {
        return RecordOutcome::Failed {
            app_id,
            stage: LoadStage::Details,
            error,
        };
    }

    RecordOutcome::Done { app_id, primary }
}
