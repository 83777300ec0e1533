//! Reference catalog phase: every distinct categorical value gets a stable id
//! before any record is loaded.

use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::info;

use super::columns;
use super::db::CatalogStore;
use crate::normalization::parse_csv_list;
use crate::source::SourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Platform,
    Developer,
    Publisher,
    Category,
    Genre,
    Tag,
    Language,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 7] = [
        ReferenceKind::Platform,
        ReferenceKind::Developer,
        ReferenceKind::Publisher,
        ReferenceKind::Category,
        ReferenceKind::Genre,
        ReferenceKind::Tag,
        ReferenceKind::Language,
    ];

    pub fn table(self) -> &'static str {
        match self {
            ReferenceKind::Platform => "platforms",
            ReferenceKind::Developer => "developers",
            ReferenceKind::Publisher => "publishers",
            ReferenceKind::Category => "categories",
            ReferenceKind::Genre => "genres",
            ReferenceKind::Tag => "tags",
            ReferenceKind::Language => "languages",
        }
    }

    /// Junction table and its reference column.
    pub fn junction(self) -> (&'static str, &'static str) {
        match self {
            ReferenceKind::Platform => ("game_platforms", "platform_id"),
            ReferenceKind::Developer => ("game_developers", "developer_id"),
            ReferenceKind::Publisher => ("game_publishers", "publisher_id"),
            ReferenceKind::Category => ("game_categories", "category_id"),
            ReferenceKind::Genre => ("game_genres", "genre_id"),
            ReferenceKind::Tag => ("game_tags", "tag_id"),
            ReferenceKind::Language => ("game_languages", "language_id"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReferenceKind::Platform => "platform",
            ReferenceKind::Developer => "developer",
            ReferenceKind::Publisher => "publisher",
            ReferenceKind::Category => "category",
            ReferenceKind::Genre => "genre",
            ReferenceKind::Tag => "tag",
            ReferenceKind::Language => "language",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Source columns feeding one data-derived category.
#[derive(Debug, Clone, Copy)]
pub struct CatalogBinding {
    pub kind: ReferenceKind,
    pub columns: &'static [&'static str],
}

pub const CATALOG_BINDINGS: [CatalogBinding; 6] = [
    CatalogBinding {
        kind: ReferenceKind::Developer,
        columns: &[columns::DEVELOPERS],
    },
    CatalogBinding {
        kind: ReferenceKind::Publisher,
        columns: &[columns::PUBLISHERS],
    },
    CatalogBinding {
        kind: ReferenceKind::Category,
        columns: &[columns::CATEGORIES],
    },
    CatalogBinding {
        kind: ReferenceKind::Genre,
        columns: &[columns::GENRES],
    },
    CatalogBinding {
        kind: ReferenceKind::Tag,
        columns: &[columns::TAGS],
    },
    // Full-audio names are languages too.
    CatalogBinding {
        kind: ReferenceKind::Language,
        columns: &[columns::SUPPORTED_LANGUAGES, columns::FULL_AUDIO_LANGUAGES],
    },
];

/// Distinct names per category, in first-seen order.
pub type CatalogNames = IndexMap<ReferenceKind, IndexSet<String>>;

/// Immutable name → id snapshot produced by the catalog phase.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMaps {
    ids: HashMap<ReferenceKind, HashMap<String, i64>>,
}

impl ReferenceMaps {
    pub fn get(&self, kind: ReferenceKind, name: &str) -> Option<i64> {
        self.ids.get(&kind)?.get(name).copied()
    }

    pub fn count(&self, kind: ReferenceKind) -> usize {
        self.ids.get(&kind).map_or(0, HashMap::len)
    }

    pub(crate) fn insert(&mut self, kind: ReferenceKind, name: String, id: i64) {
        self.ids.entry(kind).or_default().insert(name, id);
    }
}

/// Collect the fixed platform names plus every distinct list item of the
/// bound columns across all records.
pub fn collect_catalog_names(records: &[SourceRecord]) -> CatalogNames {
    let mut names = CatalogNames::new();
    names.insert(
        ReferenceKind::Platform,
        columns::PLATFORMS.iter().map(|p| p.to_string()).collect(),
    );
    for binding in &CATALOG_BINDINGS {
        let set = names.entry(binding.kind).or_default();
        for column in binding.columns {
            for record in records {
                set.extend(parse_csv_list(record.get(column)));
            }
        }
    }
    names
}

/// Run the catalog phase. Any failure is fatal for the run.
pub async fn build_reference_catalog<S>(store: &mut S, records: &[SourceRecord]) -> Result<ReferenceMaps>
where
    S: CatalogStore + ?Sized,
{
    let names = collect_catalog_names(records);
    for (kind, batch) in &names {
        info!(category = %kind, distinct = batch.len(), "catalog names collected");
    }
    let maps = store
        .upsert_references(&names)
        .await
        .context("reference catalog phase")?;
    info!("reference catalog built");
    Ok(maps)
}
