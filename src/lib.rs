pub mod cli;
pub mod database_ops;
pub mod normalization;
pub mod source;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use database_ops::catalog::{build_reference_catalog, ReferenceKind, ReferenceMaps};
pub use database_ops::db::{open_store, CatalogStore, PgStore, SqliteStore};
pub use database_ops::loader::{load_record, RecordOutcome};
pub use database_ops::pipeline::{run_migration, MigrationOptions, MigrationSummary};
pub use source::SourceRecord;
