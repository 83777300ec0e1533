//! Storage seam for the migration and its sqlx implementations.
//!
//! One connection is held for the whole run. Postgres is the production
//! target; SQLite runs the same statements for local loads and the tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, PgConnection, SqliteConnection};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use super::catalog::{CatalogNames, ReferenceKind, ReferenceMaps};
use super::models::{GameDetails, GameRow};
use crate::util::env::env_flag;

const POSTGRES_SCHEMA: &str = include_str!("../../migrations/postgres/0001_catalog_schema.sql");
const SQLITE_SCHEMA: &str = include_str!("../../migrations/sqlite/0001_catalog_schema.sql");

const INSERT_GAME: &str = "INSERT INTO games (app_id, name, release_date, required_age, about_the_game, header_image, notes)
     VALUES ($1, $2, $3, $4, $5, $6, $7)
     ON CONFLICT (app_id) DO NOTHING";
const GAME_EXISTS: &str = "SELECT 1 FROM games WHERE app_id = $1";
const INSERT_CONTACTS: &str = "INSERT INTO game_contacts (app_id, website, support_url, support_email)
     VALUES ($1, $2, $3, $4)
     ON CONFLICT (app_id) DO NOTHING";
const INSERT_PRICING: &str = "INSERT INTO game_pricing (app_id, price, discount)
     VALUES ($1, $2, $3)
     ON CONFLICT (app_id) DO NOTHING";
const INSERT_REVIEW_AGGREGATES: &str = "INSERT INTO game_reviews (app_id, positive, negative, user_score, score_rank, recommendations)
     VALUES ($1, $2, $3, $4, $5, $6)
     ON CONFLICT (app_id) DO NOTHING";
// No conflict target: review texts are appended on every run.
const INSERT_REVIEW_TEXT: &str = "INSERT INTO reviews (app_id, review_text) VALUES ($1, $2)";
const INSERT_STATS: &str = "INSERT INTO game_stats (app_id, estimated_owners, peak_ccu, dlc_count, achievements,
                             average_playtime_forever, average_playtime_two_weeks,
                             median_playtime_forever, median_playtime_two_weeks)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
     ON CONFLICT (app_id) DO NOTHING";
const INSERT_METACRITIC: &str = "INSERT INTO metacritic (app_id, score, url)
     VALUES ($1, $2, $3)
     ON CONFLICT (app_id) DO NOTHING";
const INSERT_SCREENSHOT: &str =
    "INSERT INTO screenshots (app_id, url) VALUES ($1, $2) ON CONFLICT (url) DO NOTHING";
const INSERT_MOVIE: &str =
    "INSERT INTO movies (app_id, url) VALUES ($1, $2) ON CONFLICT (url) DO NOTHING";
const INSERT_LANGUAGE_LINK: &str = "INSERT INTO game_languages (app_id, language_id, full_audio)
     VALUES ($1, $2, $3)
     ON CONFLICT DO NOTHING";

/// Every table of the catalog schema, references first.
pub const CATALOG_TABLES: [&str; 23] = [
    "platforms",
    "developers",
    "publishers",
    "categories",
    "genres",
    "tags",
    "languages",
    "games",
    "game_contacts",
    "game_pricing",
    "game_reviews",
    "reviews",
    "game_stats",
    "metacritic",
    "screenshots",
    "movies",
    "game_platforms",
    "game_developers",
    "game_publishers",
    "game_categories",
    "game_genres",
    "game_tags",
    "game_languages",
];

/// Split a DDL script into statements. The scripts hold no `;` inside a
/// statement; comment-only chunks are dropped.
fn schema_statements(script: &str) -> impl Iterator<Item = &str> {
    script.split(';').map(str::trim).filter(|chunk| {
        chunk
            .lines()
            .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
    })
}

fn upsert_reference_sql(kind: ReferenceKind) -> String {
    // DO UPDATE rather than DO NOTHING so RETURNING yields the existing id; the
    // update rewrites the key with itself.
    format!(
        "INSERT INTO {} (name) VALUES ($1)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
        kind.table()
    )
}

fn link_sql(kind: ReferenceKind) -> String {
    let (table, column) = kind.junction();
    format!("INSERT INTO {table} (app_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING")
}

/// Result of the primary-row insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryStatus {
    Inserted,
    /// The app id was already stored (earlier run or duplicate row); the
    /// existing row is kept untouched.
    AlreadyPresent,
}

/// Everything the catalog phase and the record loader need from storage.
#[async_trait]
pub trait CatalogStore: Send {
    /// Create every catalog table that does not exist yet.
    async fn apply_schema(&mut self) -> Result<()>;

    /// Upsert-or-fetch every name, in one transaction committed at the end.
    /// Any failure rolls the whole catalog back.
    async fn upsert_references(&mut self, names: &CatalogNames) -> Result<ReferenceMaps>;

    /// Insert the primary row in its own transaction.
    async fn insert_game(&mut self, game: &GameRow) -> Result<PrimaryStatus>;

    /// Conflict-tolerant junction insert, committed immediately.
    async fn link(&mut self, kind: ReferenceKind, app_id: i64, reference_id: i64) -> Result<()>;

    async fn game_exists(&mut self, app_id: i64) -> Result<bool>;

    /// Write all 1:1 and 1:n detail rows as a single unit; on error nothing
    /// from the unit is kept.
    async fn insert_details(&mut self, app_id: i64, details: &GameDetails) -> Result<()>;

    /// Row count of every table in [`CATALOG_TABLES`].
    async fn table_counts(&mut self) -> Result<Vec<(&'static str, i64)>>;
}

/// A [`CatalogStore`] over a single sqlx connection.
pub struct SqlStore<C> {
    conn: C,
}

pub type PgStore = SqlStore<PgConnection>;
pub type SqliteStore = SqlStore<SqliteConnection>;

impl<C> SqlStore<C> {
    pub fn from_connection(conn: C) -> Self {
        Self { conn }
    }

    pub fn connection(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl PgStore {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(database_url)?;

        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            options = options.ssl_mode(PgSslMode::Require);
        }
        if !env_flag("USE_PREPARED", false) {
            // PgBouncer txn mode safe
            options = options.statement_cache_capacity(0);
        }

        let conn = PgConnection::connect_with(&options)
            .await
            .context("connect to postgres")?;
        info!("connected to db");
        Ok(Self::from_connection(conn))
    }
}

impl SqliteStore {
    #[instrument]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let conn = SqliteConnection::connect_with(&options)
            .await
            .context("open sqlite database")?;
        info!("connected to sqlite db");
        Ok(Self::from_connection(conn))
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }
}

/// Open the backend named by the URL scheme: `sqlite:` URLs get SQLite,
/// anything else is handed to Postgres.
pub async fn open_store(database_url: &str) -> Result<Box<dyn CatalogStore>> {
    if database_url.starts_with("sqlite:") {
        Ok(Box::new(SqliteStore::connect(database_url).await?))
    } else {
        Ok(Box::new(PgStore::connect(database_url).await?))
    }
}

/// Implements [`CatalogStore`] for a concrete sqlx connection type. The SQL is
/// shared; only the schema script differs per backend.
macro_rules! sql_catalog_store {
    ($conn:ty, $schema:expr) => {
        impl SqlStore<$conn> {
            async fn write_details(
                conn: &mut $conn,
                app_id: i64,
                details: &GameDetails,
            ) -> Result<()> {
                let contact = &details.contact;
                sqlx::query(INSERT_CONTACTS)
                    .bind(app_id)
                    .bind(contact.website.as_deref())
                    .bind(contact.support_url.as_deref())
                    .bind(contact.support_email.as_deref())
                    .execute(&mut *conn)
                    .await
                    .context("insert game_contacts")?;

                if let Some(pricing) = &details.pricing {
                    sqlx::query(INSERT_PRICING)
                        .bind(app_id)
                        .bind(pricing.price)
                        .bind(pricing.discount)
                        .execute(&mut *conn)
                        .await
                        .context("insert game_pricing")?;
                }

                let reviews = &details.review_aggregates;
                sqlx::query(INSERT_REVIEW_AGGREGATES)
                    .bind(app_id)
                    .bind(reviews.positive)
                    .bind(reviews.negative)
                    .bind(reviews.user_score)
                    .bind(reviews.score_rank)
                    .bind(reviews.recommendations)
                    .execute(&mut *conn)
                    .await
                    .context("insert game_reviews")?;

                for text in &details.review_texts {
                    sqlx::query(INSERT_REVIEW_TEXT)
                        .bind(app_id)
                        .bind(text.as_str())
                        .execute(&mut *conn)
                        .await
                        .context("insert reviews")?;
                }

                let stats = &details.stats;
                sqlx::query(INSERT_STATS)
                    .bind(app_id)
                    .bind(stats.estimated_owners.as_deref())
                    .bind(stats.peak_ccu)
                    .bind(stats.dlc_count)
                    .bind(stats.achievements)
                    .bind(stats.average_playtime_forever)
                    .bind(stats.average_playtime_two_weeks)
                    .bind(stats.median_playtime_forever)
                    .bind(stats.median_playtime_two_weeks)
                    .execute(&mut *conn)
                    .await
                    .context("insert game_stats")?;

                if let Some(critic) = &details.critic {
                    sqlx::query(INSERT_METACRITIC)
                        .bind(app_id)
                        .bind(critic.score)
                        .bind(critic.url.as_deref())
                        .execute(&mut *conn)
                        .await
                        .context("insert metacritic")?;
                }

                for url in &details.screenshots {
                    sqlx::query(INSERT_SCREENSHOT)
                        .bind(app_id)
                        .bind(url.as_str())
                        .execute(&mut *conn)
                        .await
                        .context("insert screenshots")?;
                }
                for url in &details.movies {
                    sqlx::query(INSERT_MOVIE)
                        .bind(app_id)
                        .bind(url.as_str())
                        .execute(&mut *conn)
                        .await
                        .context("insert movies")?;
                }

                for language in &details.languages {
                    sqlx::query(INSERT_LANGUAGE_LINK)
                        .bind(app_id)
                        .bind(language.language_id)
                        .bind(language.full_audio)
                        .execute(&mut *conn)
                        .await
                        .context("insert game_languages")?;
                }
                Ok(())
            }
        }

        #[async_trait]
        impl CatalogStore for SqlStore<$conn> {
            async fn apply_schema(&mut self) -> Result<()> {
                for statement in schema_statements($schema) {
                    sqlx::query(statement)
                        .execute(&mut self.conn)
                        .await
                        .with_context(|| format!("apply catalog schema: {statement}"))?;
                }
                info!("catalog schema ensured");
                Ok(())
            }

            async fn upsert_references(&mut self, names: &CatalogNames) -> Result<ReferenceMaps> {
                let mut tx = self.conn.begin().await.context("begin catalog transaction")?;
                let mut maps = ReferenceMaps::default();
                for (kind, batch) in names {
                    let sql = upsert_reference_sql(*kind);
                    for name in batch {
                        let id: i64 = sqlx::query_scalar(&sql)
                            .bind(name.as_str())
                            .fetch_one(&mut *tx)
                            .await
                            .with_context(|| format!("upsert {kind} {name:?}"))?;
                        maps.insert(*kind, name.clone(), id);
                    }
                    debug!(category = %kind, rows = batch.len(), "reference names upserted");
                }
                tx.commit().await.context("commit reference catalog")?;
                Ok(maps)
            }

            async fn insert_game(&mut self, game: &GameRow) -> Result<PrimaryStatus> {
                let mut tx = self.conn.begin().await.context("begin games transaction")?;
                let result = sqlx::query(INSERT_GAME)
                    .bind(game.app_id)
                    .bind(game.name.as_deref())
                    .bind(game.release_date)
                    .bind(game.required_age)
                    .bind(game.about_the_game.as_deref())
                    .bind(game.header_image.as_deref())
                    .bind(game.notes.as_deref())
                    .execute(&mut *tx)
                    .await;
                match result {
                    Ok(done) => {
                        tx.commit().await.context("commit games row")?;
                        if done.rows_affected() == 0 {
                            Ok(PrimaryStatus::AlreadyPresent)
                        } else {
                            Ok(PrimaryStatus::Inserted)
                        }
                    }
                    Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                        tx.rollback().await.context("rollback games row")?;
                        Ok(PrimaryStatus::AlreadyPresent)
                    }
                    Err(err) => {
                        if let Err(rollback_err) = tx.rollback().await {
                            warn!(app_id = game.app_id, error = %rollback_err, "games rollback failed");
                        }
                        Err(err).context("insert games row")
                    }
                }
            }

            async fn link(
                &mut self,
                kind: ReferenceKind,
                app_id: i64,
                reference_id: i64,
            ) -> Result<()> {
                sqlx::query(&link_sql(kind))
                    .bind(app_id)
                    .bind(reference_id)
                    .execute(&mut self.conn)
                    .await
                    .with_context(|| format!("link {kind} {reference_id}"))?;
                Ok(())
            }

            async fn game_exists(&mut self, app_id: i64) -> Result<bool> {
                let row = sqlx::query(GAME_EXISTS)
                    .bind(app_id)
                    .fetch_optional(&mut self.conn)
                    .await
                    .context("check games row")?;
                Ok(row.is_some())
            }

            async fn insert_details(&mut self, app_id: i64, details: &GameDetails) -> Result<()> {
                let mut tx = self.conn.begin().await.context("begin details transaction")?;
                match Self::write_details(&mut *tx, app_id, details).await {
                    Ok(()) => {
                        tx.commit().await.context("commit details")?;
                        Ok(())
                    }
                    Err(err) => {
                        if let Err(rollback_err) = tx.rollback().await {
                            warn!(app_id, error = %rollback_err, "details rollback failed");
                        }
                        Err(err)
                    }
                }
            }

            async fn table_counts(&mut self) -> Result<Vec<(&'static str, i64)>> {
                let mut out = Vec::with_capacity(CATALOG_TABLES.len());
                for table in CATALOG_TABLES {
                    let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                        .fetch_one(&mut self.conn)
                        .await
                        .with_context(|| format!("count {table}"))?;
                    out.push((table, rows));
                }
                Ok(out)
            }
        }
    };
}

sql_catalog_store!(PgConnection, POSTGRES_SCHEMA);
sql_catalog_store!(SqliteConnection, SQLITE_SCHEMA);

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Fresh in-memory SQLite store with the catalog schema applied.
    pub async fn memory_store() -> SqliteStore {
        let mut store = SqliteStore::in_memory().await.unwrap();
        store.apply_schema().await.unwrap();
        store
    }

    pub async fn count(store: &mut SqliteStore, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.connection())
            .await
            .unwrap()
    }

    pub async fn count_for(store: &mut SqliteStore, table: &str, app_id: i64) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE app_id = $1"))
            .bind(app_id)
            .fetch_one(store.connection())
            .await
            .unwrap()
    }

    /// Make every insert into `table` for `app_id` fail with a storage error.
    pub async fn fail_inserts(store: &mut SqliteStore, table: &str, app_id: i64) {
        let sql = format!(
            "CREATE TRIGGER fail_{table}_{app_id} BEFORE INSERT ON {table}
             WHEN NEW.app_id = {app_id}
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;"
        );
        sqlx::raw_sql(&sql).execute(store.connection()).await.unwrap();
    }

    /// Make inserts into `table` for `app_id` silently write nothing.
    pub async fn ignore_inserts(store: &mut SqliteStore, table: &str, app_id: i64) {
        let sql = format!(
            "CREATE TRIGGER ignore_{table}_{app_id} BEFORE INSERT ON {table}
             WHEN NEW.app_id = {app_id}
             BEGIN SELECT RAISE(IGNORE); END;"
        );
        sqlx::raw_sql(&sql).execute(store.connection()).await.unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::database_ops::models::{ContactInfo, LanguageLink, Pricing};
    use indexmap::{IndexMap, IndexSet};

    fn names(kind: ReferenceKind, items: &[&str]) -> CatalogNames {
        let mut out: CatalogNames = IndexMap::new();
        out.insert(kind, items.iter().map(|s| s.to_string()).collect::<IndexSet<_>>());
        out
    }

    fn game(app_id: i64) -> GameRow {
        GameRow {
            app_id,
            name: Some(format!("Game {app_id}")),
            release_date: chrono::NaiveDate::from_ymd_opt(2020, 1, 1),
            required_age: Some(0),
            about_the_game: None,
            header_image: None,
            notes: None,
        }
    }

    #[test]
    fn schema_scripts_split_into_create_statements() {
        for script in [POSTGRES_SCHEMA, SQLITE_SCHEMA] {
            let statements: Vec<_> = schema_statements(script).collect();
            assert_eq!(statements.len(), CATALOG_TABLES.len());
            assert!(statements.iter().all(|s| s.contains("CREATE TABLE IF NOT EXISTS")));
        }
    }

    #[tokio::test]
    async fn schema_is_reapplicable() {
        let mut store = memory_store().await;
        store.apply_schema().await.unwrap();
        assert_eq!(count(&mut store, "games").await, 0);
    }

    #[tokio::test]
    async fn reupserting_a_name_keeps_one_row_and_one_id() {
        let mut store = memory_store().await;
        let first = store
            .upsert_references(&names(ReferenceKind::Genre, &["Action", "Indie"]))
            .await
            .unwrap();
        let second = store
            .upsert_references(&names(ReferenceKind::Genre, &["Action"]))
            .await
            .unwrap();
        assert_eq!(count(&mut store, "genres").await, 2);
        assert_eq!(
            first.get(ReferenceKind::Genre, "Action"),
            second.get(ReferenceKind::Genre, "Action")
        );
        assert!(first.get(ReferenceKind::Genre, "Action").is_some());
    }

    #[tokio::test]
    async fn insert_game_reports_existing_rows() {
        let mut store = memory_store().await;
        assert_eq!(store.insert_game(&game(10)).await.unwrap(), PrimaryStatus::Inserted);
        assert_eq!(
            store.insert_game(&game(10)).await.unwrap(),
            PrimaryStatus::AlreadyPresent
        );
        assert_eq!(count(&mut store, "games").await, 1);
        assert!(store.game_exists(10).await.unwrap());
        assert!(!store.game_exists(11).await.unwrap());
    }

    #[tokio::test]
    async fn links_are_idempotent() {
        let mut store = memory_store().await;
        let maps = store
            .upsert_references(&names(ReferenceKind::Tag, &["Co-op"]))
            .await
            .unwrap();
        store.insert_game(&game(20)).await.unwrap();
        let tag = maps.get(ReferenceKind::Tag, "Co-op").unwrap();
        store.link(ReferenceKind::Tag, 20, tag).await.unwrap();
        store.link(ReferenceKind::Tag, 20, tag).await.unwrap();
        assert_eq!(count(&mut store, "game_tags").await, 1);
    }

    #[tokio::test]
    async fn failed_details_unit_leaves_no_detail_rows() {
        let mut store = memory_store().await;
        let maps = store
            .upsert_references(&names(ReferenceKind::Language, &["English"]))
            .await
            .unwrap();
        store.insert_game(&game(30)).await.unwrap();
        fail_inserts(&mut store, "game_stats", 30).await;

        let details = GameDetails {
            contact: ContactInfo {
                website: Some("https://example.com".into()),
                ..Default::default()
            },
            pricing: Some(Pricing {
                price: 9.99,
                discount: None,
            }),
            review_texts: vec!["Fine".into()],
            screenshots: vec!["https://cdn.example.com/s1.jpg".into()],
            languages: vec![LanguageLink {
                language_id: maps.get(ReferenceKind::Language, "English").unwrap(),
                full_audio: true,
            }],
            ..Default::default()
        };
        assert!(store.insert_details(30, &details).await.is_err());
        for table in ["game_contacts", "game_pricing", "game_reviews", "reviews", "screenshots"] {
            assert_eq!(count(&mut store, table).await, 0, "{table}");
        }
        assert_eq!(count(&mut store, "game_languages").await, 0);
        assert!(store.game_exists(30).await.unwrap());
    }

    #[tokio::test]
    async fn table_counts_cover_the_schema() {
        let mut store = memory_store().await;
        store.insert_game(&game(50)).await.unwrap();
        let counts = store.table_counts().await.unwrap();
        assert_eq!(counts.len(), CATALOG_TABLES.len());
        assert!(counts.contains(&("games", 1)));
        assert!(counts.contains(&("reviews", 0)));
    }

    #[tokio::test]
    async fn open_store_picks_sqlite_by_scheme() {
        let mut store = open_store("sqlite::memory:").await.unwrap();
        store.apply_schema().await.unwrap();
        assert!(!store.game_exists(1).await.unwrap());
    }

    #[tokio::test]
    async fn media_urls_are_globally_unique() {
        let mut store = memory_store().await;
        store.insert_game(&game(40)).await.unwrap();
        store.insert_game(&game(41)).await.unwrap();
        let details = GameDetails {
            movies: vec!["https://cdn.example.com/trailer.mp4".into()],
            ..Default::default()
        };
        store.insert_details(40, &details).await.unwrap();
        store.insert_details(41, &details).await.unwrap();
        assert_eq!(count(&mut store, "movies").await, 1);
        assert_eq!(count_for(&mut store, "movies", 40).await, 1);
    }
}
