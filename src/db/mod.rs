//! Database connection and operations

pub mod ads;
pub mod analytics;
pub mod backup;
pub mod categories;
pub mod countries;
pub mod models;
pub mod schema_sync;
pub mod scrape_configs;
pub mod seed;
pub mod settings;
pub mod sqlite_helpers;
pub mod users;
pub mod videos;

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{info, warn};

pub use ads::{AdRecord, AdRepository, AdType, CreateAd, UpdateAd};
pub use analytics::{AnalyticsRepository, AnalyticsTotals, DailyViews, TopVideo};
pub use backup::{BackupRepository, SnapshotInfo};
pub use categories::{
    CategoryRecord, CategoryRepository, CategoryWithCount, CreateCategory, UpdateCategory,
};
pub use countries::{CountryRecord, CountryRepository, CountryWithCount};
pub use models::{CreateModel, ModelRecord, ModelRepository, ModelWithCount, UpdateModel};
pub use scrape_configs::{
    CreateScrapeConfig, NewScrapeRun, ScrapeConfigError, ScrapeConfigRecord,
    ScrapeConfigRepository, ScrapeRunRecord, ScrapeSourceType, UpdateScrapeConfig,
};
pub use settings::{SettingRecord, SettingsRepository};
pub use users::{CreateUser, RefreshTokenRecord, UserRecord, UsersRepository};
pub use videos::{
    CreateVideo, EntityRef, ScrapedVideo, UpdateVideo, VideoDetail, VideoFilter, VideoRecord,
    VideoRepository, VideoSort,
};

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            page: offset / limit.max(1) + 1,
            limit,
        }
    }
}

/// Result of inserting-or-updating a row keyed by an external identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the SQLite database at `url`
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires keeps
    /// the data alive for the lifetime of the pool.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Sync the schema and seed defaults. Fails when any table could not be synced.
    pub async fn prepare(&self) -> Result<()> {
        let sync = schema_sync::sync_all_schemas(&self.pool).await;
        if !sync.tables_created.is_empty() || !sync.columns_added.is_empty() {
            info!(
                tables_created = sync.tables_created.len(),
                columns_added = sync.columns_added.len(),
                "Schema synchronized"
            );
        }
        if !sync.errors.is_empty() {
            bail!("Schema sync failed: {}", sync.errors.join("; "));
        }

        let seeds = seed::run_seeds(&self.pool).await;
        for error in &seeds.errors {
            warn!(error = %error, "Seed error");
        }

        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get a videos repository
    pub fn videos(&self) -> VideoRepository {
        VideoRepository::new(self.pool.clone())
    }

    /// Get a models repository
    pub fn models(&self) -> ModelRepository {
        ModelRepository::new(self.pool.clone())
    }

    /// Get a categories repository
    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.pool.clone())
    }

    /// Get a countries repository
    pub fn countries(&self) -> CountryRepository {
        CountryRepository::new(self.pool.clone())
    }

    /// Get an ads repository
    pub fn ads(&self) -> AdRepository {
        AdRepository::new(self.pool.clone())
    }

    /// Get a settings repository
    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }

    /// Get a users repository
    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get a scrape config repository
    pub fn scrape_configs(&self) -> ScrapeConfigRepository {
        ScrapeConfigRepository::new(self.pool.clone())
    }

    /// Get an analytics repository
    pub fn analytics(&self) -> AnalyticsRepository {
        AnalyticsRepository::new(self.pool.clone())
    }

    /// Get a backup repository
    pub fn backup(&self) -> BackupRepository {
        BackupRepository::new(self.pool.clone())
    }
}

/// Pick a slug for `table` that no other row uses, appending `-2`, `-3`, ... on collision.
/// `exclude_id` lets an update keep its own slug.
pub(crate) async fn unique_slug<'e, E>(
    executor: E,
    table: &str,
    base: &str,
    exclude_id: Option<&str>,
) -> Result<String>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let base = if base.is_empty() { "item" } else { base };
    let taken: Vec<(String,)> = sqlx::query_as(&format!(
        "SELECT slug FROM {} WHERE (slug = ?1 OR slug LIKE ?2) AND id != ?3",
        table
    ))
    .bind(base)
    .bind(format!("{}-%", base))
    .bind(exclude_id.unwrap_or(""))
    .fetch_all(executor)
    .await?;

    if !taken.iter().any(|(s,)| s == base) {
        return Ok(base.to_string());
    }

    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.iter().any(|(s,)| *s == candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Find a row of `table` by name or slug, creating it when missing. Returns its id.
///
/// `table` must have `id`, `name`, `slug`, `created_at` and `updated_at` columns.
pub(crate) async fn ensure_named(
    conn: &mut sqlx::SqliteConnection,
    table: &str,
    name: &str,
) -> Result<String> {
    let base = crate::services::text_utils::slugify(name);
    let existing: Option<(String,)> = sqlx::query_as(&format!(
        "SELECT id FROM {} WHERE slug = ? OR name = ? COLLATE NOCASE LIMIT 1",
        table
    ))
    .bind(&base)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let slug = unique_slug(&mut *conn, table, &base, None).await?;
    let now = sqlite_helpers::now_iso8601();
    sqlx::query(&format!(
        "INSERT INTO {} (id, name, slug, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        table
    ))
    .bind(&id)
    .bind(name)
    .bind(&slug)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

#[cfg(test)]
pub(crate) async fn test_db() -> Database {
    let db = Database::connect_in_memory().await.unwrap();
    db.prepare().await.unwrap();
    db
}
