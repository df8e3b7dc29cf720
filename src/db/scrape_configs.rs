//! Scrape configuration and scrape run history
//!
//! A scrape config describes one recurring ingestion job against the external
//! catalog: which listing to read, which page window, and how often.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{datetime_to_str, now_iso8601, row_datetime, row_datetime_opt};

// ============================================================================
// Source Type
// ============================================================================

/// Which catalog listing a config scrapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeSourceType {
    Movies,
    Categories,
    Actors,
    Countries,
}

impl ScrapeSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Categories => "categories",
            Self::Actors => "actors",
            Self::Countries => "countries",
        }
    }
}

impl fmt::Display for ScrapeSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeSourceType {
    type Err = ScrapeConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movies" => Ok(Self::Movies),
            "categories" => Ok(Self::Categories),
            "actors" => Ok(Self::Actors),
            "countries" => Ok(Self::Countries),
            other => Err(ScrapeConfigError::UnknownSourceType(other.to_string())),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Longest accepted interval: one year
pub const MAX_INTERVAL_MINUTES: i64 = 365 * 24 * 60;

/// Rejected scrape config writes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScrapeConfigError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("start_page must be at least 1")]
    StartPageTooLow,
    #[error("start_page ({start}) must not exceed end_page ({end})")]
    InvalidPageRange { start: i64, end: i64 },
    #[error("interval_minutes must be at least 1")]
    IntervalTooShort,
    #[error("interval_minutes must not exceed {MAX_INTERVAL_MINUTES}")]
    IntervalTooLong,
    #[error("unknown source type '{0}'")]
    UnknownSourceType(String),
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeConfigRecord {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub source_type: ScrapeSourceType,
    pub start_page: i64,
    pub end_page: i64,
    pub keyword: Option<String>,
    pub interval_minutes: i64,
    pub update_existing: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeConfigRecord {
    /// Stored interval clamped to the accepted range. Rows written before
    /// the upper bound existed still yield a usable timer.
    fn clamped_minutes(&self) -> i64 {
        self.interval_minutes.clamp(1, MAX_INTERVAL_MINUTES)
    }

    /// Interval as a chrono duration (for `next_run` arithmetic)
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.clamped_minutes())
    }

    /// Interval as a timer period
    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.clamped_minutes().unsigned_abs() * 60)
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ScrapeConfigRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let source_type: String = row.try_get("source_type")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            enabled: row.try_get("enabled")?,
            source_type: source_type
                .parse()
                .map_err(|e: ScrapeConfigError| sqlx::Error::Decode(e.into()))?,
            start_page: row.try_get("start_page")?,
            end_page: row.try_get("end_page")?,
            keyword: row.try_get("keyword")?,
            interval_minutes: row.try_get("interval_minutes")?,
            update_existing: row.try_get("update_existing")?,
            last_run: row_datetime_opt(row, "last_run")?,
            next_run: row_datetime_opt(row, "next_run")?,
            created_at: row_datetime(row, "created_at")?,
            updated_at: row_datetime(row, "updated_at")?,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_page() -> i64 {
    1
}

fn default_interval() -> i64 {
    60
}

/// Full set of writable fields
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScrapeConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub source_type: ScrapeSourceType,
    #[serde(default = "default_page")]
    pub start_page: i64,
    #[serde(default = "default_page")]
    pub end_page: i64,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default = "default_interval")]
    pub interval_minutes: i64,
    #[serde(default)]
    pub update_existing: bool,
}

impl CreateScrapeConfig {
    pub fn validate(&self) -> Result<(), ScrapeConfigError> {
        if self.name.trim().is_empty() {
            return Err(ScrapeConfigError::EmptyName);
        }
        if self.start_page < 1 {
            return Err(ScrapeConfigError::StartPageTooLow);
        }
        if self.start_page > self.end_page {
            return Err(ScrapeConfigError::InvalidPageRange {
                start: self.start_page,
                end: self.end_page,
            });
        }
        if self.interval_minutes < 1 {
            return Err(ScrapeConfigError::IntervalTooShort);
        }
        if self.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ScrapeConfigError::IntervalTooLong);
        }
        Ok(())
    }

    fn normalized_keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
    }
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateScrapeConfig {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub source_type: Option<ScrapeSourceType>,
    pub start_page: Option<i64>,
    pub end_page: Option<i64>,
    #[serde(default, with = "double_option")]
    pub keyword: Option<Option<String>>,
    pub interval_minutes: Option<i64>,
    pub update_existing: Option<bool>,
}

impl UpdateScrapeConfig {
    /// Merge onto an existing record, producing the full field set to validate and store
    pub fn apply_to(self, existing: &ScrapeConfigRecord) -> CreateScrapeConfig {
        CreateScrapeConfig {
            name: self.name.unwrap_or_else(|| existing.name.clone()),
            enabled: self.enabled.unwrap_or(existing.enabled),
            source_type: self.source_type.unwrap_or(existing.source_type),
            start_page: self.start_page.unwrap_or(existing.start_page),
            end_page: self.end_page.unwrap_or(existing.end_page),
            keyword: self.keyword.unwrap_or_else(|| existing.keyword.clone()),
            interval_minutes: self.interval_minutes.unwrap_or(existing.interval_minutes),
            update_existing: self.update_existing.unwrap_or(existing.update_existing),
        }
    }
}

/// Distinguishes `"keyword": null` (clear) from a missing field (keep)
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// One executed tick, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRunRecord {
    pub id: String,
    pub config_id: String,
    pub trigger: String,
    pub status: String,
    pub pages: i64,
    pub fetched: i64,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ScrapeRunRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            config_id: row.try_get("config_id")?,
            trigger: row.try_get("trigger")?,
            status: row.try_get("status")?,
            pages: row.try_get("pages")?,
            fetched: row.try_get("fetched")?,
            inserted: row.try_get("inserted")?,
            updated: row.try_get("updated")?,
            skipped: row.try_get("skipped")?,
            error: row.try_get("error")?,
            started_at: row_datetime(row, "started_at")?,
            finished_at: row_datetime(row, "finished_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewScrapeRun {
    pub config_id: String,
    pub trigger: String,
    pub status: String,
    pub pages: i64,
    pub fetched: i64,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ============================================================================
// Repository
// ============================================================================

pub struct ScrapeConfigRepository {
    pool: SqlitePool,
}

impl ScrapeConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All configs, oldest first
    pub async fn list(&self) -> Result<Vec<ScrapeConfigRecord>> {
        let records = sqlx::query_as::<_, ScrapeConfigRecord>(
            "SELECT * FROM scrape_configs ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ScrapeConfigRecord>> {
        let record =
            sqlx::query_as::<_, ScrapeConfigRecord>("SELECT * FROM scrape_configs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// Insert a validated config
    pub async fn create(
        &self,
        input: &CreateScrapeConfig,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<ScrapeConfigRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO scrape_configs (
                id, name, enabled, source_type, start_page, end_page, keyword,
                interval_minutes, update_existing, next_run, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.enabled)
        .bind(input.source_type.as_str())
        .bind(input.start_page)
        .bind(input.end_page)
        .bind(input.normalized_keyword())
        .bind(input.interval_minutes)
        .bind(input.update_existing)
        .bind(next_run.map(datetime_to_str))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create scrape config"))
    }

    /// Replace every writable field of a config
    pub async fn update(
        &self,
        id: &str,
        input: &CreateScrapeConfig,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<Option<ScrapeConfigRecord>> {
        let result = sqlx::query(
            r#"
            UPDATE scrape_configs SET
                name = ?, enabled = ?, source_type = ?, start_page = ?, end_page = ?,
                keyword = ?, interval_minutes = ?, update_existing = ?, next_run = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.name.trim())
        .bind(input.enabled)
        .bind(input.source_type.as_str())
        .bind(input.start_page)
        .bind(input.end_page)
        .bind(input.normalized_keyword())
        .bind(input.interval_minutes)
        .bind(input.update_existing)
        .bind(next_run.map(datetime_to_str))
        .bind(now_iso8601())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Persist the time the live timer will next fire
    pub async fn set_next_run(&self, id: &str, next_run: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE scrape_configs SET next_run = ?, updated_at = ? WHERE id = ?")
            .bind(datetime_to_str(next_run))
            .bind(now_iso8601())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scrape_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist the timestamps of a successful run
    pub async fn record_success(
        &self,
        id: &str,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE scrape_configs SET last_run = ?, next_run = ?, updated_at = ? WHERE id = ?")
            .bind(datetime_to_str(last_run))
            .bind(datetime_to_str(next_run))
            .bind(now_iso8601())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Run history
    // ========================================================================

    pub async fn insert_run(&self, run: &NewScrapeRun) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO scrape_runs (
                id, config_id, trigger, status, pages, fetched, inserted, updated, skipped,
                error, started_at, finished_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&run.config_id)
        .bind(&run.trigger)
        .bind(&run.status)
        .bind(run.pages)
        .bind(run.fetched)
        .bind(run.inserted)
        .bind(run.updated)
        .bind(run.skipped)
        .bind(&run.error)
        .bind(datetime_to_str(run.started_at))
        .bind(datetime_to_str(run.finished_at))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Most recent runs, newest first, optionally for one config
    pub async fn recent_runs(
        &self,
        config_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ScrapeRunRecord>> {
        let records = match config_id {
            Some(config_id) => {
                sqlx::query_as::<_, ScrapeRunRecord>(
                    "SELECT * FROM scrape_runs WHERE config_id = ? ORDER BY started_at DESC LIMIT ?",
                )
                .bind(config_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ScrapeRunRecord>(
                    "SELECT * FROM scrape_runs ORDER BY started_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(records)
    }

    /// Delete run history older than `before`
    pub async fn prune_runs(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scrape_runs WHERE started_at < ?")
            .bind(datetime_to_str(before))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn movies(start: i64, end: i64, interval: i64) -> CreateScrapeConfig {
        CreateScrapeConfig {
            name: "Latest movies".to_string(),
            enabled: true,
            source_type: ScrapeSourceType::Movies,
            start_page: start,
            end_page: end,
            keyword: Some("  ".to_string()),
            interval_minutes: interval,
            update_existing: false,
        }
    }

    #[test]
    fn test_validation() {
        assert!(movies(1, 5, 15).validate().is_ok());
        assert!(movies(3, 3, 1).validate().is_ok());
        assert_matches!(
            movies(6, 5, 15).validate(),
            Err(ScrapeConfigError::InvalidPageRange { start: 6, end: 5 })
        );
        assert_matches!(movies(0, 5, 15).validate(), Err(ScrapeConfigError::StartPageTooLow));
        assert_matches!(movies(1, 5, 0).validate(), Err(ScrapeConfigError::IntervalTooShort));
        assert!(movies(1, 5, MAX_INTERVAL_MINUTES).validate().is_ok());
        assert_matches!(
            movies(1, 5, 1_000_000_000_000).validate(),
            Err(ScrapeConfigError::IntervalTooLong)
        );
    }

    #[tokio::test]
    async fn test_oversized_stored_interval_is_clamped() {
        let db = test_db().await;
        let repo = db.scrape_configs();
        let config = repo.create(&movies(1, 5, 15), None).await.unwrap();

        sqlx::query("UPDATE scrape_configs SET interval_minutes = ? WHERE id = ?")
            .bind(i64::MAX)
            .bind(&config.id)
            .execute(db.pool())
            .await
            .unwrap();

        let stored = repo.get(&config.id).await.unwrap().unwrap();
        assert_eq!(stored.interval(), Duration::minutes(MAX_INTERVAL_MINUTES));
        assert_eq!(
            stored.period(),
            std::time::Duration::from_secs(MAX_INTERVAL_MINUTES as u64 * 60)
        );
        assert!(Utc::now().checked_add_signed(stored.interval()).is_some());
    }

    #[tokio::test]
    async fn test_set_next_run() {
        let db = test_db().await;
        let repo = db.scrape_configs();
        let config = repo.create(&movies(1, 5, 15), None).await.unwrap();

        let next = Utc::now() + Duration::minutes(15);
        repo.set_next_run(&config.id, next).await.unwrap();
        let stored = repo.get(&config.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run.unwrap().timestamp(), next.timestamp());
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!("actors".parse::<ScrapeSourceType>().unwrap(), ScrapeSourceType::Actors);
        assert_matches!(
            "tv".parse::<ScrapeSourceType>(),
            Err(ScrapeConfigError::UnknownSourceType(_))
        );
    }

    #[test]
    fn test_update_keyword_null_clears() {
        let update: UpdateScrapeConfig = serde_json::from_str(r#"{"keyword": null}"#).unwrap();
        assert_eq!(update.keyword, Some(None));
        let update: UpdateScrapeConfig = serde_json::from_str(r#"{"end_page": 9}"#).unwrap();
        assert_eq!(update.keyword, None);
        assert_eq!(update.end_page, Some(9));
    }

    #[tokio::test]
    async fn test_crud_and_record_success() {
        let db = test_db().await;
        let repo = db.scrape_configs();

        let config = repo.create(&movies(1, 5, 15), None).await.unwrap();
        assert_eq!(config.keyword, None);
        assert!(config.last_run.is_none());

        let last = Utc::now();
        repo.record_success(&config.id, last, last + config.interval())
            .await
            .unwrap();
        let stored = repo.get(&config.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run.unwrap().timestamp(), last.timestamp());
        assert_eq!(
            stored.next_run.unwrap().timestamp(),
            (last + Duration::minutes(15)).timestamp()
        );

        let merged = UpdateScrapeConfig {
            enabled: Some(false),
            ..Default::default()
        }
        .apply_to(&stored);
        let updated = repo
            .update(&config.id, &merged, stored.next_run)
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.end_page, 5);

        assert!(repo.delete(&config.id).await.unwrap());
        assert!(repo.get(&config.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_runs_newest_first_and_prune() {
        let db = test_db().await;
        let repo = db.scrape_configs();
        let now = Utc::now();

        for (i, age_days) in [40, 1].iter().enumerate() {
            repo.insert_run(&NewScrapeRun {
                config_id: "c1".to_string(),
                trigger: "schedule".to_string(),
                status: "success".to_string(),
                pages: 1,
                fetched: i as i64,
                inserted: 0,
                updated: 0,
                skipped: 0,
                error: None,
                started_at: now - Duration::days(*age_days),
                finished_at: now - Duration::days(*age_days),
            })
            .await
            .unwrap();
        }

        let runs = repo.recent_runs(Some("c1"), 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].fetched, 1);

        assert_eq!(repo.prune_runs(now - Duration::days(30)).await.unwrap(), 1);
        assert_eq!(repo.recent_runs(None, 10).await.unwrap().len(), 1);
    }
}
