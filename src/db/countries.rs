//! Country lookup table
//!
//! Videos reference countries by name (`videos.country`); this table backs the
//! public country index.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, row_datetime};
use super::{UpsertOutcome, unique_slug};
use crate::services::text_utils::slugify;

#[derive(Debug, Clone, Serialize)]
pub struct CountryRecord {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CountryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            created_at: row_datetime(row, "created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryWithCount {
    #[serde(flatten)]
    pub country: CountryRecord,
    pub video_count: i64,
}

pub struct CountryRepository {
    pool: SqlitePool,
}

impl CountryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All countries by name with their published video counts
    pub async fn list(&self) -> Result<Vec<CountryWithCount>> {
        use sqlx::{FromRow, Row};

        let rows = sqlx::query(
            r#"
            SELECT c.*,
                (SELECT COUNT(*) FROM videos v
                    WHERE v.country = c.name COLLATE NOCASE AND v.is_published = 1) AS video_count
            FROM countries c
            ORDER BY c.name COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let countries = rows
            .iter()
            .map(|row| {
                Ok(CountryWithCount {
                    country: CountryRecord::from_row(row)?,
                    video_count: row.try_get("video_count")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;

        Ok(countries)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<CountryRecord>> {
        let record = sqlx::query_as::<_, CountryRecord>("SELECT * FROM countries WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Insert a country by name unless one with the same slug exists.
    /// With `update_existing` the stored display name is refreshed.
    pub async fn upsert_by_name(&self, name: &str, update_existing: bool) -> Result<UpsertOutcome> {
        let name = name.trim();
        let base = slugify(name);
        if base.is_empty() {
            return Ok(UpsertOutcome::Skipped);
        }

        let existing: Option<(String, String)> =
            sqlx::query_as("SELECT id, name FROM countries WHERE slug = ?")
                .bind(&base)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some((id, stored)) => {
                if !update_existing || stored == name {
                    return Ok(UpsertOutcome::Skipped);
                }
                sqlx::query("UPDATE countries SET name = ? WHERE id = ?")
                    .bind(name)
                    .bind(&id)
                    .execute(&self.pool)
                    .await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let slug = unique_slug(&self.pool, "countries", &base, None).await?;
                sqlx::query("INSERT INTO countries (id, name, slug, created_at) VALUES (?, ?, ?, ?)")
                    .bind(Uuid::new_v4().to_string())
                    .bind(name)
                    .bind(&slug)
                    .bind(now_iso8601())
                    .execute(&self.pool)
                    .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn test_upsert_by_name() {
        let db = test_db().await;
        let repo = db.countries();

        assert_eq!(repo.upsert_by_name("Japan", false).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(repo.upsert_by_name("japan", false).await.unwrap(), UpsertOutcome::Skipped);
        assert_eq!(repo.upsert_by_name("JAPAN", true).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(repo.upsert_by_name("  ", true).await.unwrap(), UpsertOutcome::Skipped);

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].country.name, "JAPAN");
        assert_eq!(all[0].video_count, 0);
        assert!(repo.get_by_slug("japan").await.unwrap().is_some());
    }
}
