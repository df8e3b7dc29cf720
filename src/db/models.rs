//! Model (performer) database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{like_pattern, now_iso8601, row_datetime};
use super::{Page, UpsertOutcome, unique_slug};
use crate::services::text_utils::slugify;

#[derive(Debug, Clone, Serialize)]
pub struct ModelRecord {
    pub id: String,
    pub external_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ModelRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            bio: row.try_get("bio")?,
            avatar_url: row.try_get("avatar_url")?,
            created_at: row_datetime(row, "created_at")?,
            updated_at: row_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelWithCount {
    #[serde(flatten)]
    pub model: ModelRecord,
    pub video_count: i64,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ModelWithCount {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            model: ModelRecord::from_row(row)?,
            video_count: row.try_get("video_count")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateModel {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateModel {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

const WITH_COUNT: &str = r#"
    SELECT m.*,
        (SELECT COUNT(*) FROM video_models vm
            JOIN videos v ON v.id = vm.video_id
            WHERE vm.model_id = m.id AND v.is_published = 1) AS video_count
    FROM models m
"#;

pub struct ModelRepository {
    pool: SqlitePool,
}

impl ModelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Paged listing, most prolific first, optionally filtered by name
    pub async fn list(
        &self,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<ModelWithCount>> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM models WHERE ?1 IS NULL OR name LIKE ?1 ESCAPE '\\'",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, ModelWithCount>(&format!(
            "{} WHERE ?1 IS NULL OR m.name LIKE ?1 ESCAPE '\\' ORDER BY video_count DESC, m.name COLLATE NOCASE LIMIT ?2 OFFSET ?3",
            WITH_COUNT
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(items, total, limit, offset))
    }

    pub async fn get(&self, id: &str) -> Result<Option<ModelRecord>> {
        let record = sqlx::query_as::<_, ModelRecord>("SELECT * FROM models WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<ModelWithCount>> {
        let record =
            sqlx::query_as::<_, ModelWithCount>(&format!("{} WHERE m.slug = ?", WITH_COUNT))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    pub async fn create(&self, input: &CreateModel) -> Result<ModelRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_iso8601();
        let base = slugify(input.slug.as_deref().unwrap_or(&input.name));
        let slug = unique_slug(&self.pool, "models", &base, None).await?;

        sqlx::query(
            r#"
            INSERT INTO models (id, external_id, name, slug, bio, avatar_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.external_id)
        .bind(input.name.trim())
        .bind(&slug)
        .bind(&input.bio)
        .bind(&input.avatar_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create model"))
    }

    pub async fn update(&self, id: &str, input: &UpdateModel) -> Result<Option<ModelRecord>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        let slug = match &input.slug {
            Some(slug) => unique_slug(&self.pool, "models", &slugify(slug), Some(id)).await?,
            None => existing.slug,
        };

        sqlx::query(
            "UPDATE models SET name = ?, slug = ?, bio = ?, avatar_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(input.name.as_deref().map(str::trim).unwrap_or(existing.name.as_str()))
        .bind(&slug)
        .bind(input.bio.as_ref().or(existing.bio.as_ref()))
        .bind(input.avatar_url.as_ref().or(existing.avatar_url.as_ref()))
        .bind(now_iso8601())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM models WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert or update a model from the external catalog.
    /// Matches on `external_id` first, then on the name's slug.
    pub async fn upsert_scraped(
        &self,
        input: &CreateModel,
        update_existing: bool,
    ) -> Result<UpsertOutcome> {
        let base = slugify(&input.name);
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM models WHERE (external_id IS NOT NULL AND external_id = ?) OR slug = ? LIMIT 1",
        )
        .bind(&input.external_id)
        .bind(&base)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some(_) if !update_existing => Ok(UpsertOutcome::Skipped),
            Some((id,)) => {
                sqlx::query(
                    r#"
                    UPDATE models SET
                        external_id = COALESCE(?, external_id),
                        name = ?,
                        bio = COALESCE(?, bio),
                        avatar_url = COALESCE(?, avatar_url),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&input.external_id)
                .bind(input.name.trim())
                .bind(&input.bio)
                .bind(&input.avatar_url)
                .bind(now_iso8601())
                .bind(&id)
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.create(input).await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }
}
