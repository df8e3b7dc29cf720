//! Category database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, row_datetime};
use super::{UpsertOutcome, unique_slug};
use crate::services::text_utils::slugify;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRecord {
    pub id: String,
    pub external_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CategoryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            thumbnail_url: row.try_get("thumbnail_url")?,
            created_at: row_datetime(row, "created_at")?,
            updated_at: row_datetime(row, "updated_at")?,
        })
    }
}

/// Category with the number of published videos linked to it
#[derive(Debug, Clone, Serialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: CategoryRecord,
    pub video_count: i64,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CategoryWithCount {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            category: CategoryRecord::from_row(row)?,
            video_count: row.try_get("video_count")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
}

const WITH_COUNT: &str = r#"
    SELECT c.*,
        (SELECT COUNT(*) FROM video_categories vc
            JOIN videos v ON v.id = vc.video_id
            WHERE vc.category_id = c.id AND v.is_published = 1) AS video_count
    FROM categories c
"#;

pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All categories by name, with published video counts
    pub async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let records = sqlx::query_as::<_, CategoryWithCount>(&format!(
            "{} ORDER BY c.name COLLATE NOCASE",
            WITH_COUNT
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Categories with the most published videos
    pub async fn top(&self, limit: i64) -> Result<Vec<CategoryWithCount>> {
        let records = sqlx::query_as::<_, CategoryWithCount>(&format!(
            "{} ORDER BY video_count DESC, c.name COLLATE NOCASE LIMIT ?",
            WITH_COUNT
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<Option<CategoryRecord>> {
        let record = sqlx::query_as::<_, CategoryRecord>("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<CategoryWithCount>> {
        let record = sqlx::query_as::<_, CategoryWithCount>(&format!(
            "{} WHERE c.slug = ?",
            WITH_COUNT
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn create(&self, input: &CreateCategory) -> Result<CategoryRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_iso8601();
        let base = slugify(input.slug.as_deref().unwrap_or(&input.name));
        let slug = unique_slug(&self.pool, "categories", &base, None).await?;

        sqlx::query(
            r#"
            INSERT INTO categories (id, external_id, name, slug, description, thumbnail_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.external_id)
        .bind(input.name.trim())
        .bind(&slug)
        .bind(&input.description)
        .bind(&input.thumbnail_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create category"))
    }

    pub async fn update(&self, id: &str, input: &UpdateCategory) -> Result<Option<CategoryRecord>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        let slug = match &input.slug {
            Some(slug) => unique_slug(&self.pool, "categories", &slugify(slug), Some(id)).await?,
            None => existing.slug,
        };

        sqlx::query(
            r#"
            UPDATE categories SET name = ?, slug = ?, description = ?, thumbnail_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.name.as_deref().map(str::trim).unwrap_or(existing.name.as_str()))
        .bind(&slug)
        .bind(input.description.as_ref().or(existing.description.as_ref()))
        .bind(input.thumbnail_url.as_ref().or(existing.thumbnail_url.as_ref()))
        .bind(now_iso8601())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert or update a category from the external catalog.
    /// Matches on `external_id` first, then on the name's slug.
    pub async fn upsert_scraped(
        &self,
        input: &CreateCategory,
        update_existing: bool,
    ) -> Result<UpsertOutcome> {
        let base = slugify(&input.name);
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM categories WHERE (external_id IS NOT NULL AND external_id = ?) OR slug = ? LIMIT 1",
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
                    UPDATE categories SET
                        external_id = COALESCE(?, external_id),
                        name = ?,
                        description = COALESCE(?, description),
                        thumbnail_url = COALESCE(?, thumbnail_url),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&input.external_id)
                .bind(input.name.trim())
                .bind(&input.description)
                .bind(&input.thumbnail_url)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn drama() -> CreateCategory {
        CreateCategory {
            name: "Drama".to_string(),
            external_id: Some("cat-1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_generates_unique_slugs() {
        let db = test_db().await;
        let repo = db.categories();

        let first = repo.create(&drama()).await.unwrap();
        let second = repo
            .create(&CreateCategory {
                name: "Drama!".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(first.slug, "drama");
        assert_eq!(second.slug, "drama-2");
        assert_eq!(repo.list_with_counts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_respects_update_existing() {
        let db = test_db().await;
        let repo = db.categories();

        assert_eq!(
            repo.upsert_scraped(&drama(), false).await.unwrap(),
            UpsertOutcome::Inserted
        );

        let changed = CreateCategory {
            description: Some("Serious films".to_string()),
            ..drama()
        };
        assert_eq!(
            repo.upsert_scraped(&changed, false).await.unwrap(),
            UpsertOutcome::Skipped
        );
        assert_eq!(
            repo.upsert_scraped(&changed, true).await.unwrap(),
            UpsertOutcome::Updated
        );

        let stored = repo.get_by_slug("drama").await.unwrap().unwrap();
        assert_eq!(stored.category.description.as_deref(), Some("Serious films"));
        assert_eq!(stored.video_count, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = test_db().await;
        let repo = db.categories();
        let created = repo.create(&drama()).await.unwrap();

        let updated = repo
            .update(
                &created.id,
                &UpdateCategory {
                    name: Some("Dramas".to_string()),
                    slug: Some("Dramas".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.slug, "dramas");
        assert_eq!(updated.external_id.as_deref(), Some("cat-1"));

        assert!(repo.delete(&created.id).await.unwrap());
        assert!(repo.update(&created.id, &UpdateCategory::default()).await.unwrap().is_none());
    }
}
