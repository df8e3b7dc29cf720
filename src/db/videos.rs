//! Video database operations
//!
//! Videos link to categories and models through join tables. Join rows are
//! always rebuilt inside the same transaction as the video write.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::sqlite_helpers::{like_pattern, now_iso8601, row_datetime};
use super::{Page, UpsertOutcome, ensure_named, unique_slug};
use crate::services::text_utils::slugify;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VideoRecord {
    pub id: String,
    pub external_id: Option<String>,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub embed_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub views: i64,
    pub rating: Option<f64>,
    pub is_featured: bool,
    pub is_published: bool,
    pub country: Option<String>,
    pub release_year: Option<i64>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for VideoRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            thumbnail_url: row.try_get("thumbnail_url")?,
            video_url: row.try_get("video_url")?,
            embed_url: row.try_get("embed_url")?,
            duration_seconds: row.try_get("duration_seconds")?,
            views: row.try_get("views")?,
            rating: row.try_get("rating")?,
            is_featured: row.try_get("is_featured")?,
            is_published: row.try_get("is_published")?,
            country: row.try_get("country")?,
            release_year: row.try_get("release_year")?,
            source: row.try_get("source")?,
            created_at: row_datetime(row, "created_at")?,
            updated_at: row_datetime(row, "updated_at")?,
        })
    }
}

/// Minimal reference to a linked category or model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// A video with its linked categories and models
#[derive(Debug, Clone, Serialize)]
pub struct VideoDetail {
    #[serde(flatten)]
    pub video: VideoRecord,
    pub categories: Vec<EntityRef>,
    pub models: Vec<EntityRef>,
}

// ============================================================================
// Inputs
// ============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateVideo {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub embed_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_published: bool,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub release_year: Option<i64>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub model_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVideo {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub embed_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub rating: Option<f64>,
    pub is_featured: Option<bool>,
    pub is_published: Option<bool>,
    pub country: Option<String>,
    pub release_year: Option<i64>,
    pub category_ids: Option<Vec<String>>,
    pub model_ids: Option<Vec<String>>,
}

/// A movie item from the external catalog. Categories and models are linked by name.
#[derive(Debug, Clone, Default)]
pub struct ScrapedVideo {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub embed_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub rating: Option<f64>,
    pub country: Option<String>,
    pub release_year: Option<i64>,
    pub categories: Vec<String>,
    pub models: Vec<String>,
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSort {
    #[default]
    Latest,
    Popular,
    Rating,
    Title,
}

impl VideoSort {
    fn order_by(&self) -> &'static str {
        match self {
            Self::Latest => " ORDER BY v.created_at DESC, v.id",
            Self::Popular => " ORDER BY v.views DESC, v.created_at DESC",
            Self::Rating => " ORDER BY COALESCE(v.rating, -1) DESC, v.views DESC",
            Self::Title => " ORDER BY v.title COLLATE NOCASE, v.id",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoFilter {
    /// Category slug
    pub category: Option<String>,
    /// Model slug
    pub model: Option<String>,
    pub country: Option<String>,
    pub featured: Option<bool>,
    /// Free-text match on title and description
    pub search: Option<String>,
    pub published_only: bool,
    pub sort: VideoSort,
    pub limit: i64,
    pub offset: i64,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &VideoFilter) {
    qb.push(" WHERE 1 = 1");
    if filter.published_only {
        qb.push(" AND v.is_published = 1");
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND v.is_featured = ").push_bind(featured);
    }
    if let Some(country) = &filter.country {
        qb.push(" AND v.country = ")
            .push_bind(country.clone())
            .push(" COLLATE NOCASE");
    }
    if let Some(category) = &filter.category {
        qb.push(
            " AND EXISTS (SELECT 1 FROM video_categories vc JOIN categories c ON c.id = vc.category_id \
             WHERE vc.video_id = v.id AND c.slug = ",
        )
        .push_bind(category.clone())
        .push(")");
    }
    if let Some(model) = &filter.model {
        qb.push(
            " AND EXISTS (SELECT 1 FROM video_models vm JOIN models m ON m.id = vm.model_id \
             WHERE vm.video_id = v.id AND m.slug = ",
        )
        .push_bind(model.clone())
        .push(")");
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (v.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR v.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

// ============================================================================
// Repository
// ============================================================================

pub struct VideoRepository {
    pool: SqlitePool,
}

impl VideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Filtered, sorted, paged listing
    pub async fn list(&self, filter: &VideoFilter) -> Result<Page<VideoRecord>> {
        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM videos v");
        push_filters(&mut count_qb, filter);
        let (total,) = count_qb
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT v.* FROM videos v");
        push_filters(&mut qb, filter);
        qb.push(filter.sort.order_by());
        qb.push(" LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let items = qb
            .build_query_as::<VideoRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total, filter.limit, filter.offset))
    }

    pub async fn get(&self, id: &str) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>("SELECT * FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>("SELECT * FROM videos WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Video with its categories and models
    pub async fn detail(&self, video: VideoRecord) -> Result<VideoDetail> {
        let categories = self
            .refs(
                "SELECT c.id, c.name, c.slug FROM categories c \
                 JOIN video_categories vc ON vc.category_id = c.id \
                 WHERE vc.video_id = ? ORDER BY c.name COLLATE NOCASE",
                &video.id,
            )
            .await?;
        let models = self
            .refs(
                "SELECT m.id, m.name, m.slug FROM models m \
                 JOIN video_models vm ON vm.model_id = m.id \
                 WHERE vm.video_id = ? ORDER BY m.name COLLATE NOCASE",
                &video.id,
            )
            .await?;

        Ok(VideoDetail {
            video,
            categories,
            models,
        })
    }

    async fn refs(&self, sql: &str, video_id: &str) -> Result<Vec<EntityRef>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(sql)
            .bind(video_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, slug)| EntityRef { id, name, slug })
            .collect())
    }

    /// Published videos sharing the most categories with `video_id`.
    /// Falls back to the most viewed videos when nothing shares a category.
    pub async fn related(&self, video_id: &str, limit: i64) -> Result<Vec<VideoRecord>> {
        let related = sqlx::query_as::<_, VideoRecord>(
            r#"
            SELECT v.*, COUNT(*) AS shared FROM videos v
            JOIN video_categories vc ON vc.video_id = v.id
            WHERE vc.category_id IN (SELECT category_id FROM video_categories WHERE video_id = ?1)
              AND v.id != ?1 AND v.is_published = 1
            GROUP BY v.id
            ORDER BY shared DESC, v.views DESC
            LIMIT ?2
            "#,
        )
        .bind(video_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        if !related.is_empty() {
            return Ok(related);
        }

        let popular = sqlx::query_as::<_, VideoRecord>(
            "SELECT * FROM videos WHERE id != ? AND is_published = 1 ORDER BY views DESC LIMIT ?",
        )
        .bind(video_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(popular)
    }

    pub async fn create(&self, input: &CreateVideo) -> Result<VideoRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_iso8601();
        let base = slugify(input.slug.as_deref().unwrap_or(&input.title));

        let mut tx = self.pool.begin().await?;
        let slug = unique_slug(&mut *tx, "videos", &base, None).await?;

        sqlx::query(
            r#"
            INSERT INTO videos (
                id, title, slug, description, thumbnail_url, video_url, embed_url,
                duration_seconds, rating, is_featured, is_published, country, release_year,
                source, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'manual', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.title.trim())
        .bind(&slug)
        .bind(&input.description)
        .bind(&input.thumbnail_url)
        .bind(&input.video_url)
        .bind(&input.embed_url)
        .bind(input.duration_seconds)
        .bind(input.rating)
        .bind(input.is_featured)
        .bind(input.is_published)
        .bind(&input.country)
        .bind(input.release_year)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        replace_links(&mut tx, Link::Categories, &id, &input.category_ids).await?;
        replace_links(&mut tx, Link::Models, &id, &input.model_ids).await?;
        tx.commit().await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create video"))
    }

    pub async fn update(&self, id: &str, input: &UpdateVideo) -> Result<Option<VideoRecord>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        let slug = match &input.slug {
            Some(slug) => unique_slug(&mut *tx, "videos", &slugify(slug), Some(id)).await?,
            None => existing.slug.clone(),
        };

        sqlx::query(
            r#"
            UPDATE videos SET
                title = ?, slug = ?, description = ?, thumbnail_url = ?, video_url = ?,
                embed_url = ?, duration_seconds = ?, rating = ?, is_featured = ?,
                is_published = ?, country = ?, release_year = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.title.as_deref().map(str::trim).unwrap_or(existing.title.as_str()))
        .bind(&slug)
        .bind(input.description.as_ref().or(existing.description.as_ref()))
        .bind(input.thumbnail_url.as_ref().or(existing.thumbnail_url.as_ref()))
        .bind(input.video_url.as_ref().or(existing.video_url.as_ref()))
        .bind(input.embed_url.as_ref().or(existing.embed_url.as_ref()))
        .bind(input.duration_seconds.or(existing.duration_seconds))
        .bind(input.rating.or(existing.rating))
        .bind(input.is_featured.unwrap_or(existing.is_featured))
        .bind(input.is_published.unwrap_or(existing.is_published))
        .bind(input.country.as_ref().or(existing.country.as_ref()))
        .bind(input.release_year.or(existing.release_year))
        .bind(now_iso8601())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(ids) = &input.category_ids {
            replace_links(&mut tx, Link::Categories, id, ids).await?;
        }
        if let Some(ids) = &input.model_ids {
            replace_links(&mut tx, Link::Models, id, ids).await?;
        }
        tx.commit().await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bump the view counter
    pub async fn increment_views(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert or update a movie from the external catalog, keyed by `external_id`.
    /// Existing rows are left untouched unless `update_existing` is set.
    pub async fn upsert_scraped(
        &self,
        item: &ScrapedVideo,
        update_existing: bool,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM videos WHERE external_id = ?")
            .bind(&item.external_id)
            .fetch_optional(&mut *tx)
            .await?;

        let (id, outcome) = match existing {
            Some(_) if !update_existing => return Ok(UpsertOutcome::Skipped),
            Some((id,)) => {
                sqlx::query(
                    r#"
                    UPDATE videos SET
                        title = ?,
                        description = COALESCE(?, description),
                        thumbnail_url = COALESCE(?, thumbnail_url),
                        video_url = COALESCE(?, video_url),
                        embed_url = COALESCE(?, embed_url),
                        duration_seconds = COALESCE(?, duration_seconds),
                        rating = COALESCE(?, rating),
                        country = COALESCE(?, country),
                        release_year = COALESCE(?, release_year),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(item.title.trim())
                .bind(&item.description)
                .bind(&item.thumbnail_url)
                .bind(&item.video_url)
                .bind(&item.embed_url)
                .bind(item.duration_seconds)
                .bind(item.rating)
                .bind(&item.country)
                .bind(item.release_year)
                .bind(now_iso8601())
                .bind(&id)
                .execute(&mut *tx)
                .await?;
                (id, UpsertOutcome::Updated)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let now = now_iso8601();
                let slug = unique_slug(&mut *tx, "videos", &slugify(&item.title), None).await?;

                sqlx::query(
                    r#"
                    INSERT INTO videos (
                        id, external_id, title, slug, description, thumbnail_url, video_url,
                        embed_url, duration_seconds, rating, country, release_year, source,
                        created_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'scrape', ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&item.external_id)
                .bind(item.title.trim())
                .bind(&slug)
                .bind(&item.description)
                .bind(&item.thumbnail_url)
                .bind(&item.video_url)
                .bind(&item.embed_url)
                .bind(item.duration_seconds)
                .bind(item.rating)
                .bind(&item.country)
                .bind(item.release_year)
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                (id, UpsertOutcome::Inserted)
            }
        };

        if !item.categories.is_empty() {
            let mut ids = Vec::with_capacity(item.categories.len());
            for name in &item.categories {
                ids.push(ensure_named(&mut tx, "categories", name).await?);
            }
            replace_links(&mut tx, Link::Categories, &id, &ids).await?;
        }
        if !item.models.is_empty() {
            let mut ids = Vec::with_capacity(item.models.len());
            for name in &item.models {
                ids.push(ensure_named(&mut tx, "models", name).await?);
            }
            replace_links(&mut tx, Link::Models, &id, &ids).await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

#[derive(Clone, Copy)]
enum Link {
    Categories,
    Models,
}

/// Rebuild the join rows of one video. Ids that do not exist are ignored.
async fn replace_links(
    conn: &mut SqliteConnection,
    link: Link,
    video_id: &str,
    ids: &[String],
) -> Result<()> {
    let (join_table, column, target) = match link {
        Link::Categories => ("video_categories", "category_id", "categories"),
        Link::Models => ("video_models", "model_id", "models"),
    };

    sqlx::query(&format!("DELETE FROM {} WHERE video_id = ?", join_table))
        .bind(video_id)
        .execute(&mut *conn)
        .await?;

    for id in ids {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (video_id, {}) SELECT ?, id FROM {} WHERE id = ?",
            join_table, column, target
        ))
        .bind(video_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::categories::CreateCategory;
    use crate::db::test_db;
    use pretty_assertions::assert_eq;

    fn video(title: &str) -> CreateVideo {
        CreateVideo {
            title: title.to_string(),
            is_published: true,
            ..Default::default()
        }
    }

    fn filter() -> VideoFilter {
        VideoFilter {
            published_only: true,
            limit: 24,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_links_and_detail() {
        let db = test_db().await;
        let drama = db
            .categories()
            .create(&CreateCategory {
                name: "Drama".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let created = db
            .videos()
            .create(&CreateVideo {
                category_ids: vec![drama.id.clone(), "missing".to_string()],
                ..video("First Light")
            })
            .await
            .unwrap();
        assert_eq!(created.slug, "first-light");
        assert_eq!(created.source, "manual");

        let detail = db.videos().detail(created).await.unwrap();
        assert_eq!(
            detail.categories,
            vec![EntityRef {
                id: drama.id,
                name: "Drama".to_string(),
                slug: "drama".to_string()
            }]
        );
        assert!(detail.models.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let db = test_db().await;
        let repo = db.videos();
        let a = repo.create(&video("Alpha")).await.unwrap();
        repo.create(&video("Beta")).await.unwrap();
        repo.create(&CreateVideo {
            is_published: false,
            ..video("Hidden")
        })
        .await
        .unwrap();
        repo.increment_views(&a.id).await.unwrap();

        let page = repo.list(&filter()).await.unwrap();
        assert_eq!(page.total, 2);

        let popular = repo
            .list(&VideoFilter {
                sort: VideoSort::Popular,
                ..filter()
            })
            .await
            .unwrap();
        assert_eq!(popular.items[0].title, "Alpha");

        let search = repo
            .list(&VideoFilter {
                search: Some("bet".to_string()),
                ..filter()
            })
            .await
            .unwrap();
        assert_eq!(search.total, 1);
        assert_eq!(search.items[0].title, "Beta");

        let all = repo
            .list(&VideoFilter {
                published_only: false,
                ..filter()
            })
            .await
            .unwrap();
        assert_eq!(all.total, 3);
    }

    #[tokio::test]
    async fn test_update_rebuilds_links_only_when_given() {
        let db = test_db().await;
        let cat = db
            .categories()
            .create(&CreateCategory {
                name: "Comedy".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let repo = db.videos();
        let created = repo
            .create(&CreateVideo {
                category_ids: vec![cat.id.clone()],
                ..video("Gamma")
            })
            .await
            .unwrap();

        let updated = repo
            .update(
                &created.id,
                &UpdateVideo {
                    is_featured: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.is_featured);
        assert_eq!(repo.detail(updated.clone()).await.unwrap().categories.len(), 1);

        let cleared = repo
            .update(
                &created.id,
                &UpdateVideo {
                    category_ids: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(repo.detail(cleared).await.unwrap().categories.is_empty());

        assert!(repo.delete(&created.id).await.unwrap());
        assert!(repo.get(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_scraped_links_by_name() {
        let db = test_db().await;
        let repo = db.videos();
        let item = ScrapedVideo {
            external_id: "m-1".to_string(),
            title: "Night Train".to_string(),
            categories: vec!["Thriller".to_string()],
            models: vec!["Ana Lopez".to_string()],
            ..Default::default()
        };

        assert_eq!(repo.upsert_scraped(&item, false).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(repo.upsert_scraped(&item, false).await.unwrap(), UpsertOutcome::Skipped);

        let retitled = ScrapedVideo {
            title: "Night Train (2024)".to_string(),
            ..item
        };
        assert_eq!(repo.upsert_scraped(&retitled, true).await.unwrap(), UpsertOutcome::Updated);

        let stored = repo.get_by_slug("night-train").await.unwrap().unwrap();
        assert_eq!(stored.title, "Night Train (2024)");
        assert_eq!(stored.source, "scrape");

        let detail = repo.detail(stored).await.unwrap();
        assert_eq!(detail.categories[0].slug, "thriller");
        assert_eq!(detail.models[0].slug, "ana-lopez");
        assert!(db.models().get_by_slug("ana-lopez").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_related_prefers_shared_categories() {
        let db = test_db().await;
        let cat = db
            .categories()
            .create(&CreateCategory {
                name: "Action".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let repo = db.videos();
        let with_cat = |title: &str| CreateVideo {
            category_ids: vec![cat.id.clone()],
            ..video(title)
        };
        let base = repo.create(&with_cat("One")).await.unwrap();
        repo.create(&with_cat("Two")).await.unwrap();
        let other = repo.create(&video("Three")).await.unwrap();
        repo.increment_views(&other.id).await.unwrap();

        let related = repo.related(&base.id, 5).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].title, "Two");

        let fallback = repo.related(&other.id, 5).await.unwrap();
        assert_eq!(fallback.len(), 2);
    }
}
