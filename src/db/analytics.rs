//! Page-view analytics

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::{datetime_to_str, now_iso8601};

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsTotals {
    pub videos: i64,
    pub published_videos: i64,
    pub models: i64,
    pub categories: i64,
    pub active_ads: i64,
    pub video_views: i64,
    pub page_views_total: i64,
    pub page_views_24h: i64,
    pub ad_clicks: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopVideo {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyViews {
    /// `YYYY-MM-DD` (UTC)
    pub day: String,
    pub views: i64,
}

pub struct AnalyticsRepository {
    pool: SqlitePool,
}

impl AnalyticsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record one page view
    pub async fn record_view(&self, path: &str, video_id: Option<&str>) -> Result<()> {
        sqlx::query("INSERT INTO page_views (path, video_id, viewed_at) VALUES (?, ?, ?)")
            .bind(path)
            .bind(video_id)
            .bind(now_iso8601())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn totals(&self, now: DateTime<Utc>) -> Result<AnalyticsTotals> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM videos),
                (SELECT COUNT(*) FROM videos WHERE is_published = 1),
                (SELECT COUNT(*) FROM models),
                (SELECT COUNT(*) FROM categories),
                (SELECT COUNT(*) FROM ads WHERE is_active = 1),
                (SELECT COALESCE(SUM(views), 0) FROM videos),
                (SELECT COUNT(*) FROM page_views),
                (SELECT COUNT(*) FROM page_views WHERE viewed_at >= ?),
                (SELECT COALESCE(SUM(clicks), 0) FROM ads)
            "#,
        )
        .bind(datetime_to_str(now - Duration::hours(24)))
        .fetch_one(&self.pool)
        .await?;

        Ok(AnalyticsTotals {
            videos: row.0,
            published_videos: row.1,
            models: row.2,
            categories: row.3,
            active_ads: row.4,
            video_views: row.5,
            page_views_total: row.6,
            page_views_24h: row.7,
            ad_clicks: row.8,
        })
    }

    /// Most viewed videos of all time
    pub async fn top_videos(&self, limit: i64) -> Result<Vec<TopVideo>> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT id, title, slug, views FROM videos ORDER BY views DESC, title LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, title, slug, views)| TopVideo {
                id,
                title,
                slug,
                views,
            })
            .collect())
    }

    /// Page views per UTC day over the last `days` days, oldest first.
    /// Days without views are omitted.
    pub async fn views_per_day(&self, now: DateTime<Utc>, days: i64) -> Result<Vec<DailyViews>> {
        let since = (now - Duration::days(days.max(1) - 1)).date_naive();
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT substr(viewed_at, 1, 10) AS day, COUNT(*)
            FROM page_views
            WHERE viewed_at >= ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(since.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(day, views)| DailyViews { day, views })
            .collect())
    }

    /// Delete page views older than `before`
    pub async fn prune(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM page_views WHERE viewed_at < ?")
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

    async fn insert_view(db: &crate::db::Database, at: DateTime<Utc>) {
        sqlx::query("INSERT INTO page_views (path, viewed_at) VALUES ('/', ?)")
            .bind(datetime_to_str(at))
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_views_per_day_and_prune() {
        let db = test_db().await;
        let repo = db.analytics();
        let now = Utc::now();

        insert_view(&db, now).await;
        insert_view(&db, now).await;
        insert_view(&db, now - Duration::days(1)).await;
        insert_view(&db, now - Duration::days(100)).await;

        let daily = repo.views_per_day(now, 7).await.unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[1].day, now.format("%Y-%m-%d").to_string());
        assert_eq!(daily[1].views, 2);

        let totals = repo.totals(now).await.unwrap();
        assert_eq!(totals.page_views_total, 4);
        assert_eq!(totals.videos, 0);

        assert_eq!(repo.prune(now - Duration::days(90)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_view() {
        let db = test_db().await;
        let repo = db.analytics();
        repo.record_view("/videos/x", Some("v1")).await.unwrap();

        let totals = repo.totals(Utc::now()).await.unwrap();
        assert_eq!(totals.page_views_total, 1);
        assert_eq!(totals.page_views_24h, 1);
    }
}
