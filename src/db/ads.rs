//! Ad placements

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, row_datetime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    #[default]
    Banner,
    Script,
    Popunder,
    Video,
}

impl AdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Banner => "banner",
            Self::Script => "script",
            Self::Popunder => "popunder",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "banner" => Ok(Self::Banner),
            "script" => Ok(Self::Script),
            "popunder" => Ok(Self::Popunder),
            "video" => Ok(Self::Video),
            other => Err(anyhow::anyhow!("Unknown ad type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdRecord {
    pub id: String,
    pub name: String,
    pub position: String,
    pub ad_type: AdType,
    pub content: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub priority: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for AdRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let ad_type: String = row.try_get("ad_type")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            position: row.try_get("position")?,
            ad_type: ad_type
                .parse()
                .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?,
            content: row.try_get("content")?,
            link_url: row.try_get("link_url")?,
            image_url: row.try_get("image_url")?,
            is_active: row.try_get("is_active")?,
            priority: row.try_get("priority")?,
            impressions: row.try_get("impressions")?,
            clicks: row.try_get("clicks")?,
            created_at: row_datetime(row, "created_at")?,
            updated_at: row_datetime(row, "updated_at")?,
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAd {
    pub name: String,
    pub position: String,
    #[serde(default)]
    pub ad_type: AdType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAd {
    pub name: Option<String>,
    pub position: Option<String>,
    pub ad_type: Option<AdType>,
    pub content: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    pub priority: Option<i64>,
}

pub struct AdRepository {
    pool: SqlitePool,
}

impl AdRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_all(&self) -> Result<Vec<AdRecord>> {
        let records = sqlx::query_as::<_, AdRecord>(
            "SELECT * FROM ads ORDER BY position, priority DESC, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Active ads, highest priority first, optionally for one position
    pub async fn list_active(&self, position: Option<&str>) -> Result<Vec<AdRecord>> {
        let records = sqlx::query_as::<_, AdRecord>(
            r#"
            SELECT * FROM ads
            WHERE is_active = 1 AND (?1 IS NULL OR position = ?1)
            ORDER BY priority DESC, created_at
            "#,
        )
        .bind(position)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AdRecord>> {
        let record = sqlx::query_as::<_, AdRecord>("SELECT * FROM ads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn create(&self, input: &CreateAd) -> Result<AdRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO ads (id, name, position, ad_type, content, link_url, image_url, is_active, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.position.trim())
        .bind(input.ad_type.as_str())
        .bind(&input.content)
        .bind(&input.link_url)
        .bind(&input.image_url)
        .bind(input.is_active)
        .bind(input.priority)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create ad"))
    }

    pub async fn update(&self, id: &str, input: &UpdateAd) -> Result<Option<AdRecord>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE ads SET
                name = ?, position = ?, ad_type = ?, content = ?, link_url = ?, image_url = ?,
                is_active = ?, priority = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.name.as_deref().unwrap_or(existing.name.as_str()))
        .bind(input.position.as_deref().unwrap_or(existing.position.as_str()))
        .bind(input.ad_type.unwrap_or(existing.ad_type).as_str())
        .bind(input.content.as_ref().or(existing.content.as_ref()))
        .bind(input.link_url.as_ref().or(existing.link_url.as_ref()))
        .bind(input.image_url.as_ref().or(existing.image_url.as_ref()))
        .bind(input.is_active.unwrap_or(existing.is_active))
        .bind(input.priority.unwrap_or(existing.priority))
        .bind(now_iso8601())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count one impression for each served ad
    pub async fn record_impressions(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE ads SET impressions = impressions + 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Count a click. Returns false for unknown or inactive ads.
    pub async fn record_click(&self, id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE ads SET clicks = clicks + 1 WHERE id = ? AND is_active = 1")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn banner(name: &str, position: &str, priority: i64) -> CreateAd {
        CreateAd {
            name: name.to_string(),
            position: position.to_string(),
            is_active: true,
            priority,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_active_ads_by_position_and_priority() {
        let db = test_db().await;
        let repo = db.ads();
        repo.create(&banner("low", "header", 1)).await.unwrap();
        repo.create(&banner("high", "header", 5)).await.unwrap();
        repo.create(&banner("side", "sidebar", 9)).await.unwrap();
        repo.create(&CreateAd {
            is_active: false,
            ..banner("off", "header", 10)
        })
        .await
        .unwrap();

        let header = repo.list_active(Some("header")).await.unwrap();
        let names: Vec<_> = header.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);
        assert_eq!(repo.list_active(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_counters() {
        let db = test_db().await;
        let repo = db.ads();
        let ad = repo.create(&banner("a", "footer", 0)).await.unwrap();

        repo.record_impressions(&[ad.id.clone(), ad.id.clone()])
            .await
            .unwrap();
        assert!(repo.record_click(&ad.id).await.unwrap());
        assert!(!repo.record_click("missing").await.unwrap());

        let stored = repo.get(&ad.id).await.unwrap().unwrap();
        assert_eq!(stored.impressions, 2);
        assert_eq!(stored.clicks, 1);

        let updated = repo
            .update(
                &ad.id,
                &UpdateAd {
                    is_active: Some(false),
                    ad_type: Some(AdType::Script),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.ad_type, AdType::Script);
        assert!(!repo.record_click(&ad.id).await.unwrap());
    }
}
