//! Application settings database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, row_datetime};

/// Category whose settings are readable without authentication
pub const PUBLIC_CATEGORY: &str = "public";

/// A setting record in the database
#[derive(Debug, Clone, Serialize)]
pub struct SettingRecord {
    pub id: String,
    pub key: String,
    pub value: JsonValue,
    pub description: Option<String>,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SettingRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let value_str: String = row.try_get("value")?;

        Ok(Self {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            value: serde_json::from_str(&value_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            description: row.try_get("description")?,
            category: row.try_get("category")?,
            created_at: row_datetime(row, "created_at")?,
            updated_at: row_datetime(row, "updated_at")?,
        })
    }
}

/// Settings repository for database operations
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a setting by key
    pub async fn get(&self, key: &str) -> Result<Option<SettingRecord>> {
        let record =
            sqlx::query_as::<_, SettingRecord>("SELECT * FROM app_settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// Get a setting value as a specific type
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let record = self.get(key).await?;
        match record {
            Some(r) => Ok(Some(serde_json::from_value(r.value)?)),
            None => Ok(None),
        }
    }

    /// Get a setting value with a default
    pub async fn get_or_default<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T> {
        match self.get_value(key).await? {
            Some(v) => Ok(v),
            None => Ok(default),
        }
    }

    /// Get all settings in a category
    pub async fn list_by_category(&self, category: &str) -> Result<Vec<SettingRecord>> {
        let records = sqlx::query_as::<_, SettingRecord>(
            "SELECT * FROM app_settings WHERE category = ?1 ORDER BY key",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Get all settings
    pub async fn list_all(&self) -> Result<Vec<SettingRecord>> {
        let records =
            sqlx::query_as::<_, SettingRecord>("SELECT * FROM app_settings ORDER BY category, key")
                .fetch_all(&self.pool)
                .await?;

        Ok(records)
    }

    /// Public settings as a flat `key -> value` object
    pub async fn public_map(&self) -> Result<serde_json::Map<String, JsonValue>> {
        Ok(self
            .list_by_category(PUBLIC_CATEGORY)
            .await?
            .into_iter()
            .map(|r| (r.key, r.value))
            .collect())
    }

    /// Set a setting value, keeping the existing category (or `general` for new keys)
    pub async fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<SettingRecord> {
        let json_value = serde_json::to_string(&serde_json::to_value(value)?)?;
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO app_settings (id, key, value, category, created_at, updated_at)
            VALUES (?1, ?2, ?3, 'general', ?4, ?4)
            ON CONFLICT (key) DO UPDATE SET
                value = ?3,
                updated_at = ?4
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key)
        .bind(&json_value)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(key)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve setting after insert"))
    }

    /// Set a setting value with category
    pub async fn set_with_category<T: serde::Serialize>(
        &self,
        key: &str,
        value: T,
        category: &str,
        description: Option<&str>,
    ) -> Result<SettingRecord> {
        let json_value = serde_json::to_string(&serde_json::to_value(value)?)?;
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO app_settings (id, key, value, category, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT (key) DO UPDATE SET
                value = ?3,
                category = ?4,
                description = COALESCE(?5, app_settings.description),
                updated_at = ?6
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key)
        .bind(&json_value)
        .bind(category)
        .bind(description)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(key)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve setting after insert"))
    }

    /// Delete a setting
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM app_settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn test_set_keeps_existing_category() {
        let db = test_db().await;
        let repo = db.settings();

        let record = repo.set("site.name", "My Tube").await.unwrap();
        assert_eq!(record.category, PUBLIC_CATEGORY);
        assert_eq!(record.value, JsonValue::String("My Tube".into()));

        let fresh = repo.set("custom.flag", true).await.unwrap();
        assert_eq!(fresh.category, "general");
        assert!(repo.get_or_default("custom.flag", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_public_map_excludes_private_settings() {
        let db = test_db().await;
        let repo = db.settings();
        repo.set_with_category("secret.token", "x", "scraper", None)
            .await
            .unwrap();

        let public = repo.public_map().await.unwrap();
        assert!(public.contains_key("site.name"));
        assert!(!public.contains_key("secret.token"));
        assert!(!public.contains_key("analytics.retention_days"));
    }

    #[tokio::test]
    async fn test_delete_missing_key() {
        let db = test_db().await;
        assert!(!db.settings().delete("nope").await.unwrap());
    }
}
