//! Backup export and on-disk snapshots

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use tracing::info;

/// Tables included in a JSON export, in restore order
pub const EXPORT_TABLES: &[&str] = &[
    "categories",
    "models",
    "countries",
    "videos",
    "video_categories",
    "video_models",
    "ads",
    "app_settings",
    "scrape_configs",
];

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub file_name: String,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

pub struct BackupRepository {
    pool: SqlitePool,
}

impl BackupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Dump the catalog tables as `{ "exported_at": ..., "tables": { name: [rows] } }`
    pub async fn export(&self) -> Result<JsonValue> {
        let mut tables = Map::new();
        for table in EXPORT_TABLES {
            let rows = sqlx::query(&format!("SELECT * FROM {}", table))
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("Failed to export {}", table))?;
            let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>>>()?;
            tables.insert(table.to_string(), JsonValue::Array(rows));
        }

        Ok(serde_json::json!({
            "exported_at": Utc::now(),
            "tables": tables,
        }))
    }

    /// Write a consistent copy of the database into `dir` with `VACUUM INTO`
    pub async fn snapshot(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(format!("cinebase-{}.db", Utc::now().format("%Y%m%d-%H%M%S")));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            anyhow::bail!("Snapshot {} already exists", path.display());
        }

        sqlx::query("VACUUM INTO ?")
            .bind(path.to_string_lossy().to_string())
            .execute(&self.pool)
            .await
            .context("VACUUM INTO failed")?;

        info!(path = %path.display(), "Database snapshot written");
        Ok(path)
    }

    /// Snapshot files in `dir`, newest first
    pub async fn list_snapshots(&self, dir: &Path) -> Result<Vec<SnapshotInfo>> {
        let mut snapshots = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.ends_with(".db") {
                continue;
            }
            let metadata = entry.metadata().await?;
            snapshots.push(SnapshotInfo {
                file_name,
                size_bytes: metadata.len(),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        snapshots.sort_by(|a, b| b.file_name.cmp(&a.file_name));
        Ok(snapshots)
    }
}

/// Convert a row of any table into a JSON object using SQLite's storage classes
fn row_to_json(row: &SqliteRow) -> Result<JsonValue> {
    use sqlx::{Column, Row, TypeInfo, ValueRef};

    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            JsonValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => JsonValue::from(row.try_get::<i64, _>(i)?),
                "REAL" => JsonValue::from(row.try_get::<f64, _>(i)?),
                "BLOB" => JsonValue::Null,
                _ => JsonValue::from(row.try_get::<String, _>(i)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(JsonValue::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::categories::CreateCategory;
    use crate::db::test_db;

    #[tokio::test]
    async fn test_export_contains_rows() {
        let db = test_db().await;
        db.categories()
            .create(&CreateCategory {
                name: "Drama".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let dump = db.backup().export().await.unwrap();
        let categories = dump["tables"]["categories"].as_array().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0]["slug"], "drama");
        assert!(categories[0]["description"].is_null());
        assert!(!dump["tables"]["app_settings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_and_list() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();

        let path = db.backup().snapshot(dir.path()).await.unwrap();
        assert!(path.exists());

        let snapshots = db.backup().list_snapshots(dir.path()).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].size_bytes > 0);

        let missing = db
            .backup()
            .list_snapshots(&dir.path().join("nope"))
            .await
            .unwrap();
        assert!(missing.is_empty());
    }
}
