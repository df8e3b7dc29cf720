//! Pre-seed data for initial database setup.
//!
//! Runs after schema sync to insert default site settings. Uses
//! INSERT OR IGNORE so re-runs are idempotent (existing rows are preserved).

use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sqlite_helpers::now_iso8601;

/// Result of running seed operations.
#[derive(Debug, Default)]
pub struct SeedResult {
    pub tables_seeded: Vec<String>,
    pub errors: Vec<String>,
}

struct SettingRow {
    key: &'static str,
    value: &'static str,
    description: &'static str,
    category: &'static str,
}

const DEFAULT_SETTINGS: &[SettingRow] = &[
    // Public site settings (served by GET /api/settings)
    SettingRow {
        key: "site.name",
        value: "\"Cinebase\"",
        description: "Site name shown in the header and page titles",
        category: "public",
    },
    SettingRow {
        key: "site.description",
        value: "\"Browse the latest videos\"",
        description: "Meta description for the homepage",
        category: "public",
    },
    SettingRow {
        key: "site.logo_url",
        value: "null",
        description: "Logo image URL (null = text logo)",
        category: "public",
    },
    SettingRow {
        key: "homepage.featured_count",
        value: "8",
        description: "Number of featured videos on the homepage",
        category: "public",
    },
    SettingRow {
        key: "homepage.latest_count",
        value: "24",
        description: "Number of latest videos on the homepage",
        category: "public",
    },
    SettingRow {
        key: "homepage.popular_count",
        value: "12",
        description: "Number of popular videos on the homepage",
        category: "public",
    },
    SettingRow {
        key: "ads.enabled",
        value: "true",
        description: "Serve ads on public pages",
        category: "public",
    },
    // Admin-only
    SettingRow {
        key: "analytics.retention_days",
        value: "90",
        description: "Days of page-view history kept by the nightly prune",
        category: "analytics",
    },
    SettingRow {
        key: "scraper.retention_days",
        value: "30",
        description: "Days of scrape-run history kept by the nightly prune",
        category: "scraper",
    },
];

/// Seed default settings.
async fn seed_app_settings(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let now = now_iso8601();
    let mut inserted = 0u64;

    for row in DEFAULT_SETTINGS {
        let r = sqlx::query(
            r#"INSERT OR IGNORE INTO app_settings (id, key, value, description, category, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(row.key)
        .bind(row.value)
        .bind(row.description)
        .bind(row.category)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        if r.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Run all seed routines. Safe to call multiple times (uses INSERT OR IGNORE).
pub async fn run_seeds(pool: &SqlitePool) -> SeedResult {
    let mut result = SeedResult::default();

    match seed_app_settings(pool).await {
        Ok(n) => {
            if n > 0 {
                debug!(table = "app_settings", count = n, "Seeded table");
                result.tables_seeded.push(format!("app_settings ({} rows)", n));
            }
        }
        Err(e) => {
            let msg = format!("Seed app_settings: {}", e);
            warn!("{}", msg);
            result.errors.push(msg);
        }
    }

    if !result.tables_seeded.is_empty() {
        info!(tables = ?result.tables_seeded, "Pre-seed data applied");
    }

    result
}
