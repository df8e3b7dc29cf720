//! Automatic schema synchronization from static table definitions
//!
//! - Creates missing tables
//! - Adds missing columns to existing tables
//! - Creates indexes (`IF NOT EXISTS`)
//! - Does NOT handle column renames or type changes
//!
//! Default rows are inserted afterwards by [run_seeds].

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

pub use crate::db::seed::run_seeds;

/// Result of a schema sync operation
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub columns_added: Vec<(String, String)>, // (table, column)
    pub errors: Vec<String>,
}

/// A column as it would appear in `ALTER TABLE ... ADD COLUMN`
struct ColumnDef {
    name: &'static str,
    sql_type: &'static str,
    nullable: bool,
    default: Option<&'static str>,
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        nullable: true,
        default: None,
    }
}

const fn col_default(name: &'static str, sql_type: &'static str, default: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        nullable: false,
        default: Some(default),
    }
}

const fn col_required(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        nullable: false,
        default: None,
    }
}

struct TableDef {
    name: &'static str,
    create_sql: &'static str,
    columns: &'static [ColumnDef],
    indexes: &'static [&'static str],
}

const TABLES: &[TableDef] = &[
    TableDef {
        name: "auth_secrets",
        create_sql: r#"
            CREATE TABLE auth_secrets (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"#,
        columns: &[],
        indexes: &[],
    },
    TableDef {
        name: "users",
        create_sql: r#"
            CREATE TABLE users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'admin',
                display_name TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_login_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        columns: &[
            col("display_name", "TEXT"),
            col_default("is_active", "INTEGER", "1"),
            col("last_login_at", "TEXT"),
        ],
        indexes: &[],
    },
    TableDef {
        name: "refresh_tokens",
        create_sql: r#"
            CREATE TABLE refresh_tokens (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT
            )"#,
        columns: &[col("last_used_at", "TEXT")],
        indexes: &["CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id)"],
    },
    TableDef {
        name: "app_settings",
        create_sql: r#"
            CREATE TABLE app_settings (
                id TEXT PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL,
                description TEXT,
                category TEXT NOT NULL DEFAULT 'general',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        columns: &[col("description", "TEXT"), col_default("category", "TEXT", "'general'")],
        indexes: &[],
    },
    TableDef {
        name: "videos",
        create_sql: r#"
            CREATE TABLE videos (
                id TEXT PRIMARY KEY,
                external_id TEXT UNIQUE,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT,
                thumbnail_url TEXT,
                video_url TEXT,
                embed_url TEXT,
                duration_seconds INTEGER,
                views INTEGER NOT NULL DEFAULT 0,
                rating REAL,
                is_featured INTEGER NOT NULL DEFAULT 0,
                is_published INTEGER NOT NULL DEFAULT 1,
                country TEXT,
                release_year INTEGER,
                source TEXT NOT NULL DEFAULT 'manual',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        columns: &[
            col("embed_url", "TEXT"),
            col("rating", "REAL"),
            col("country", "TEXT"),
            col("release_year", "INTEGER"),
            col_default("source", "TEXT", "'manual'"),
        ],
        indexes: &[
            "CREATE INDEX IF NOT EXISTS idx_videos_created ON videos(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_videos_views ON videos(views)",
            "CREATE INDEX IF NOT EXISTS idx_videos_featured ON videos(is_featured)",
        ],
    },
    TableDef {
        name: "models",
        create_sql: r#"
            CREATE TABLE models (
                id TEXT PRIMARY KEY,
                external_id TEXT UNIQUE,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                bio TEXT,
                avatar_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        columns: &[col("bio", "TEXT"), col("avatar_url", "TEXT")],
        indexes: &[],
    },
    TableDef {
        name: "categories",
        create_sql: r#"
            CREATE TABLE categories (
                id TEXT PRIMARY KEY,
                external_id TEXT UNIQUE,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT,
                thumbnail_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        columns: &[col("description", "TEXT"), col("thumbnail_url", "TEXT")],
        indexes: &[],
    },
    TableDef {
        name: "countries",
        create_sql: r#"
            CREATE TABLE countries (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )"#,
        columns: &[],
        indexes: &[],
    },
    TableDef {
        name: "video_categories",
        create_sql: r#"
            CREATE TABLE video_categories (
                video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (video_id, category_id)
            )"#,
        columns: &[],
        indexes: &["CREATE INDEX IF NOT EXISTS idx_video_categories_category ON video_categories(category_id)"],
    },
    TableDef {
        name: "video_models",
        create_sql: r#"
            CREATE TABLE video_models (
                video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                model_id TEXT NOT NULL REFERENCES models(id) ON DELETE CASCADE,
                PRIMARY KEY (video_id, model_id)
            )"#,
        columns: &[],
        indexes: &["CREATE INDEX IF NOT EXISTS idx_video_models_model ON video_models(model_id)"],
    },
    TableDef {
        name: "ads",
        create_sql: r#"
            CREATE TABLE ads (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                position TEXT NOT NULL,
                ad_type TEXT NOT NULL DEFAULT 'banner',
                content TEXT,
                link_url TEXT,
                image_url TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                impressions INTEGER NOT NULL DEFAULT 0,
                clicks INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        columns: &[
            col("content", "TEXT"),
            col("link_url", "TEXT"),
            col("image_url", "TEXT"),
            col_default("priority", "INTEGER", "0"),
            col_default("impressions", "INTEGER", "0"),
            col_default("clicks", "INTEGER", "0"),
        ],
        indexes: &["CREATE INDEX IF NOT EXISTS idx_ads_position ON ads(position, is_active)"],
    },
    TableDef {
        name: "scrape_configs",
        create_sql: r#"
            CREATE TABLE scrape_configs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                source_type TEXT NOT NULL,
                start_page INTEGER NOT NULL DEFAULT 1,
                end_page INTEGER NOT NULL DEFAULT 1,
                keyword TEXT,
                interval_minutes INTEGER NOT NULL DEFAULT 60,
                update_existing INTEGER NOT NULL DEFAULT 0,
                last_run TEXT,
                next_run TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        columns: &[
            col("keyword", "TEXT"),
            col_default("update_existing", "INTEGER", "0"),
            col("last_run", "TEXT"),
            col("next_run", "TEXT"),
        ],
        indexes: &[],
    },
    TableDef {
        name: "scrape_runs",
        create_sql: r#"
            CREATE TABLE scrape_runs (
                id TEXT PRIMARY KEY,
                config_id TEXT NOT NULL,
                trigger TEXT NOT NULL DEFAULT 'schedule',
                status TEXT NOT NULL,
                pages INTEGER NOT NULL DEFAULT 0,
                fetched INTEGER NOT NULL DEFAULT 0,
                inserted INTEGER NOT NULL DEFAULT 0,
                updated INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL
            )"#,
        columns: &[col_default("trigger", "TEXT", "'schedule'"), col("error", "TEXT")],
        indexes: &["CREATE INDEX IF NOT EXISTS idx_scrape_runs_config ON scrape_runs(config_id, started_at)"],
    },
    TableDef {
        name: "page_views",
        create_sql: r#"
            CREATE TABLE page_views (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                video_id TEXT,
                viewed_at TEXT NOT NULL
            )"#,
        columns: &[col("video_id", "TEXT"), col_required("viewed_at", "TEXT")],
        indexes: &["CREATE INDEX IF NOT EXISTS idx_page_views_viewed ON page_views(viewed_at)"],
    },
];

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Get existing columns for a table
async fn get_table_columns(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
        sqlx::query_as(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(_, name, _, _, _, _)| name).collect())
}

/// Generate ALTER TABLE ADD COLUMN SQL
fn generate_add_column_sql(table_name: &str, col: &ColumnDef) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table_name, col.name, col.sql_type
    );

    // SQLite cannot add NOT NULL columns without a default
    if let Some(default) = col.default {
        sql.push_str(&format!(" NOT NULL DEFAULT {}", default));
    } else if !col.nullable {
        let default_val = match col.sql_type {
            "TEXT" => "''",
            "INTEGER" => "0",
            "REAL" => "0.0",
            _ => "''",
        };
        sql.push_str(&format!(" NOT NULL DEFAULT {}", default_val));
    }

    sql
}

async fn sync_table(pool: &SqlitePool, table: &TableDef) -> Result<SchemaSyncResult, sqlx::Error> {
    let mut result = SchemaSyncResult::default();

    if !table_exists(pool, table.name).await? {
        debug!("Creating table {}", table.name);
        match sqlx::query(table.create_sql.trim()).execute(pool).await {
            Ok(_) => {
                info!("Created table: {}", table.name);
                result.tables_created.push(table.name.to_string());
            }
            Err(e) => {
                let msg = format!("Failed to create table {}: {}", table.name, e);
                warn!("{}", msg);
                result.errors.push(msg);
            }
        }
    } else {
        let existing_columns = get_table_columns(pool, table.name).await?;
        for col_def in table.columns {
            if existing_columns.iter().any(|c| c == col_def.name) {
                continue;
            }
            let alter_sql = generate_add_column_sql(table.name, col_def);
            debug!("Adding column to {}: {}", table.name, alter_sql);
            match sqlx::query(&alter_sql).execute(pool).await {
                Ok(_) => {
                    info!("Added column {}.{}", table.name, col_def.name);
                    result
                        .columns_added
                        .push((table.name.to_string(), col_def.name.to_string()));
                }
                Err(e) => {
                    let msg = format!("Failed to add column {}.{}: {}", table.name, col_def.name, e);
                    warn!("{}", msg);
                    result.errors.push(msg);
                }
            }
        }
    }

    for index_sql in table.indexes {
        if let Err(e) = sqlx::query(index_sql).execute(pool).await {
            result
                .errors
                .push(format!("Failed to create index on {}: {}", table.name, e));
        }
    }

    Ok(result)
}

/// Sync all tables to the database.
///
/// Called at startup so every table exists with the expected columns.
pub async fn sync_all_schemas(pool: &SqlitePool) -> SchemaSyncResult {
    let mut total_result = SchemaSyncResult::default();

    for table in TABLES {
        match sync_table(pool, table).await {
            Ok(result) => {
                total_result.tables_created.extend(result.tables_created);
                total_result.columns_added.extend(result.columns_added);
                total_result.errors.extend(result.errors);
            }
            Err(e) => {
                total_result
                    .errors
                    .push(format!("Error syncing {}: {}", table.name, e));
            }
        }
    }

    total_result
}
