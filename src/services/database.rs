//! Database service: wraps the SQLite pool for lifecycle (start/stop/health).
//!
//! Other services that need the database should declare `dependencies: ["database"]`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use sqlx::query;
use tracing::{info, warn};

use crate::db::Database;
use crate::services::manager::{Service, ServiceHealth};

/// Key used to store the JWT signing secret in auth_secrets
const AUTH_SECRETS_JWT_KEY: &str = "jwt_secret";

/// The stored JWT signing secret, generated and stored on first use.
/// An empty stored value is replaced.
pub async fn load_jwt_secret(db: &Database) -> Result<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM auth_secrets WHERE key = ?")
        .bind(AUTH_SECRETS_JWT_KEY)
        .fetch_optional(db.pool())
        .await?;

    if let Some((value,)) = row {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }

    let secret = generate_jwt_secret();
    sqlx::query("INSERT OR REPLACE INTO auth_secrets (key, value) VALUES (?, ?)")
        .bind(AUTH_SECRETS_JWT_KEY)
        .bind(&secret)
        .execute(db.pool())
        .await?;
    info!(service = "database", "JWT secret generated and stored in database");
    Ok(secret)
}

fn generate_jwt_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Owns the database pool. Register this first so that services depending on
/// `"database"` start after the schema is in place.
pub struct DatabaseService {
    db: Database,
}

impl DatabaseService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect to `url` (created if missing)
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let db = Database::connect(url, max_connections)
            .await
            .context("Database service: connect failed")?;
        Ok(Self::new(db))
    }

    /// Access the database (e.g. to clone for app state). Valid until [Service::stop] is called.
    pub fn db(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl Service for DatabaseService {
    fn name(&self) -> &str {
        "database"
    }

    async fn start(&self) -> Result<()> {
        info!(service = "database", "Database service starting");
        query("SELECT 1").execute(self.db.pool()).await?;

        self.db.prepare().await?;
        load_jwt_secret(&self.db).await?;

        info!(service = "database", "Database service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.db.close().await;
        info!(service = "database", "Database service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        match query("SELECT 1").execute(self.db.pool()).await {
            Ok(_) => Ok(ServiceHealth::healthy()),
            Err(e) => {
                warn!(service = "database", error = %e, "Health check failed");
                Ok(ServiceHealth::unhealthy(e.to_string()))
            }
        }
    }
}
