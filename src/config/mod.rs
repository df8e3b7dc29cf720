//! Application configuration management

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (for generating URLs)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// SQLite database path or `sqlite:` URL
    pub database_url: String,

    /// Maximum pool size
    pub database_max_connections: u32,

    /// JWT secret override. When unset the secret persisted in `auth_secrets` is used.
    pub jwt_secret: Option<String>,

    /// Access token lifetime in seconds
    pub access_token_lifetime: i64,

    /// Refresh token lifetime in seconds
    pub refresh_token_lifetime: i64,

    /// Bcrypt cost factor
    pub bcrypt_cost: u32,

    /// Admin account created on first start when no users exist
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    /// Base URL of the external catalog API
    pub catalog_api_url: String,

    /// Optional bearer key for the catalog API
    pub catalog_api_key: Option<String>,

    /// `limit` query parameter sent with every catalog page request
    pub catalog_page_limit: u32,

    /// Client-side rate limit for catalog requests
    pub catalog_requests_per_second: u32,

    /// Maximum number of cache entries before eviction
    pub cache_max_entries: usize,

    /// TTL applied when neither the caller nor the prefix table supplies one
    pub cache_default_ttl: Duration,

    /// Directory for `VACUUM INTO` snapshots
    pub backup_path: String,

    /// Load enabled scrape configs into live timers at boot
    pub auto_scrape_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/cinebase.db".to_string());

        Ok(Self {
            host: env::var("HOST").ok(),
            port: parse_var("PORT", 3001).context("Invalid PORT")?,
            database_url,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            jwt_secret: env::var("JWT_SECRET")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            access_token_lifetime: parse_var("ACCESS_TOKEN_LIFETIME", 15 * 60)
                .context("Invalid ACCESS_TOKEN_LIFETIME")?,
            refresh_token_lifetime: parse_var("REFRESH_TOKEN_LIFETIME", 7 * 24 * 60 * 60)
                .context("Invalid REFRESH_TOKEN_LIFETIME")?,
            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)
                .context("Invalid BCRYPT_COST")?,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            catalog_api_url: env::var("CATALOG_API_URL")
                .unwrap_or_else(|_| "https://catalog.example.com/api".to_string()),
            catalog_api_key: env::var("CATALOG_API_KEY").ok(),
            catalog_page_limit: parse_var("CATALOG_PAGE_LIMIT", 24)
                .context("Invalid CATALOG_PAGE_LIMIT")?,
            catalog_requests_per_second: parse_var("CATALOG_REQUESTS_PER_SECOND", 2)
                .context("Invalid CATALOG_REQUESTS_PER_SECOND")?,
            cache_max_entries: parse_var("CACHE_MAX_ENTRIES", 1000)
                .context("Invalid CACHE_MAX_ENTRIES")?,
            cache_default_ttl: Duration::from_secs(
                parse_var("CACHE_DEFAULT_TTL_SECS", 300).context("Invalid CACHE_DEFAULT_TTL_SECS")?,
            ),
            backup_path: env::var("BACKUP_PATH").unwrap_or_else(|_| "./data/backups".to_string()),
            auto_scrape_enabled: env::var("AUTO_SCRAPE_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        })
    }

    /// SQLite connection URL derived from `database_url`
    pub fn sqlite_url(&self) -> String {
        if self.database_url.starts_with("sqlite:") {
            self.database_url.clone()
        } else {
            format!("sqlite://{}?mode=rwc", self.database_url)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: 3001,
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            jwt_secret: None,
            access_token_lifetime: 15 * 60,
            refresh_token_lifetime: 7 * 24 * 60 * 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_username: None,
            admin_password: None,
            catalog_api_url: "https://catalog.example.com/api".to_string(),
            catalog_api_key: None,
            catalog_page_limit: 24,
            catalog_requests_per_second: 2,
            cache_max_entries: 1000,
            cache_default_ttl: Duration::from_secs(300),
            backup_path: "./data/backups".to_string(),
            auto_scrape_enabled: true,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => Ok(raw.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_url_from_path() {
        let config = Config {
            database_url: "./data/cinebase.db".to_string(),
            ..Default::default()
        };
        assert_eq!(config.sqlite_url(), "sqlite://./data/cinebase.db?mode=rwc");
    }

    #[test]
    fn test_sqlite_url_passthrough() {
        let config = Config::default();
        assert_eq!(config.sqlite_url(), "sqlite::memory:");
    }
}
