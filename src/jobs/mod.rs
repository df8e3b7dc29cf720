//! Background maintenance jobs
//!
//! Cron-scheduled housekeeping: expired cache entries, expired refresh
//! tokens, and old analytics and scrape history rows.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::services::cache::SharedCache;
use crate::services::manager::{Service, ServiceHealth};

pub const PAGE_VIEW_RETENTION_KEY: &str = "analytics.retention_days";
pub const SCRAPE_RUN_RETENTION_KEY: &str = "scraper.retention_days";

/// Retention settings are clamped to 1..=this many days
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Rows removed by one history prune
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneResult {
    pub page_views: u64,
    pub scrape_runs: u64,
}

/// Drop expired cache entries
pub fn purge_cache(cache: &SharedCache) -> usize {
    let removed = cache.purge_expired();
    if removed > 0 {
        debug!(job = "cache_purge", removed, "Purged expired cache entries");
    }
    removed
}

/// Delete refresh tokens past their expiry
pub async fn cleanup_refresh_tokens(db: &Database) -> Result<u64> {
    let removed = db.users().cleanup_expired_refresh_tokens().await?;
    if removed > 0 {
        info!(job = "token_cleanup", removed, "Deleted expired refresh tokens");
    }
    Ok(removed)
}

/// Oldest timestamp kept for a retention of `days`
fn retention_cutoff(now: DateTime<Utc>, key: &str, days: i64) -> Option<DateTime<Utc>> {
    let clamped = days.clamp(1, MAX_RETENTION_DAYS);
    if clamped != days {
        warn!(job = "history_prune", setting = key, days, clamped, "Retention out of range, clamped");
    }
    let cutoff = TimeDelta::try_days(clamped).and_then(|d| now.checked_sub_signed(d));
    if cutoff.is_none() {
        warn!(job = "history_prune", setting = key, "Retention cutoff out of range, skipping");
    }
    cutoff
}

/// Delete page views and scrape runs older than their retention settings
pub async fn prune_history(db: &Database, now: DateTime<Utc>) -> Result<PruneResult> {
    let settings = db.settings();
    let view_days: i64 = settings.get_or_default(PAGE_VIEW_RETENTION_KEY, 90).await?;
    let run_days: i64 = settings.get_or_default(SCRAPE_RUN_RETENTION_KEY, 30).await?;

    let mut result = PruneResult::default();
    if let Some(before) = retention_cutoff(now, PAGE_VIEW_RETENTION_KEY, view_days) {
        result.page_views = db.analytics().prune(before).await?;
    }
    if let Some(before) = retention_cutoff(now, SCRAPE_RUN_RETENTION_KEY, run_days) {
        result.scrape_runs = db.scrape_configs().prune_runs(before).await?;
    }

    info!(
        job = "history_prune",
        page_views = result.page_views,
        scrape_runs = result.scrape_runs,
        "Pruned history"
    );
    Ok(result)
}

/// Runs the maintenance jobs on a cron scheduler
pub struct MaintenanceService {
    db: Database,
    cache: SharedCache,
    scheduler: Mutex<Option<JobScheduler>>,
}

impl MaintenanceService {
    pub fn new(db: Database, cache: SharedCache) -> Self {
        Self {
            db,
            cache,
            scheduler: Mutex::new(None),
        }
    }

    async fn build_scheduler(&self) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new().await?;

        // Cache purge - every 10 minutes
        let cache = self.cache.clone();
        let cache_job = Job::new_async("0 */10 * * * *", move |_uuid, _l| {
            let cache = cache.clone();
            Box::pin(async move {
                purge_cache(&cache);
            })
        })?;
        scheduler.add(cache_job).await?;

        // Refresh token cleanup - hourly
        let db = self.db.clone();
        let token_job = Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let db = db.clone();
            Box::pin(async move {
                if let Err(e) = cleanup_refresh_tokens(&db).await {
                    error!(job = "token_cleanup", error = %e, "Token cleanup failed");
                }
            })
        })?;
        scheduler.add(token_job).await?;

        // History prune - daily at 3 AM
        let db = self.db.clone();
        let prune_job = Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let db = db.clone();
            Box::pin(async move {
                if let Err(e) = prune_history(&db, Utc::now()).await {
                    error!(job = "history_prune", error = %e, "History prune failed");
                }
            })
        })?;
        scheduler.add(prune_job).await?;

        Ok(scheduler)
    }
}

#[async_trait]
impl Service for MaintenanceService {
    fn name(&self) -> &str {
        "maintenance"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["database".to_string()]
    }

    async fn start(&self) -> Result<()> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let scheduler = self.build_scheduler().await?;
        scheduler.start().await?;
        *guard = Some(scheduler);

        info!(service = "maintenance", "Maintenance jobs scheduled");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler.shutdown().await?;
        }
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        if self.scheduler.lock().await.is_some() {
            Ok(ServiceHealth::healthy())
        } else {
            Ok(ServiceHealth::unhealthy("job scheduler not running"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use chrono::Duration;
    use crate::db::sqlite_helpers::datetime_to_str;
    use crate::db::test_db;
    use crate::services::cache::{Cache, CacheConfig};

    #[tokio::test]
    async fn test_prune_history_uses_retention_settings() {
        let db = test_db().await;
        let now = Utc::now();

        for days in [1, 40, 120] {
            sqlx::query("INSERT INTO page_views (path, viewed_at) VALUES ('/', ?)")
                .bind(datetime_to_str(now - Duration::days(days)))
                .execute(db.pool())
                .await
                .unwrap();
        }
        db.settings().set(PAGE_VIEW_RETENTION_KEY, 30).await.unwrap();

        let result = prune_history(&db, now).await.unwrap();
        assert_eq!(result.page_views, 2);
        assert_eq!(result.scrape_runs, 0);
    }

    #[tokio::test]
    async fn test_prune_history_clamps_huge_retention() {
        let db = test_db().await;
        let now = Utc::now();

        for days in [1, 400, 4000] {
            sqlx::query("INSERT INTO page_views (path, viewed_at) VALUES ('/', ?)")
                .bind(datetime_to_str(now - Duration::days(days)))
                .execute(db.pool())
                .await
                .unwrap();
        }
        db.settings()
            .set(PAGE_VIEW_RETENTION_KEY, 1_000_000_000_000_i64)
            .await
            .unwrap();
        db.settings().set(SCRAPE_RUN_RETENTION_KEY, i64::MAX).await.unwrap();

        let result = prune_history(&db, now).await.unwrap();
        assert_eq!(result.page_views, 1);
        assert_eq!(result.scrape_runs, 0);
    }

    #[test]
    fn test_retention_cutoff_bounds() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, "k", 0), Some(now - Duration::days(1)));
        assert_eq!(
            retention_cutoff(now, "k", i64::MAX),
            Some(now - Duration::days(MAX_RETENTION_DAYS))
        );
    }

    #[test]
    fn test_purge_cache() {
        let cache: SharedCache = Arc::new(Cache::new(CacheConfig::default()));
        cache.set("k", &1, Some(std::time::Duration::ZERO));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(purge_cache(&cache), 1);
    }

    #[tokio::test]
    async fn test_cleanup_refresh_tokens() {
        let db = test_db().await;
        let user = db
            .users()
            .create(crate::db::CreateUser {
                username: "admin".to_string(),
                password_hash: "x".to_string(),
                role: "admin".to_string(),
                display_name: None,
            })
            .await
            .unwrap();
        db.users()
            .create_refresh_token(&user.id, "old", &datetime_to_str(Utc::now() - Duration::hours(1)))
            .await
            .unwrap();
        db.users()
            .create_refresh_token(&user.id, "new", &datetime_to_str(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(cleanup_refresh_tokens(&db).await.unwrap(), 1);
        assert!(db.users().get_refresh_token_by_hash("new").await.unwrap().is_some());
    }
}
