//! cinebase backend entry point
//!
//! Loads configuration, registers the services with the [ServicesManager]
//! and runs until Ctrl+C.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinebase::config::Config;
use cinebase::jobs::MaintenanceService;
use cinebase::services::{
    AutoScrapeScheduler, Cache, CacheConfig, CatalogClient, CatalogClientConfig, CatalogScraper,
    DatabaseService, HttpServerService, ServicesManager, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinebase=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Arc::new(Config::from_env()?);
    tracing::info!(port = config.port, "Starting cinebase");

    let database = DatabaseService::connect(&config.sqlite_url(), config.database_max_connections).await?;
    let db = database.db().clone();

    let cache = Arc::new(Cache::new(CacheConfig::from_config(&config)));
    let catalog = Arc::new(CatalogClient::new(CatalogClientConfig::from_config(&config))?);
    let scraper = Arc::new(CatalogScraper::new(db.clone(), catalog, cache.clone()));
    let scheduler = AutoScrapeScheduler::new(Arc::new(db.clone()), scraper, Arc::new(SystemClock))
        .with_autostart(config.auto_scrape_enabled);

    let manager = Arc::new(ServicesManager::new());
    manager.register(Arc::new(database)).await;
    manager.register(Arc::new(scheduler.clone())).await;
    manager
        .register(Arc::new(MaintenanceService::new(db.clone(), cache.clone())))
        .await;
    manager
        .register(Arc::new(HttpServerService::new(
            manager.clone(),
            config.clone(),
            db,
            cache,
            scheduler,
        )))
        .await;

    manager.start_all().await?;
    tracing::info!("All services started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    manager.stop_all().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
