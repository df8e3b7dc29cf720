//! HTTP server service: binds the Axum app and runs it in a background task.
//!
//! Depends on the database and the scheduler. This service resolves the JWT
//! secret, builds [AppState] and the router in [start](Service::start) and
//! runs the server until [stop](Service::stop).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::app::{AppState, build_app};
use crate::config::Config;
use crate::db::Database;
use crate::services::auth::{AuthConfig, AuthService};
use crate::services::cache::SharedCache;
use crate::services::database::load_jwt_secret;
use crate::services::manager::{Service, ServiceHealth, ServicesManager};
use crate::services::scheduler::AutoScrapeScheduler;

pub struct HttpServerService {
    manager: Arc<ServicesManager>,
    config: Arc<Config>,
    db: Database,
    cache: SharedCache,
    scheduler: AutoScrapeScheduler,
    /// JoinHandle for the server task; set in start(), taken in stop().
    join_handle: parking_lot::RwLock<Option<tokio::task::JoinHandle<Result<()>>>>,
    /// Send to trigger server shutdown; set in start(), taken in stop().
    shutdown_tx: parking_lot::RwLock<Option<broadcast::Sender<()>>>,
}

impl HttpServerService {
    pub fn new(
        manager: Arc<ServicesManager>,
        config: Arc<Config>,
        db: Database,
        cache: SharedCache,
        scheduler: AutoScrapeScheduler,
    ) -> Self {
        Self {
            manager,
            config,
            db,
            cache,
            scheduler,
            join_handle: parking_lot::RwLock::new(None),
            shutdown_tx: parking_lot::RwLock::new(None),
        }
    }

    async fn build_state(&self) -> Result<AppState> {
        let secret = match &self.config.jwt_secret {
            Some(secret) => secret.clone(),
            None => load_jwt_secret(&self.db).await?,
        };
        let auth = AuthService::new(self.db.clone(), AuthConfig::from_config(&self.config, secret));

        if let (Some(username), Some(password)) =
            (&self.config.admin_username, &self.config.admin_password)
        {
            auth.ensure_admin(username, password)
                .await
                .context("Failed to create initial admin")?;
        }

        Ok(AppState {
            config: self.config.clone(),
            db: self.db.clone(),
            cache: self.cache.clone(),
            auth,
            scheduler: self.scheduler.clone(),
            services: self.manager.clone(),
        })
    }
}

#[async_trait]
impl Service for HttpServerService {
    fn name(&self) -> &str {
        "http"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["database".to_string(), "scheduler".to_string()]
    }

    async fn start(&self) -> Result<()> {
        info!(service = "http", "HTTP server service starting");

        let app = build_app(self.build_state().await?);
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("HTTP server: bind failed")?;

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();

        let serve_fut = axum::serve(listener, app);
        let join = tokio::spawn(async move {
            tokio::select! {
                result = serve_fut => result.context("axum::serve"),
                _ = shutdown_rx.recv() => Ok(()),
            }
        });

        *self.join_handle.write() = Some(join);
        *self.shutdown_tx.write() = Some(shutdown_tx);

        info!(service = "http", "Listening on http://{}", addr);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let tx = self.shutdown_tx.write().take();
        let handle = self.join_handle.write().take();
        drop(tx); // dropping the sender unblocks the server task's recv
        if let Some(h) = handle {
            let _ = h.await;
        }
        info!(service = "http", "HTTP server service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        match self.join_handle.read().as_ref() {
            Some(handle) if !handle.is_finished() => Ok(ServiceHealth::healthy()),
            _ => Ok(ServiceHealth::unhealthy("server task not running")),
        }
    }
}
