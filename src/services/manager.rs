//! Services manager for long-running and background services.
//!
//! Services register with the manager and are started/stopped together.
//! Start order respects [dependencies](Service::dependencies); a service is only
//! started after all of its dependencies, and stopped before them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Health status of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of a service health check.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// A component with a lifecycle: a connection pool, a timer set, a server loop.
///
/// Use [tracing] for lifecycle logging, with the service name as a field so
/// logs are filterable (e.g. `tracing::info!(service = %self.name(), "Started")`).
/// Stateless utilities do not implement this; they are constructed and passed
/// where needed.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Unique name for logging and lookup (e.g. "database", "scheduler").
    fn name(&self) -> &str;

    /// Names of services that must be started before this one. Cycles are an error.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Start background tasks or connections. Idempotent allowed.
    async fn start(&self) -> Result<()>;

    /// Stop background tasks and release resources. Idempotent allowed.
    async fn stop(&self) -> Result<()>;

    /// Report current health. Used by `/readyz`.
    async fn health(&self) -> Result<ServiceHealth> {
        Ok(ServiceHealth::healthy())
    }
}

/// Registry and lifecycle controller for services.
#[derive(Default)]
pub struct ServicesManager {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    started: RwLock<HashSet<String>>,
}

impl ServicesManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Does not start it. A service with the same name is
    /// replaced (the previous instance is not stopped).
    pub async fn register(&self, service: Arc<dyn Service>) {
        let name = service.name().to_string();
        let mut guard = self.services.write().await;
        if guard.insert(name.clone(), service).is_some() {
            warn!(service = %name, "Service '{}' reregistered, overwriting previous", name);
        } else {
            info!(service = %name, "Service '{}' registered", name);
        }
    }

    /// Compute start order from dependencies (topological order). Returns an error on unknown deps or cycles.
    async fn start_order(&self) -> Result<Vec<String>> {
        let guard = self.services.read().await;
        let names: HashSet<String> = guard.keys().cloned().collect();
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for (name, svc) in guard.iter() {
            let d = svc.dependencies();
            for dep in &d {
                if !names.contains(dep) {
                    anyhow::bail!(
                        "Service {} depends on {} which is not registered",
                        name,
                        dep
                    );
                }
            }
            deps.insert(name.clone(), d);
        }
        drop(guard);

        // Kahn's algorithm: start order = topological order (dependencies first).
        let mut in_degree: HashMap<String, usize> = deps
            .iter()
            .map(|(name, d)| (name.clone(), d.len()))
            .collect();
        let mut dependent_on: HashMap<String, Vec<String>> =
            names.iter().map(|n| (n.clone(), Vec::new())).collect();
        for (name, d) in &deps {
            for dep in d {
                if let Some(dependents) = dependent_on.get_mut(dep) {
                    dependents.push(name.clone());
                }
            }
        }
        let mut queue: Vec<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| n.clone())
            .collect();
        queue.sort();
        let mut order = Vec::with_capacity(names.len());
        while let Some(n) = queue.pop() {
            order.push(n.clone());
            for s in dependent_on.get(&n).map(Vec::as_slice).unwrap_or_default() {
                if let Some(deg) = in_degree.get_mut(s) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push(s.clone());
                    }
                }
            }
        }
        if order.len() != names.len() {
            anyhow::bail!("Service dependency cycle detected");
        }
        Ok(order)
    }

    /// Start all registered services in dependency order (dependencies first).
    /// Returns an error on unknown dependency, cycle, or if any start fails.
    pub async fn start_all(&self) -> Result<()> {
        let order = self.start_order().await?;
        for name in &order {
            let svc = self.get(name).await;
            if let Some(s) = svc {
                if let Err(e) = s.start().await {
                    warn!(service = %name, error = %e, "Service '{}' start failed", name);
                    return Err(e).context(format!("failed to start service {}", name));
                }
                self.started.write().await.insert(name.clone());
                info!(service = %name, "Service '{}' started", name);
            }
        }
        Ok(())
    }

    /// Stop all started services in reverse dependency order (dependents first).
    pub async fn stop_all(&self) -> Result<()> {
        let order = self.start_order().await?;
        for name in order.into_iter().rev() {
            if !self.is_started(&name).await {
                continue;
            }
            if let Some(s) = self.get(&name).await {
                if let Err(e) = s.stop().await {
                    warn!(service = %name, error = %e, "Service '{}' stop failed", name);
                } else {
                    info!(service = %name, "Service '{}' stopped", name);
                }
                self.started.write().await.remove(&name);
            }
        }
        Ok(())
    }

    /// Health check for all registered services, run concurrently. Services
    /// that return an error from [health](Service::health) are reported as
    /// unhealthy with the message; services not started are reported as unhealthy.
    pub async fn health_all(&self) -> HashMap<String, ServiceHealth> {
        let services: Vec<(String, Arc<dyn Service>)> = self
            .services
            .read()
            .await
            .iter()
            .map(|(name, svc)| (name.clone(), svc.clone()))
            .collect();
        let started = self.started.read().await.clone();

        let checks = services.into_iter().map(|(name, svc)| {
            let is_started = started.contains(&name);
            async move {
                let health = if !is_started {
                    ServiceHealth::unhealthy("not started")
                } else {
                    match svc.health().await {
                        Ok(h) => h,
                        Err(e) => ServiceHealth::unhealthy(e.to_string()),
                    }
                };
                (name, health)
            }
        });

        join_all(checks).await.into_iter().collect()
    }

    /// Return whether the given service is currently started.
    pub async fn is_started(&self, name: &str) -> bool {
        self.started.read().await.contains(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.read().await.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        deps: Vec<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Service for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.iter().map(|d| d.to_string()).collect()
        }

        async fn start(&self) -> Result<()> {
            self.log.lock().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.log.lock().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        deps: Vec<&'static str>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Service> {
        Arc::new(Recorder {
            name,
            deps,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_start_and_stop_follow_dependencies() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ServicesManager::new();
        manager.register(recorder("http", vec!["database"], &log)).await;
        manager.register(recorder("scheduler", vec!["database"], &log)).await;
        manager.register(recorder("database", vec![], &log)).await;

        manager.start_all().await.unwrap();
        assert_eq!(log.lock()[0], "start database");
        assert!(manager.is_started("scheduler").await);

        log.lock().clear();
        manager.stop_all().await.unwrap();
        assert_eq!(log.lock().last().map(String::as_str), Some("stop database"));
        assert!(!manager.is_started("http").await);
    }

    #[tokio::test]
    async fn test_unknown_dependency_and_cycle_fail() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let manager = ServicesManager::new();
        manager.register(recorder("http", vec!["database"], &log)).await;
        assert!(manager.start_all().await.is_err());

        let manager = ServicesManager::new();
        manager.register(recorder("a", vec!["b"], &log)).await;
        manager.register(recorder("b", vec!["a"], &log)).await;
        assert!(manager.start_all().await.is_err());
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_unstarted_services() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ServicesManager::new();
        manager.register(recorder("database", vec![], &log)).await;

        let health = manager.health_all().await;
        assert_eq!(health["database"].status, HealthStatus::Unhealthy);

        manager.start_all().await.unwrap();
        assert_eq!(manager.health_all().await["database"].status, HealthStatus::Healthy);
    }
}
