//! Lifecycle manager for long-running services.
//!
//! Services register with the manager and are started and stopped together.
//! Start order respects [dependencies](Service::dependencies): a service is
//! only started after all of its dependencies, and stopped before them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Health status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of a service health check.
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub status: HealthStatus,
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

/// A component with background work that the manager starts and stops.
///
/// Lifecycle events are logged with [tracing] under the service's name
/// (`info!(service = %self.name(), "Started")`).
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Unique name for logging and lookup (e.g. "filesystem", "integrator").
    fn name(&self) -> &str;

    /// Names of services that must be started before this one. Cycles are an error.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn health(&self) -> Result<ServiceHealth> {
        Ok(ServiceHealth::healthy())
    }
}

/// Builder for [ServicesManager]: add services, then [build](ServicesManagerBuilder::build)
/// or [start](ServicesManagerBuilder::start).
///
/// ```ignore
/// let services = ServicesManager::builder()
///     .add_service(filesystem.clone())
///     .add_service(integrator.clone())
///     .start()
///     .await?;
/// ```
#[derive(Default)]
pub struct ServicesManagerBuilder {
    services: Vec<Arc<dyn Service>>,
}

impl ServicesManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// Build the manager and register all services. Does not start them.
    pub async fn build(self) -> Arc<ServicesManager> {
        let manager = Arc::new(ServicesManager::new());
        for service in self.services {
            manager.register(service).await;
        }
        manager
    }

    /// Build the manager and start every service in dependency order.
    pub async fn start(self) -> Result<Arc<ServicesManager>> {
        let manager = self.build().await;
        manager.start_all().await?;
        Ok(manager)
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

    pub fn builder() -> ServicesManagerBuilder {
        ServicesManagerBuilder::new()
    }

    /// Compute start order from dependencies. Errors on unknown deps or cycles.
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

        // Kahn's algorithm: dependencies first
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
        queue.sort_unstable_by(|a, b| b.cmp(a));

        let mut order = Vec::with_capacity(names.len());
        while let Some(n) = queue.pop() {
            for s in dependent_on.get(&n).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(s) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push(s.clone());
                    }
                }
            }
            order.push(n);
        }

        if order.len() != names.len() {
            anyhow::bail!("Service dependency cycle detected");
        }
        Ok(order)
    }

    /// Register a service. If a service with the same name exists it is
    /// replaced without being stopped.
    pub async fn register(&self, service: Arc<dyn Service>) {
        let name = service.name().to_string();
        let mut guard = self.services.write().await;
        if guard.insert(name.clone(), service).is_some() {
            warn!(service = %name, "Service reregistered, overwriting previous");
        } else {
            info!(service = %name, "Service registered");
        }
    }

    /// Start all registered services, dependencies first.
    pub async fn start_all(&self) -> Result<()> {
        let order = self.start_order().await?;
        for name in &order {
            let svc = self.get(name).await;
            if let Some(s) = svc {
                if let Err(e) = s.start().await {
                    warn!(service = %name, error = %e, "Service start failed");
                    return Err(e).context(format!("failed to start service {}", name));
                }
                self.started.write().await.insert(name.clone());
                info!(service = %name, "Service started");
            }
        }
        Ok(())
    }

    /// Stop all started services in reverse dependency order.
    pub async fn stop_all(&self) -> Result<()> {
        let order = self.start_order().await?;
        for name in order.into_iter().rev() {
            if !self.is_started(&name).await {
                continue;
            }
            if let Some(s) = self.get(&name).await {
                if let Err(e) = s.stop().await {
                    warn!(service = %name, error = %e, "Service stop failed");
                } else {
                    info!(service = %name, "Service stopped");
                }
                self.started.write().await.remove(&name);
            }
        }
        Ok(())
    }

    /// Health of every registered service. A failing health check reports
    /// as [Unhealthy](HealthStatus::Unhealthy).
    pub async fn health_all(&self) -> HashMap<String, ServiceHealth> {
        let services: Vec<(String, Arc<dyn Service>)> = self
            .services
            .read()
            .await
            .iter()
            .map(|(name, svc)| (name.clone(), svc.clone()))
            .collect();

        let mut out = HashMap::new();
        for (name, svc) in services {
            let health = match svc.health().await {
                Ok(h) => h,
                Err(e) => ServiceHealth::unhealthy(e.to_string()),
            };
            out.insert(name, health);
        }
        out
    }

    /// Log the health of every registered service
    pub async fn log_health(&self) {
        let mut report: Vec<(String, ServiceHealth)> =
            self.health_all().await.into_iter().collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, health) in report {
            let message = health.message.as_deref().unwrap_or("");
            match health.status {
                HealthStatus::Healthy => info!(service = %name, "Service healthy"),
                HealthStatus::Degraded => {
                    warn!(service = %name, message = %message, "Service degraded")
                }
                HealthStatus::Unhealthy => {
                    warn!(service = %name, message = %message, "Service unhealthy")
                }
            }
        }
    }

    pub async fn is_started(&self, name: &str) -> bool {
        self.started.read().await.contains(name)
    }

    async fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.read().await.get(name).cloned()
    }
}
