//! Recurring metadata reconciliation
//!
//! The integrator runs once after the startup scans and then on a fixed
//! interval. A run that is still going when the next one is due makes the
//! next one a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::services::integrator::{Integrator, IntegratorReport};
use crate::services::manager::{Service, ServiceHealth};
use crate::services::task_manager::InitialScans;

/// Run the integrator unless a run is already in progress.
///
/// Returns `None` when the run was skipped or failed.
pub async fn run_exclusive(integrator: &Integrator, running: &AtomicBool) -> Option<IntegratorReport> {
    if running.swap(true, Ordering::AcqRel) {
        debug!("Integrator already running, skipping");
        return None;
    }

    let result = integrator.run_once().await;
    running.store(false, Ordering::Release);

    match result {
        Ok(report) => Some(report),
        Err(e) => {
            error!(error = %e, "Integrator run failed");
            None
        }
    }
}

pub struct IntegratorService {
    integrator: Integrator,
    interval: Duration,
    initial_scans: InitialScans,
    running: Arc<AtomicBool>,
    scheduler: tokio::sync::Mutex<Option<JobScheduler>>,
    first_run: Mutex<Option<JoinHandle<()>>>,
}

impl IntegratorService {
    pub fn new(integrator: Integrator, interval: Duration, initial_scans: InitialScans) -> Self {
        Self {
            integrator,
            interval,
            initial_scans,
            running: Arc::new(AtomicBool::new(false)),
            scheduler: tokio::sync::Mutex::new(None),
            first_run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Service for IntegratorService {
    fn name(&self) -> &str {
        "integrator"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["filesystem".to_string()]
    }

    async fn start(&self) -> Result<()> {
        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;

        let integrator = self.integrator.clone();
        let running = self.running.clone();
        let job = Job::new_repeated_async(self.interval, move |_uuid, _l| {
            let integrator = integrator.clone();
            let running = running.clone();
            Box::pin(async move {
                info!("Running scheduled metadata reconciliation");
                run_exclusive(&integrator, &running).await;
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;
        *self.scheduler.lock().await = Some(scheduler);

        let integrator = self.integrator.clone();
        let running = self.running.clone();
        let initial = self.initial_scans.clone();
        let handle = tokio::spawn(async move {
            if initial.wait().await {
                info!("Initial scans finished, running metadata reconciliation");
                run_exclusive(&integrator, &running).await;
            }
        });
        *self.first_run.lock() = Some(handle);

        info!(
            service = "integrator",
            interval_hours = self.interval.as_secs() / 3600,
            "Integrator scheduled"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let first_run = self.first_run.lock().take();
        if let Some(handle) = first_run {
            handle.abort();
        }

        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler
                .shutdown()
                .await
                .context("Failed to stop job scheduler")?;
        }
        info!(service = "integrator", "Stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        if self.scheduler.lock().await.is_none() {
            return Ok(ServiceHealth::unhealthy("scheduler not started"));
        }
        if !self.integrator.has_providers() {
            return Ok(ServiceHealth::degraded("no metadata providers configured"));
        }
        Ok(ServiceHealth::healthy())
    }
}
