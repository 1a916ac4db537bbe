//! Filesystem service: task queue plus live watch over the library root
//!
//! On start the startup scans are queued and the consumer loop begins. The
//! watch only comes up once both startup scans have finished, so events
//! never race the initial index.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::manager::{Service, ServiceHealth};
use super::scanner::Scanner;
use super::task_manager::{INITIAL_TASK_COUNT, InitialScans, TaskManager};
use super::watcher::LibraryWatcher;

#[derive(Debug, Clone)]
pub struct FilesystemServiceConfig {
    pub media_path: PathBuf,
    pub queue_capacity: usize,
}

pub struct FilesystemService {
    root: PathBuf,
    tasks: Arc<TaskManager>,
    watcher: Arc<Mutex<Option<LibraryWatcher>>>,
    watch_starter: Mutex<Option<JoinHandle<()>>>,
}

impl FilesystemService {
    pub fn new(scanner: Scanner, config: FilesystemServiceConfig) -> Self {
        Self {
            root: config.media_path,
            tasks: Arc::new(TaskManager::new(scanner, config.queue_capacity)),
            watcher: Arc::new(Mutex::new(None)),
            watch_starter: Mutex::new(None),
        }
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Resolves once the startup scans are done
    pub fn initial_scans(&self) -> InitialScans {
        self.tasks.initial_scans()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(LibraryWatcher::is_running)
    }
}

#[async_trait]
impl Service for FilesystemService {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn start(&self) -> Result<()> {
        info!(service = "filesystem", root = %self.root.display(), "Filesystem service starting");

        self.tasks.queue_initial_scans(&self.root).await?;
        self.tasks.start()?;

        let initial = self.tasks.initial_scans();
        let sender = self.tasks.sender();
        let watcher = self.watcher.clone();
        let root = self.root.clone();

        let handle = tokio::spawn(async move {
            if !initial.wait().await {
                return;
            }
            match LibraryWatcher::start(&root, sender) {
                Ok(w) => *watcher.lock() = Some(w),
                Err(e) => error!(error = %e, "Failed to start filesystem watch"),
            }
        });
        *self.watch_starter.lock() = Some(handle);

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let starter = self.watch_starter.lock().take();
        if let Some(handle) = starter {
            handle.abort();
        }

        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.stop();
        }

        self.tasks.shutdown().await;
        info!(service = "filesystem", "Stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        if !self.tasks.is_running() {
            return Ok(ServiceHealth::unhealthy("task queue not running"));
        }
        if self.tasks.completed_tasks() >= INITIAL_TASK_COUNT && !self.is_watching() {
            return Ok(ServiceHealth::degraded("filesystem watch not running"));
        }
        Ok(ServiceHealth::healthy())
    }
}
