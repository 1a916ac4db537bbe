//! Task queue and cancellation manager
//!
//! Scan tasks are submitted to a bounded queue and executed one at a time by
//! a single consumer loop. Every running task gets its own cancellation
//! token, held in a registry so shutdown can halt whatever is in flight.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::scanner::{ScanError, ScanOutcome, Scanner, Task};

/// Number of tasks queued at startup (orphan scan, then media scan)
pub const INITIAL_TASK_COUNT: u64 = 2;

/// Cancellation tokens of registered tasks.
///
/// Tokens are children of the registry's parent, so cancelling the parent
/// also halts tasks registered after [CancelRegistry::cancel_all] ran.
#[derive(Default)]
pub struct CancelRegistry {
    parent: CancellationToken,
    tokens: Mutex<HashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
}

impl CancelRegistry {
    pub fn with_parent(parent: CancellationToken) -> Self {
        Self {
            parent,
            ..Default::default()
        }
    }

    pub fn register(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.parent.child_token();
        self.tokens.lock().insert(id, token.clone());
        (id, token)
    }

    pub fn unregister(&self, id: u64) {
        self.tokens.lock().remove(&id);
    }

    /// Cancel and drop every registered token, returning how many were halted
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<CancellationToken> =
            self.tokens.lock().drain().map(|(_, token)| token).collect();
        for token in &drained {
            token.cancel();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves once the startup scans have finished
#[derive(Clone)]
pub struct InitialScans {
    completed: watch::Receiver<u64>,
}

impl InitialScans {
    /// Wait for the startup scans. Returns false if the manager went away first.
    pub async fn wait(mut self) -> bool {
        self.completed
            .wait_for(|count| *count >= INITIAL_TASK_COUNT)
            .await
            .is_ok()
    }
}

/// Changes that move the last change time. Errored tasks never do.
fn successful_changes(result: &Result<ScanOutcome, ScanError>) -> u64 {
    result.as_ref().map_or(0, |outcome| outcome.changes)
}

pub struct TaskManager {
    sender: mpsc::Sender<Task>,
    receiver: Mutex<Option<mpsc::Receiver<Task>>>,
    scanner: Scanner,
    registry: Arc<CancelRegistry>,
    last_change: Arc<RwLock<Option<DateTime<Utc>>>>,
    completed: Arc<watch::Sender<u64>>,
    shutdown: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(scanner: Scanner, capacity: usize) -> Self {
        // Room for both startup tasks before the consumer runs
        let (sender, receiver) = mpsc::channel(capacity.max(INITIAL_TASK_COUNT as usize));
        let (completed, _) = watch::channel(0);
        let shutdown = CancellationToken::new();

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            scanner,
            registry: Arc::new(CancelRegistry::with_parent(shutdown.clone())),
            last_change: Arc::new(RwLock::new(None)),
            completed: Arc::new(completed),
            shutdown,
            consumer: Mutex::new(None),
        }
    }

    /// Submit a task, waiting for queue space
    pub async fn enqueue(&self, task: Task) -> Result<()> {
        self.sender
            .send(task)
            .await
            .map_err(|_| anyhow::anyhow!("Task queue is closed"))
    }

    /// Sender for producers that outlive a borrow of the manager
    pub fn sender(&self) -> mpsc::Sender<Task> {
        self.sender.clone()
    }

    /// Queue the startup scans for `root`: keep only records below it, then index it
    pub async fn queue_initial_scans(&self, root: &Path) -> Result<()> {
        self.enqueue(Task::retain_only(root).verbose(true))
            .await
            .context("Failed to queue initial orphan scan")?;
        self.enqueue(Task::media_scan(root).verbose(true))
            .await
            .context("Failed to queue initial media scan")?;
        Ok(())
    }

    /// Time of the last task that finished without error and changed anything
    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        *self.last_change.read()
    }

    /// Number of tasks finished so far
    pub fn completed_tasks(&self) -> u64 {
        *self.completed.borrow()
    }

    pub fn initial_scans(&self) -> InitialScans {
        InitialScans {
            completed: self.completed.subscribe(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.consumer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the consumer loop. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        let Some(mut receiver) = self.receiver.lock().take() else {
            warn!("Task manager already started");
            return Ok(());
        };

        let scanner = self.scanner.clone();
        let registry = self.registry.clone();
        let last_change = self.last_change.clone();
        let completed = self.completed.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            info!("Task manager started");

            loop {
                let task = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    task = receiver.recv() => match task {
                        Some(task) => task,
                        None => break,
                    },
                };

                info!(task = task.name(), "Got new task");
                let (id, cancel) = registry.register();

                let result = scanner.run(&task, &cancel).await;
                registry.unregister(id);

                match &result {
                    Ok(outcome) if outcome.cancelled => {
                        info!(task = task.name(), changes = outcome.changes, "Task halted");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(
                            task = task.name(),
                            partial_changes = e.partial_changes(),
                            error = %e,
                            "Task errored"
                        );
                    }
                }

                if successful_changes(&result) > 0 {
                    let now = Utc::now();
                    *last_change.write() = Some(now);
                    info!(scan_time = %now.to_rfc3339(), "New scan time");
                }

                completed.send_modify(|count| *count += 1);
                if *completed.borrow() == INITIAL_TASK_COUNT {
                    info!("Finished initial media and orphan scans");
                }
            }

            info!("Task manager stopped");
        });

        *self.consumer.lock() = Some(handle);
        Ok(())
    }

    /// Cancel in-flight tasks and wait for the consumer loop to exit
    pub async fn shutdown(&self) {
        info!("Halting tasks");
        self.shutdown.cancel();
        let halted = self.registry.cancel_all();
        if halted > 0 {
            info!(count = halted, "Tasks halted");
        }

        let handle = self.consumer.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "Task manager loop panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::db::Database;
    use crate::media::{RawTags, TagError, TagReader};

    struct FixedTags;

    impl TagReader for FixedTags {
        fn read(&self, _path: &Path) -> Result<RawTags, TagError> {
            Ok(RawTags {
                album_artist: Some("Band".to_string()),
                album: Some("Record".to_string()),
                title: Some("Song".to_string()),
                track: Some(1),
                bitrate: 320,
                channels: 2,
                sample_rate: 44_100,
                duration: Duration::from_secs(180),
                ..Default::default()
            })
        }
    }

    /// Takes a while per file so a scan can be caught mid-walk
    struct SlowTags {
        reads: Arc<AtomicUsize>,
    }

    impl TagReader for SlowTags {
        fn read(&self, path: &Path) -> Result<RawTags, TagError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            FixedTags.read(path)
        }
    }

    async fn manager() -> (TaskManager, Database) {
        let db = Database::connect_in_memory().await.unwrap();
        let scanner = Scanner::new(db.clone(), Arc::new(FixedTags));
        (TaskManager::new(scanner, 10), db)
    }

    #[test]
    fn test_registry_cancels_every_token() {
        let registry = CancelRegistry::default();
        let (_, first) = registry.register();
        let (second_id, second) = registry.register();
        let (_, third) = registry.register();
        registry.unregister(second_id);

        assert_eq!(registry.cancel_all(), 2);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(third.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_parent_cancels_late_registrations() {
        let parent = CancellationToken::new();
        let registry = CancelRegistry::with_parent(parent.clone());
        parent.cancel();

        let (_, late) = registry.register();
        assert!(late.is_cancelled());
    }

    #[tokio::test]
    async fn test_initial_scans_signal_after_two_tasks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("01.mp3"), b"audio").unwrap();
        let (manager, db) = manager().await;

        manager.queue_initial_scans(dir.path()).await.unwrap();
        manager.start().unwrap();

        let done = tokio::time::timeout(Duration::from_secs(10), manager.initial_scans().wait())
            .await
            .unwrap();
        assert!(done);
        assert_eq!(manager.completed_tasks(), 2);
        assert!(manager.last_change().is_some());
        assert!(
            db.artists()
                .get_by_normalized_title("Band")
                .await
                .unwrap()
                .is_some()
        );

        manager.shutdown().await;
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_idle_task_keeps_scan_time() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _db) = manager().await;

        manager.start().unwrap();
        manager.enqueue(Task::orphan_scan(dir.path())).await.unwrap();
        manager.enqueue(Task::orphan_scan(dir.path())).await.unwrap();

        assert!(manager.initial_scans().wait().await);
        assert!(manager.last_change().is_none());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_task_still_counts_as_finished() {
        let (manager, _db) = manager().await;

        manager.start().unwrap();
        manager
            .enqueue(Task::media_scan("/nonexistent/library"))
            .await
            .unwrap();
        manager
            .enqueue(Task::media_scan("/nonexistent/other"))
            .await
            .unwrap();

        assert!(manager.initial_scans().wait().await);
        assert_eq!(manager.completed_tasks(), 2);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_before_start_returns() {
        let (manager, _db) = manager().await;
        manager.shutdown().await;
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_halts_running_scan_and_keeps_progress() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=12 {
            fs::write(dir.path().join(format!("{n:02}.mp3")), b"audio").unwrap();
        }
        let db = Database::connect_in_memory().await.unwrap();
        let reads = Arc::new(AtomicUsize::new(0));
        let scanner = Scanner::new(
            db.clone(),
            Arc::new(SlowTags {
                reads: reads.clone(),
            }),
        );
        let manager = TaskManager::new(scanner, 10);

        manager.start().unwrap();
        manager.enqueue(Task::media_scan(dir.path())).await.unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while reads.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), manager.shutdown())
            .await
            .unwrap();
        assert!(!manager.is_running());

        let songs = db
            .songs()
            .list_in_path(&dir.path().to_string_lossy())
            .await
            .unwrap();
        assert!(!songs.is_empty());
        assert!(songs.len() < 12);
        assert!(reads.load(Ordering::SeqCst) < 12);
    }

    #[test]
    fn test_only_successful_tasks_move_scan_time() {
        let done: Result<ScanOutcome, ScanError> = Ok(ScanOutcome {
            changes: 4,
            cancelled: false,
        });
        assert_eq!(successful_changes(&done), 4);

        let halted: Result<ScanOutcome, ScanError> = Ok(ScanOutcome {
            changes: 2,
            cancelled: true,
        });
        assert_eq!(successful_changes(&halted), 2);

        let failed: Result<ScanOutcome, ScanError> = Err(ScanError::Store {
            changes: 3,
            source: anyhow::anyhow!("disk full"),
        });
        assert_eq!(successful_changes(&failed), 0);
    }
}
