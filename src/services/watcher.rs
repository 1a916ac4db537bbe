//! Live filesystem watch over the library root
//!
//! Filesystem events are turned into scan tasks and fed to the task queue:
//!
//! | Event | Tasks |
//! |---|---|
//! | create | media scan of the path |
//! | move (old and new path known) | orphan scan of the old path, media scan of the new |
//! | rename away / remove | orphan scan of the path |
//! | rename into place | media scan of the path |

use std::path::Path;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::scanner::Task;

/// Scan tasks for one filesystem event
pub fn translate_event(event: &Event) -> Vec<Task> {
    let paths = &event.paths;

    match event.kind {
        EventKind::Create(_) => paths.iter().map(|p| Task::media_scan(p.clone())).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![Task::orphan_scan(from.clone()), Task::media_scan(to.clone())],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            paths.iter().map(|p| Task::orphan_scan(p.clone())).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().map(|p| Task::media_scan(p.clone())).collect()
        }
        // Backends that cannot tell which side of a rename they saw
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| {
                if p.exists() {
                    Task::media_scan(p.clone())
                } else {
                    Task::orphan_scan(p.clone())
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A recursive watch feeding scan tasks into the queue
pub struct LibraryWatcher {
    // Dropping the watcher ends the event stream
    _watcher: RecommendedWatcher,
    handle: JoinHandle<()>,
}

impl LibraryWatcher {
    pub fn start(root: &Path, tasks: mpsc::Sender<Task>) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(256);

        let mut watcher = notify::recommended_watcher(move |result| {
            // Runs on the notify thread; the receiver is gone once the loop ends
            let _ = tx.blocking_send(result);
        })
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        let handle = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        error!(error = %e, "Filesystem watch failed, stopping watch");
                        return;
                    }
                };

                for task in translate_event(&event) {
                    debug!(task = task.name(), folders = ?task.folders(), "Queueing task for filesystem event");
                    if tasks.send(task).await.is_err() {
                        warn!("Task queue closed, stopping watch");
                        return;
                    }
                }
            }
        });

        info!(path = %root.display(), "Watching folder");
        Ok(Self {
            _watcher: watcher,
            handle,
        })
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
        info!("Filesystem watch stopped");
    }
}
