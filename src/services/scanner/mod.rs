//! Library scanning tasks
//!
//! A [Task] describes one unit of scan work. The [Scanner] executes it
//! against the store: a media scan indexes everything below a root, an
//! orphan scan removes records whose files are gone.

mod context;
mod media_scan;
mod orphan_scan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use context::{AttachTarget, Attachables, ScanContext, ScanCounts};

use crate::db::Database;
use crate::media::TagReader;

/// A unit of scan work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Index every file below `base`, or `base` itself when it is a file
    MediaScan { base: PathBuf, verbose: bool },
    /// Remove stale records.
    ///
    /// With `base` set, everything outside `base` is dropped first. Files
    /// and folders under `sub` (or `base` when unset) that no longer exist
    /// are then removed.
    OrphanScan {
        base: Option<PathBuf>,
        sub: Option<PathBuf>,
        verbose: bool,
    },
}

impl Task {
    pub fn media_scan(base: impl Into<PathBuf>) -> Self {
        Self::MediaScan {
            base: base.into(),
            verbose: false,
        }
    }

    /// Orphan scan that keeps only records below `base`
    pub fn retain_only(base: impl Into<PathBuf>) -> Self {
        Self::OrphanScan {
            base: Some(base.into()),
            sub: None,
            verbose: false,
        }
    }

    /// Orphan scan of a single path
    pub fn orphan_scan(sub: impl Into<PathBuf>) -> Self {
        Self::OrphanScan {
            base: None,
            sub: Some(sub.into()),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        match &mut self {
            Self::MediaScan { verbose: v, .. } | Self::OrphanScan { verbose: v, .. } => {
                *v = verbose
            }
        }
        self
    }

    pub fn is_verbose(&self) -> bool {
        match self {
            Self::MediaScan { verbose, .. } | Self::OrphanScan { verbose, .. } => *verbose,
        }
    }

    /// Base and sub folder of the task
    pub fn folders(&self) -> (Option<&Path>, Option<&Path>) {
        match self {
            Self::MediaScan { base, .. } => (Some(base.as_path()), None),
            Self::OrphanScan { base, sub, .. } => (base.as_deref(), sub.as_deref()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MediaScan { .. } => "Media Scan",
            Self::OrphanScan { .. } => "Orphan Scan",
        }
    }
}

/// Result of a finished (or cancelled) scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Records created, updated or deleted
    pub changes: u64,
    /// The scan stopped early on cancellation; `changes` covers the work done
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root {0} does not exist")]
    InvalidRoot(PathBuf),

    #[error("store failure after {changes} changes: {source}")]
    Store {
        changes: u64,
        #[source]
        source: anyhow::Error,
    },
}

impl ScanError {
    /// Changes committed before the failure
    pub fn partial_changes(&self) -> u64 {
        match self {
            Self::InvalidRoot(_) => 0,
            Self::Store { changes, .. } => *changes,
        }
    }
}

/// Executes scan tasks against the store
#[derive(Clone)]
pub struct Scanner {
    db: Database,
    tag_reader: Arc<dyn TagReader>,
}

impl Scanner {
    pub fn new(db: Database, tag_reader: Arc<dyn TagReader>) -> Self {
        Self { db, tag_reader }
    }

    /// Run a task to completion or until `cancel` fires
    pub async fn run(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        match task {
            Task::MediaScan { base, verbose } => self.media_scan(base, *verbose, cancel).await,
            Task::OrphanScan { base, sub, verbose } => {
                self.orphan_scan(base.as_deref(), sub.as_deref(), *verbose, cancel)
                    .await
            }
        }
    }
}

/// Path as stored in the database
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
