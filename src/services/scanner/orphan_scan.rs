//! Orphan scan: drop records whose files or folders are gone

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ScanError, ScanOutcome, Scanner, path_key};

#[derive(Debug, Default, Clone, Copy)]
struct OrphanCounts {
    art: u64,
    songs: u64,
    folders: u64,
    albums: u64,
    artists: u64,
}

impl OrphanCounts {
    fn total(&self) -> u64 {
        self.art + self.songs + self.folders + self.albums + self.artists
    }
}

fn folder_is_empty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut listing) => listing.next().is_none(),
        Err(_) => true,
    }
}

impl Scanner {
    pub(super) async fn orphan_scan(
        &self,
        base: Option<&Path>,
        sub: Option<&Path>,
        verbose: bool,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        let mut counts = OrphanCounts::default();
        let started = Instant::now();

        if let Some(base) = base {
            debug!(base = %base.display(), "Removing records outside the library root");
            self.remove_outside(&path_key(base), &mut counts)
                .await
                .map_err(|source| ScanError::Store {
                    changes: counts.total(),
                    source,
                })?;
        }

        if cancel.is_cancelled() {
            return Ok(ScanOutcome {
                changes: counts.total(),
                cancelled: true,
            });
        }

        let scope = sub.or(base).map(path_key).unwrap_or_default();
        debug!(scope = %scope, "Removing missing files");
        self.remove_missing(&scope, &mut counts)
            .await
            .map_err(|source| ScanError::Store {
                changes: counts.total(),
                source,
            })?;

        if cancel.is_cancelled() {
            return Ok(ScanOutcome {
                changes: counts.total(),
                cancelled: true,
            });
        }

        self.purge_empty_groups(&mut counts)
            .await
            .map_err(|source| ScanError::Store {
                changes: counts.total(),
                source,
            })?;

        if verbose {
            info!(
                art = counts.art,
                songs = counts.songs,
                folders = counts.folders,
                albums = counts.albums,
                artists = counts.artists,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Orphan scan complete"
            );
        } else {
            info!(changes = counts.total(), "Orphan scan complete");
        }

        Ok(ScanOutcome {
            changes: counts.total(),
            cancelled: false,
        })
    }

    async fn remove_outside(&self, base: &str, counts: &mut OrphanCounts) -> Result<()> {
        for art in self.db.art().list_not_in_path(base).await? {
            if self.db.art().delete(art.id).await? {
                counts.art += 1;
            }
        }

        for song in self.db.songs().list_not_in_path(base).await? {
            if self.db.songs().delete(song.id).await? {
                counts.songs += 1;
            }
        }

        for folder in self.db.folders().list_not_in_path(base).await? {
            self.db.metadata().delete_for_folder(folder.id).await?;
            if self.db.folders().delete(folder.id).await? {
                counts.folders += 1;
            }
        }

        Ok(())
    }

    async fn remove_missing(&self, scope: &str, counts: &mut OrphanCounts) -> Result<()> {
        for art in self.db.art().list_in_path(scope).await? {
            if !Path::new(&art.path).exists() && self.db.art().delete(art.id).await? {
                debug!(path = %art.path, "Removed art");
                counts.art += 1;
            }
        }

        for song in self.db.songs().list_in_path(scope).await? {
            if !Path::new(&song.path).exists() && self.db.songs().delete(song.id).await? {
                debug!(path = %song.path, "Removed song");
                counts.songs += 1;
            }
        }

        // Deepest paths first so children go before their parents
        for folder in self.db.folders().list_in_path(scope).await? {
            if folder_is_empty(Path::new(&folder.path)) {
                self.db.metadata().delete_for_folder(folder.id).await?;
                if self.db.folders().delete(folder.id).await? {
                    debug!(path = %folder.path, "Removed folder");
                    counts.folders += 1;
                }
            }
        }

        Ok(())
    }

    async fn purge_empty_groups(&self, counts: &mut OrphanCounts) -> Result<()> {
        counts.albums += self.db.albums().purge_orphans().await?;
        counts.artists += self.db.artists().purge_orphans().await?;
        Ok(())
    }
}
