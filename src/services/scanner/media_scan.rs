//! Media scan: index every file below a root folder

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::context::{AttachTarget, ScanContext};
use super::{ScanError, ScanOutcome, Scanner, path_key};
use crate::db::{
    AlbumRecord, ArtistRecord, CreateAlbum, CreateArt, CreateArtist, CreateFolder,
    CreateMetadata, FolderRecord, SongData,
};
use crate::media::{FileType, METADATA_FILE_NAME, MediaKind, classify, read_audio_tags};
use crate::services::text_utils::normalize_accents;

struct FileStat {
    size: i64,
    modified_at: DateTime<Utc>,
}

fn stat(path: &Path) -> Result<FileStat> {
    let meta = fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let modified = meta
        .modified()
        .with_context(|| format!("No modification time for {}", path.display()))?;

    Ok(FileStat {
        size: i64::try_from(meta.len()).unwrap_or(i64::MAX),
        modified_at: DateTime::<Utc>::from(modified),
    })
}

impl Scanner {
    pub(super) async fn media_scan(
        &self,
        base: &Path,
        verbose: bool,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        if !base.exists() {
            return Err(ScanError::InvalidRoot(base.to_path_buf()));
        }

        info!(path = %base.display(), "Starting media scan");
        let started = Instant::now();
        let mut ctx = ScanContext::new();
        let mut cancelled = false;

        for entry in WalkDir::new(base).follow_links(true) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if let Err(e) = self.handle_entry(&mut ctx, &entry).await {
                warn!(path = %entry.path().display(), error = %e, "Failed to index file");
            }
        }

        if cancelled {
            info!(changes = ctx.counts.total(), "Media scan cancelled");
            return Ok(ScanOutcome {
                changes: ctx.counts.total(),
                cancelled: true,
            });
        }

        self.attach_folder_items(&ctx).await;

        if let Err(e) = self.db.checkpoint_wal().await {
            warn!(error = %e, "WAL checkpoint after media scan failed");
        }

        let counts = ctx.counts;
        if verbose {
            info!(
                art = counts.art,
                artists = counts.artists,
                albums = counts.albums,
                songs = counts.songs,
                updated_songs = counts.updated_songs,
                folders = counts.folders,
                metadata = counts.metadata,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Media scan complete"
            );
        } else {
            info!(changes = counts.total(), "Media scan complete");
        }

        Ok(ScanOutcome {
            changes: counts.total(),
            cancelled: false,
        })
    }

    async fn handle_entry(&self, ctx: &mut ScanContext, entry: &DirEntry) -> Result<()> {
        let path = entry.path();
        let is_dir = entry.file_type().is_dir();

        let folder_path = if is_dir {
            path
        } else {
            path.parent().context("File has no parent folder")?
        };
        let folder = self.resolve_folder(ctx, folder_path).await?;

        if is_dir {
            return Ok(());
        }

        match classify(path) {
            Some(MediaKind::Image) => self.handle_image(ctx, path, &folder).await,
            Some(MediaKind::Metadata) => self.handle_metadata(ctx, path, &folder).await,
            Some(MediaKind::Audio(file_type)) => {
                self.handle_audio(ctx, path, file_type, &folder).await
            }
            None => Ok(()),
        }
    }

    /// Load a folder from the cache or store, creating it when new
    async fn resolve_folder(&self, ctx: &mut ScanContext, path: &Path) -> Result<FolderRecord> {
        if let Some(folder) = ctx.folders.get(path) {
            return Ok(folder.clone());
        }

        if let Some(folder) = self.db.folders().get_by_path(&path_key(path)).await? {
            ctx.folders.insert(path.to_path_buf(), folder.clone());
            return Ok(folder);
        }

        let mut listing = fs::read_dir(path)
            .with_context(|| format!("Failed to read folder {}", path.display()))?;
        if listing.next().is_none() {
            anyhow::bail!("Folder {} contains no files", path.display());
        }

        let sidecar = path.join(METADATA_FILE_NAME);
        let created_sidecar = if sidecar.exists() {
            false
        } else {
            match fs::File::create(&sidecar) {
                Ok(_) => true,
                Err(e) => {
                    warn!(path = %sidecar.display(), error = %e, "Failed to create metadata file");
                    false
                }
            }
        };

        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_key(path));

        let parent_id = match path.parent() {
            Some(parent) => self
                .db
                .folders()
                .get_by_path(&path_key(parent))
                .await?
                .map(|p| p.id),
            None => None,
        };

        let folder = self
            .db
            .folders()
            .create(CreateFolder {
                parent_id,
                title,
                path: path_key(path),
            })
            .await?;
        ctx.counts.folders += 1;
        debug!(path = %folder.path, "Added folder");

        if created_sidecar {
            let file = stat(&sidecar)?;
            let metadata = self
                .db
                .metadata()
                .create(CreateMetadata {
                    folder_id: folder.id,
                    path: path_key(&sidecar),
                    file_size: file.size,
                    modified_at: file.modified_at,
                })
                .await?;
            ctx.record_metadata(folder.id, metadata.id);
        }

        ctx.folders.insert(path.to_path_buf(), folder.clone());
        Ok(folder)
    }

    async fn handle_image(
        &self,
        ctx: &mut ScanContext,
        path: &Path,
        folder: &FolderRecord,
    ) -> Result<()> {
        let key = path_key(path);
        let art = match self.db.art().get_by_path(&key).await? {
            Some(existing) => existing,
            None => {
                let file = stat(path)?;
                let art = self
                    .db
                    .art()
                    .create(CreateArt {
                        folder_id: folder.id,
                        path: key,
                        file_size: file.size,
                        modified_at: file.modified_at,
                    })
                    .await?;
                ctx.counts.art += 1;
                art
            }
        };

        ctx.record_art(folder.id, art.id);
        Ok(())
    }

    async fn handle_metadata(
        &self,
        ctx: &mut ScanContext,
        path: &Path,
        folder: &FolderRecord,
    ) -> Result<()> {
        let key = path_key(path);
        let metadata = match self.db.metadata().get_by_path(&key).await? {
            Some(existing) => existing,
            None => {
                let file = stat(path)?;
                let metadata = self
                    .db
                    .metadata()
                    .create(CreateMetadata {
                        folder_id: folder.id,
                        path: key,
                        file_size: file.size,
                        modified_at: file.modified_at,
                    })
                    .await?;
                ctx.counts.metadata += 1;
                metadata
            }
        };

        ctx.record_metadata(folder.id, metadata.id);
        Ok(())
    }

    async fn handle_audio(
        &self,
        ctx: &mut ScanContext,
        path: &Path,
        file_type: FileType,
        folder: &FolderRecord,
    ) -> Result<()> {
        let file = stat(path)?;
        if file.size == 0 {
            anyhow::bail!("Audio file is empty");
        }

        let reader = self.tag_reader.clone();
        let tag_path = path.to_path_buf();
        let tags = tokio::task::spawn_blocking(move || read_audio_tags(reader.as_ref(), &tag_path))
            .await
            .context("Tag reader task failed")??;

        for warning in &tags.warnings {
            warn!(path = %path.display(), warning = %warning, "Incomplete tags");
        }

        let artist = self.resolve_artist(ctx, &tags.artist, folder).await?;
        let album = self
            .resolve_album(ctx, &artist, &tags.album, tags.year, folder)
            .await?;

        let data = SongData {
            artist_id: artist.id,
            album_id: album.id,
            folder_id: folder.id,
            normalized_title: normalize_accents(&tags.title),
            title: tags.title,
            path: path_key(path),
            file_size: file.size,
            file_type: file_type.codec().to_string(),
            modified_at: file.modified_at,
            bitrate: i64::from(tags.bitrate),
            channels: i64::from(tags.channels),
            sample_rate: i64::from(tags.sample_rate),
            length_secs: i64::try_from(tags.length_secs).unwrap_or(i64::MAX),
            track_number: i64::from(tags.track_number),
            disc: tags.disc,
            year: tags.year,
            genre: tags.genre,
            comment: tags.comment,
        };

        match self.db.songs().get_by_path(&data.path).await? {
            None => {
                self.db.songs().create(&data).await?;
                ctx.counts.songs += 1;
            }
            Some(existing) if data.modified_at > existing.modified_at => {
                self.db.songs().update(existing.id, &data).await?;
                ctx.counts.updated_songs += 1;
                debug!(path = %data.path, "Updated song");
            }
            Some(_) => {}
        }

        Ok(())
    }

    async fn resolve_artist(
        &self,
        ctx: &mut ScanContext,
        title: &str,
        song_folder: &FolderRecord,
    ) -> Result<ArtistRecord> {
        let normalized = normalize_accents(title);
        if let Some(artist) = ctx.artists.get(&normalized) {
            return Ok(artist.clone());
        }

        let artist = match self.db.artists().get_by_normalized_title(&normalized).await? {
            Some(existing) => existing,
            None => {
                let artist = self
                    .db
                    .artists()
                    .create(CreateArtist {
                        title: title.to_string(),
                        normalized_title: normalized.clone(),
                        folder_id: song_folder.parent_id,
                    })
                    .await?;
                ctx.counts.artists += 1;
                debug!(artist = %artist.title, "Added artist");
                artist
            }
        };

        if let Some(folder_id) = artist.folder_id {
            ctx.add_target(folder_id, AttachTarget::Artist(artist.id));
        }
        ctx.artists.insert(normalized, artist.clone());
        Ok(artist)
    }

    async fn resolve_album(
        &self,
        ctx: &mut ScanContext,
        artist: &ArtistRecord,
        title: &str,
        year: Option<i32>,
        song_folder: &FolderRecord,
    ) -> Result<AlbumRecord> {
        let key = (artist.id, title.to_string());
        if let Some(album) = ctx.albums.get(&key) {
            return Ok(album.clone());
        }

        let album = match self
            .db
            .albums()
            .get_by_artist_and_title(artist.id, title)
            .await?
        {
            Some(existing) => existing,
            None => {
                let album = self
                    .db
                    .albums()
                    .create(CreateAlbum {
                        artist_id: artist.id,
                        folder_id: song_folder.id,
                        title: title.to_string(),
                        normalized_title: normalize_accents(title),
                        year,
                    })
                    .await?;
                ctx.counts.albums += 1;
                debug!(artist = %artist.title, album = %album.title, "Added album");
                album
            }
        };

        ctx.add_target(album.folder_id, AttachTarget::Album(album.id));
        ctx.albums.insert(key, album.clone());
        Ok(album)
    }

    /// Give artists and albums the art and metadata found in their folders
    async fn attach_folder_items(&self, ctx: &ScanContext) {
        for (target, found) in ctx.pending_attachments() {
            let result = match target {
                AttachTarget::Artist(id) => {
                    self.db
                        .artists()
                        .set_attachments(id, found.art, found.metadata)
                        .await
                }
                AttachTarget::Album(id) => {
                    self.db
                        .albums()
                        .set_attachments(id, found.art, found.metadata)
                        .await
                }
            };

            if let Err(e) = result {
                warn!(record = ?target, error = %e, "Failed to attach folder items");
            }
        }
    }
}
