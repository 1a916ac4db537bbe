//! Database connection and repositories

pub mod albums;
pub mod art;
pub mod artists;
pub mod folders;
pub mod metadata;
pub mod schema;
pub mod songs;
pub mod sqlite_helpers;

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info};

pub use albums::{AlbumForReconciliation, AlbumRecord, AlbumRepository, CreateAlbum};
pub use art::{ArtRecord, ArtRepository, CreateArt};
pub use artists::{ArtistRecord, ArtistRepository, CreateArtist};
pub use folders::{CreateFolder, FolderRecord, FolderRepository};
pub use metadata::{CreateMetadata, MetadataRecord, MetadataRepository};
pub use songs::{SongData, SongRecord, SongRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the SQLite file at `url` and bring the schema up to date.
    ///
    /// Accepts either a plain path or a `sqlite://` URL.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", path))?;

        let db = Self { pool };
        db.sync_schema().await?;

        info!(path = %path, max_connections = max_connections, "Database ready");
        Ok(db)
    }

    /// A private in-memory database with the full schema.
    ///
    /// Uses a single long-lived connection; every new SQLite memory
    /// connection would otherwise see an empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.sync_schema().await?;
        Ok(db)
    }

    /// Create missing tables and indexes
    pub async fn sync_schema(&self) -> Result<()> {
        schema::sync_schema(&self.pool).await
    }

    /// Truncate the write-ahead log
    pub async fn checkpoint_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("WAL checkpoint failed")?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a folders repository
    pub fn folders(&self) -> FolderRepository {
        FolderRepository::new(self.pool.clone())
    }

    /// Get an artists repository
    pub fn artists(&self) -> ArtistRepository {
        ArtistRepository::new(self.pool.clone())
    }

    /// Get an albums repository
    pub fn albums(&self) -> AlbumRepository {
        AlbumRepository::new(self.pool.clone())
    }

    /// Get a songs repository
    pub fn songs(&self) -> SongRepository {
        SongRepository::new(self.pool.clone())
    }

    /// Get an art repository
    pub fn art(&self) -> ArtRepository {
        ArtRepository::new(self.pool.clone())
    }

    /// Get a metadata repository
    pub fn metadata(&self) -> MetadataRepository {
        MetadataRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn song_data(
        path: &str,
        artist_id: Uuid,
        album_id: Uuid,
        folder_id: Uuid,
    ) -> SongData {
        SongData {
            artist_id,
            album_id,
            folder_id,
            title: "Song".to_string(),
            normalized_title: "song".to_string(),
            path: path.to_string(),
            file_size: 1024,
            file_type: "mp3".to_string(),
            modified_at: Utc::now(),
            bitrate: 320,
            channels: 2,
            sample_rate: 44100,
            length_secs: 180,
            track_number: 1,
            disc: "01/01".to_string(),
            year: Some(2001),
            genre: None,
            comment: None,
        }
    }

    async fn seed_artist_album(db: &Database) -> (FolderRecord, ArtistRecord, AlbumRecord) {
        let folder = db
            .folders()
            .create(CreateFolder {
                parent_id: None,
                title: "Album".to_string(),
                path: "/music/Artist/Album".to_string(),
            })
            .await
            .unwrap();
        let artist = db
            .artists()
            .create(CreateArtist {
                title: "Artist".to_string(),
                normalized_title: "artist".to_string(),
                folder_id: None,
            })
            .await
            .unwrap();
        let album = db
            .albums()
            .create(CreateAlbum {
                artist_id: artist.id,
                folder_id: folder.id,
                title: "Album".to_string(),
                normalized_title: "album".to_string(),
                year: Some(2001),
            })
            .await
            .unwrap();
        (folder, artist, album)
    }

    #[tokio::test]
    async fn test_folder_lookup_by_path() {
        let db = Database::connect_in_memory().await.unwrap();
        let created = db
            .folders()
            .create(CreateFolder {
                parent_id: None,
                title: "music".to_string(),
                path: "/music".to_string(),
            })
            .await
            .unwrap();

        let loaded = db.folders().get_by_path("/music").await.unwrap();
        assert_eq!(loaded, Some(created));
        assert!(db.folders().get_by_path("/other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_folder_path_is_unique() {
        let db = Database::connect_in_memory().await.unwrap();
        let input = || CreateFolder {
            parent_id: None,
            title: "music".to_string(),
            path: "/music".to_string(),
        };
        db.folders().create(input()).await.unwrap();
        assert!(db.folders().create(input()).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_path_scope_respects_separator() {
        let db = Database::connect_in_memory().await.unwrap();
        for path in ["/music/a", "/music/a/b", "/music/ab"] {
            db.folders()
                .create(CreateFolder {
                    parent_id: None,
                    title: path.to_string(),
                    path: path.to_string(),
                })
                .await
                .unwrap();
        }

        let mut inside: Vec<String> = db
            .folders()
            .list_in_path("/music/a")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        inside.sort();
        assert_eq!(inside, vec!["/music/a".to_string(), "/music/a/b".to_string()]);

        let outside: Vec<String> = db
            .folders()
            .list_not_in_path("/music/a")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(outside, vec!["/music/ab".to_string()]);

        assert_eq!(db.folders().list_in_path("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_song_update_keeps_id() {
        let db = Database::connect_in_memory().await.unwrap();
        let (folder, artist, album) = seed_artist_album(&db).await;

        let mut data = song_data("/music/Artist/Album/01.mp3", artist.id, album.id, folder.id);
        let id = db.songs().create(&data).await.unwrap();

        data.title = "Renamed".to_string();
        db.songs().update(id, &data).await.unwrap();

        let song = db
            .songs()
            .get_by_path("/music/Artist/Album/01.mp3")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(song.id, id);
        assert_eq!(song.title, "Renamed");
        assert_eq!(song.disc_number(), 1);
    }

    #[tokio::test]
    async fn test_purge_orphans_album_then_artist() {
        let db = Database::connect_in_memory().await.unwrap();
        let (folder, artist, album) = seed_artist_album(&db).await;
        let id = db
            .songs()
            .create(&song_data("/music/Artist/Album/01.mp3", artist.id, album.id, folder.id))
            .await
            .unwrap();

        assert_eq!(db.albums().purge_orphans().await.unwrap(), 0);
        assert_eq!(db.artists().purge_orphans().await.unwrap(), 0);

        db.songs().delete(id).await.unwrap();
        assert_eq!(db.albums().purge_orphans().await.unwrap(), 1);
        assert_eq!(db.artists().purge_orphans().await.unwrap(), 1);
        assert!(db.albums().get_by_id(album.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_external_ids_never_cleared() {
        let db = Database::connect_in_memory().await.unwrap();
        let (_, _, album) = seed_artist_album(&db).await;
        assert!(album.needs_reconciliation);

        db.albums()
            .update_external_ids(album.id, Some("mbid-1"), None)
            .await
            .unwrap();
        let partial = db.albums().get_by_id(album.id).await.unwrap().unwrap();
        assert_eq!(partial.musicbrainz_id.as_deref(), Some("mbid-1"));
        assert!(partial.needs_reconciliation);

        db.albums()
            .update_external_ids(album.id, None, Some(42))
            .await
            .unwrap();
        let resolved = db.albums().get_by_id(album.id).await.unwrap().unwrap();
        assert_eq!(resolved.musicbrainz_id.as_deref(), Some("mbid-1"));
        assert_eq!(resolved.discogs_id, Some(42));
        assert!(!resolved.needs_reconciliation);
    }

    #[tokio::test]
    async fn test_duplicate_ids_need_reconciliation() {
        let db = Database::connect_in_memory().await.unwrap();
        let (folder, artist, first) = seed_artist_album(&db).await;
        let second = db
            .albums()
            .create(CreateAlbum {
                artist_id: artist.id,
                folder_id: folder.id,
                title: "Album (Deluxe)".to_string(),
                normalized_title: "album (deluxe)".to_string(),
                year: None,
            })
            .await
            .unwrap();

        db.albums()
            .update_external_ids(first.id, Some("shared"), Some(1))
            .await
            .unwrap();
        db.albums()
            .update_external_ids(second.id, Some("other"), Some(2))
            .await
            .unwrap();
        assert!(db.albums().list_needing_reconciliation().await.unwrap().is_empty());

        db.albums()
            .update_external_ids(second.id, Some("shared"), None)
            .await
            .unwrap();
        let pending = db.albums().list_needing_reconciliation().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].artist_title, "Artist");
    }

    #[tokio::test]
    async fn test_attachments_keep_existing_reference() {
        let db = Database::connect_in_memory().await.unwrap();
        let (_, artist, _) = seed_artist_album(&db).await;
        let art_id = Uuid::new_v4();

        db.artists()
            .set_attachments(artist.id, Some(art_id), None)
            .await
            .unwrap();
        db.artists()
            .set_attachments(artist.id, None, None)
            .await
            .unwrap();

        let loaded = db.artists().get_by_id(artist.id).await.unwrap().unwrap();
        assert_eq!(loaded.art_id, Some(art_id));
        assert_eq!(loaded.metadata_id, None);
    }
}
