//! Schema bootstrap for the library store
//!
//! Tables are created idempotently on startup. Natural keys (paths, artist
//! titles, artist/album title pairs) are enforced with UNIQUE constraints.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

const TABLES: &[(&str, &str)] = &[
    (
        "folders",
        r#"
        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY NOT NULL,
            parent_id TEXT,
            title TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "artists",
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL UNIQUE,
            normalized_title TEXT NOT NULL UNIQUE,
            folder_id TEXT,
            art_id TEXT,
            metadata_id TEXT,
            musicbrainz_id TEXT,
            discogs_id TEXT,
            needs_reconciliation INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "albums",
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id TEXT PRIMARY KEY NOT NULL,
            artist_id TEXT NOT NULL,
            folder_id TEXT NOT NULL,
            title TEXT NOT NULL,
            normalized_title TEXT NOT NULL,
            year INTEGER,
            art_id TEXT,
            metadata_id TEXT,
            musicbrainz_id TEXT,
            discogs_id INTEGER,
            needs_reconciliation INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (artist_id, title)
        )
        "#,
    ),
    (
        "songs",
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY NOT NULL,
            artist_id TEXT NOT NULL,
            album_id TEXT NOT NULL,
            folder_id TEXT NOT NULL,
            title TEXT NOT NULL,
            normalized_title TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            file_size INTEGER NOT NULL,
            file_type TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            bitrate INTEGER NOT NULL,
            channels INTEGER NOT NULL,
            sample_rate INTEGER NOT NULL,
            length_secs INTEGER NOT NULL,
            track_number INTEGER NOT NULL,
            disc TEXT NOT NULL,
            year INTEGER,
            genre TEXT,
            comment TEXT,
            musicbrainz_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "art",
        r#"
        CREATE TABLE IF NOT EXISTS art (
            id TEXT PRIMARY KEY NOT NULL,
            folder_id TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            file_size INTEGER NOT NULL,
            modified_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "metadata",
        r#"
        CREATE TABLE IF NOT EXISTS metadata (
            id TEXT PRIMARY KEY NOT NULL,
            folder_id TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            file_size INTEGER NOT NULL,
            modified_at TEXT NOT NULL
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_songs_album_id ON songs (album_id)",
    "CREATE INDEX IF NOT EXISTS idx_songs_artist_id ON songs (artist_id)",
    "CREATE INDEX IF NOT EXISTS idx_albums_artist_id ON albums (artist_id)",
];

/// Create all tables and indexes that do not exist yet.
pub async fn sync_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (table, ddl) in TABLES {
        sqlx::query(ddl)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create table {}", table))?;
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    info!(tables = TABLES.len(), "Schema synchronized");
    Ok(())
}
