//! Album database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    datetime_column, int_to_bool, now_iso8601, uuid_column, uuid_column_opt, uuid_to_str,
};

/// Album record from database
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumRecord {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub folder_id: Uuid,
    // Basic info
    pub title: String,
    pub normalized_title: String,
    pub year: Option<i32>,
    // Attachments
    pub art_id: Option<Uuid>,
    pub metadata_id: Option<Uuid>,
    // External IDs
    pub musicbrainz_id: Option<String>,
    pub discogs_id: Option<i64>,
    pub needs_reconciliation: bool,
    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for AlbumRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        // Boolean stored as INTEGER
        let needs_reconciliation: i32 = row.try_get("needs_reconciliation")?;

        Ok(Self {
            id: uuid_column(row, "id")?,
            artist_id: uuid_column(row, "artist_id")?,
            folder_id: uuid_column(row, "folder_id")?,
            title: row.try_get("title")?,
            normalized_title: row.try_get("normalized_title")?,
            year: row.try_get("year")?,
            art_id: uuid_column_opt(row, "art_id")?,
            metadata_id: uuid_column_opt(row, "metadata_id")?,
            musicbrainz_id: row.try_get("musicbrainz_id")?,
            discogs_id: row.try_get("discogs_id")?,
            needs_reconciliation: int_to_bool(needs_reconciliation),
            created_at: datetime_column(row, "created_at")?,
            updated_at: datetime_column(row, "updated_at")?,
        })
    }
}

/// An album queued for reconciliation, joined with its artist's title
#[derive(Debug, Clone)]
pub struct AlbumForReconciliation {
    pub album: AlbumRecord,
    pub artist_title: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for AlbumForReconciliation {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            album: AlbumRecord::from_row(row)?,
            artist_title: row.try_get("artist_title")?,
        })
    }
}

/// Input for creating an album
#[derive(Debug)]
pub struct CreateAlbum {
    pub artist_id: Uuid,
    pub folder_id: Uuid,
    pub title: String,
    pub normalized_title: String,
    pub year: Option<i32>,
}

const ALBUM_COLUMNS: &str = "id, artist_id, folder_id, title, normalized_title, year, art_id, \
     metadata_id, musicbrainz_id, discogs_id, needs_reconciliation, created_at, updated_at";

pub struct AlbumRepository {
    pool: SqlitePool,
}

impl AlbumRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<AlbumRecord>> {
        let record = sqlx::query_as::<_, AlbumRecord>(&format!(
            "SELECT {} FROM albums WHERE id = ?1",
            ALBUM_COLUMNS
        ))
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_artist_and_title(
        &self,
        artist_id: Uuid,
        title: &str,
    ) -> Result<Option<AlbumRecord>> {
        let record = sqlx::query_as::<_, AlbumRecord>(&format!(
            "SELECT {} FROM albums WHERE artist_id = ?1 AND title = ?2",
            ALBUM_COLUMNS
        ))
        .bind(uuid_to_str(artist_id))
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create(&self, input: CreateAlbum) -> Result<AlbumRecord> {
        let id = Uuid::new_v4();
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO albums (
                id, artist_id, folder_id, title, normalized_title, year,
                needs_reconciliation, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(uuid_to_str(input.artist_id))
        .bind(uuid_to_str(input.folder_id))
        .bind(&input.title)
        .bind(&input.normalized_title)
        .bind(input.year)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Album {} vanished after insert", input.title))
    }

    /// Point the album at art and/or metadata records. `None` keeps the
    /// current reference.
    pub async fn set_attachments(
        &self,
        id: Uuid,
        art_id: Option<Uuid>,
        metadata_id: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE albums SET
                art_id = COALESCE(?2, art_id),
                metadata_id = COALESCE(?3, metadata_id),
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(art_id.map(uuid_to_str))
        .bind(metadata_id.map(uuid_to_str))
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store provider ids found for the album. Known ids are never cleared;
    /// the reconciliation flag drops once both ids are present.
    pub async fn update_external_ids(
        &self,
        id: Uuid,
        musicbrainz_id: Option<&str>,
        discogs_id: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE albums SET
                musicbrainz_id = COALESCE(?2, musicbrainz_id),
                discogs_id = COALESCE(?3, discogs_id),
                needs_reconciliation =
                    (COALESCE(?2, musicbrainz_id) IS NULL OR COALESCE(?3, discogs_id) IS NULL),
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(musicbrainz_id)
        .bind(discogs_id)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Albums whose provider ids are unresolved or shared with another album,
    /// ordered by artist.
    pub async fn list_needing_reconciliation(&self) -> Result<Vec<AlbumForReconciliation>> {
        let records = sqlx::query_as::<_, AlbumForReconciliation>(
            r#"
            SELECT a.id, a.artist_id, a.folder_id, a.title, a.normalized_title, a.year,
                   a.art_id, a.metadata_id, a.musicbrainz_id, a.discogs_id,
                   a.needs_reconciliation, a.created_at, a.updated_at,
                   ar.title AS artist_title
            FROM albums a
            JOIN artists ar ON ar.id = a.artist_id
            WHERE a.needs_reconciliation = 1
               OR a.musicbrainz_id IN (
                    SELECT musicbrainz_id FROM albums
                    WHERE musicbrainz_id IS NOT NULL
                    GROUP BY musicbrainz_id HAVING COUNT(*) > 1)
               OR a.discogs_id IN (
                    SELECT discogs_id FROM albums
                    WHERE discogs_id IS NOT NULL
                    GROUP BY discogs_id HAVING COUNT(*) > 1)
            ORDER BY ar.title, a.title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Delete albums no song references anymore
    pub async fn purge_orphans(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM albums WHERE id NOT IN (SELECT DISTINCT album_id FROM songs)",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
