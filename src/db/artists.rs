//! Artist database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    datetime_column, int_to_bool, now_iso8601, uuid_column, uuid_column_opt, uuid_to_str,
};

/// Artist record from database
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRecord {
    pub id: Uuid,
    pub title: String,
    /// Accent-stripped, lower-cased title used as the lookup key
    pub normalized_title: String,
    pub folder_id: Option<Uuid>,
    pub art_id: Option<Uuid>,
    pub metadata_id: Option<Uuid>,
    // External IDs, comma-joined when several provider artists matched
    pub musicbrainz_id: Option<String>,
    pub discogs_id: Option<String>,
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ArtistRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let needs_reconciliation: i32 = row.try_get("needs_reconciliation")?;

        Ok(Self {
            id: uuid_column(row, "id")?,
            title: row.try_get("title")?,
            normalized_title: row.try_get("normalized_title")?,
            folder_id: uuid_column_opt(row, "folder_id")?,
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

/// Input for creating an artist
#[derive(Debug)]
pub struct CreateArtist {
    pub title: String,
    pub normalized_title: String,
    pub folder_id: Option<Uuid>,
}

const ARTIST_COLUMNS: &str = "id, title, normalized_title, folder_id, art_id, metadata_id, \
     musicbrainz_id, discogs_id, needs_reconciliation, created_at, updated_at";

pub struct ArtistRepository {
    pool: SqlitePool,
}

impl ArtistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ArtistRecord>> {
        let record = sqlx::query_as::<_, ArtistRecord>(&format!(
            "SELECT {} FROM artists WHERE id = ?1",
            ARTIST_COLUMNS
        ))
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_normalized_title(&self, normalized: &str) -> Result<Option<ArtistRecord>> {
        let record = sqlx::query_as::<_, ArtistRecord>(&format!(
            "SELECT {} FROM artists WHERE normalized_title = ?1",
            ARTIST_COLUMNS
        ))
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert a new artist. External ids start unset and the artist is
    /// flagged for reconciliation.
    pub async fn create(&self, input: CreateArtist) -> Result<ArtistRecord> {
        let id = Uuid::new_v4();
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO artists (
                id, title, normalized_title, folder_id, needs_reconciliation,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(&input.title)
        .bind(&input.normalized_title)
        .bind(input.folder_id.map(uuid_to_str))
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Artist {} vanished after insert", input.title))
    }

    /// Point the artist at art and/or metadata records. `None` keeps the
    /// current reference.
    pub async fn set_attachments(
        &self,
        id: Uuid,
        art_id: Option<Uuid>,
        metadata_id: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE artists SET
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

    /// Store provider ids found for the artist. Known ids are never cleared;
    /// the reconciliation flag drops once both ids are present.
    pub async fn update_external_ids(
        &self,
        id: Uuid,
        musicbrainz_id: Option<&str>,
        discogs_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE artists SET
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

    /// Delete artists no song references anymore
    pub async fn purge_orphans(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM artists WHERE id NOT IN (SELECT DISTINCT artist_id FROM songs)",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
