//! Song database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    PATH_IN_SCOPE_SQL, PATH_NOT_IN_SCOPE_SQL, datetime_column, datetime_to_str, now_iso8601,
    path_scope, uuid_column, uuid_to_str,
};

/// Song record from database
#[derive(Debug, Clone, PartialEq)]
pub struct SongRecord {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub album_id: Uuid,
    pub folder_id: Uuid,
    pub title: String,
    pub normalized_title: String,
    // File info
    pub path: String,
    pub file_size: i64,
    pub file_type: String,
    pub modified_at: DateTime<Utc>,
    // Audio properties
    pub bitrate: i64,
    pub channels: i64,
    pub sample_rate: i64,
    pub length_secs: i64,
    pub track_number: i64,
    /// `"NN/NN"` disc position, or `"NN"` when the total is unknown
    pub disc: String,
    // Tags
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub musicbrainz_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SongRecord {
    /// Disc number parsed from the disc string, 1 when unparseable
    pub fn disc_number(&self) -> u32 {
        self.disc
            .split('/')
            .next()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(1)
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SongRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: uuid_column(row, "id")?,
            artist_id: uuid_column(row, "artist_id")?,
            album_id: uuid_column(row, "album_id")?,
            folder_id: uuid_column(row, "folder_id")?,
            title: row.try_get("title")?,
            normalized_title: row.try_get("normalized_title")?,
            path: row.try_get("path")?,
            file_size: row.try_get("file_size")?,
            file_type: row.try_get("file_type")?,
            modified_at: datetime_column(row, "modified_at")?,
            bitrate: row.try_get("bitrate")?,
            channels: row.try_get("channels")?,
            sample_rate: row.try_get("sample_rate")?,
            length_secs: row.try_get("length_secs")?,
            track_number: row.try_get("track_number")?,
            disc: row.try_get("disc")?,
            year: row.try_get("year")?,
            genre: row.try_get("genre")?,
            comment: row.try_get("comment")?,
            musicbrainz_id: row.try_get("musicbrainz_id")?,
            created_at: datetime_column(row, "created_at")?,
            updated_at: datetime_column(row, "updated_at")?,
        })
    }
}

/// Field values for inserting or refreshing a song
#[derive(Debug, Clone)]
pub struct SongData {
    pub artist_id: Uuid,
    pub album_id: Uuid,
    pub folder_id: Uuid,
    pub title: String,
    pub normalized_title: String,
    pub path: String,
    pub file_size: i64,
    pub file_type: String,
    pub modified_at: DateTime<Utc>,
    pub bitrate: i64,
    pub channels: i64,
    pub sample_rate: i64,
    pub length_secs: i64,
    pub track_number: i64,
    pub disc: String,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub comment: Option<String>,
}

const SONG_COLUMNS: &str = "id, artist_id, album_id, folder_id, title, normalized_title, path, \
     file_size, file_type, modified_at, bitrate, channels, sample_rate, length_secs, \
     track_number, disc, year, genre, comment, musicbrainz_id, created_at, updated_at";

pub struct SongRepository {
    pool: SqlitePool,
}

impl SongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<SongRecord>> {
        let record = sqlx::query_as::<_, SongRecord>(&format!(
            "SELECT {} FROM songs WHERE id = ?1",
            SONG_COLUMNS
        ))
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<SongRecord>> {
        let record = sqlx::query_as::<_, SongRecord>(&format!(
            "SELECT {} FROM songs WHERE path = ?1",
            SONG_COLUMNS
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create(&self, data: &SongData) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO songs (
                id, artist_id, album_id, folder_id, title, normalized_title, path,
                file_size, file_type, modified_at, bitrate, channels, sample_rate,
                length_secs, track_number, disc, year, genre, comment,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?20
            )
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(uuid_to_str(data.artist_id))
        .bind(uuid_to_str(data.album_id))
        .bind(uuid_to_str(data.folder_id))
        .bind(&data.title)
        .bind(&data.normalized_title)
        .bind(&data.path)
        .bind(data.file_size)
        .bind(&data.file_type)
        .bind(datetime_to_str(data.modified_at))
        .bind(data.bitrate)
        .bind(data.channels)
        .bind(data.sample_rate)
        .bind(data.length_secs)
        .bind(data.track_number)
        .bind(&data.disc)
        .bind(data.year)
        .bind(&data.genre)
        .bind(&data.comment)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Overwrite every scanned field of an existing song, keeping its id
    pub async fn update(&self, id: Uuid, data: &SongData) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE songs SET
                artist_id = ?2, album_id = ?3, folder_id = ?4, title = ?5,
                normalized_title = ?6, path = ?7, file_size = ?8, file_type = ?9,
                modified_at = ?10, bitrate = ?11, channels = ?12, sample_rate = ?13,
                length_secs = ?14, track_number = ?15, disc = ?16, year = ?17,
                genre = ?18, comment = ?19, updated_at = ?20
            WHERE id = ?1
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(uuid_to_str(data.artist_id))
        .bind(uuid_to_str(data.album_id))
        .bind(uuid_to_str(data.folder_id))
        .bind(&data.title)
        .bind(&data.normalized_title)
        .bind(&data.path)
        .bind(data.file_size)
        .bind(&data.file_type)
        .bind(datetime_to_str(data.modified_at))
        .bind(data.bitrate)
        .bind(data.channels)
        .bind(data.sample_rate)
        .bind(data.length_secs)
        .bind(data.track_number)
        .bind(&data.disc)
        .bind(data.year)
        .bind(&data.genre)
        .bind(&data.comment)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Songs on an album, in disc and track order
    pub async fn list_for_album(&self, album_id: Uuid) -> Result<Vec<SongRecord>> {
        let records = sqlx::query_as::<_, SongRecord>(&format!(
            "SELECT {} FROM songs WHERE album_id = ?1 ORDER BY disc, track_number",
            SONG_COLUMNS
        ))
        .bind(uuid_to_str(album_id))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Songs at or below `scope`
    pub async fn list_in_path(&self, scope: &str) -> Result<Vec<SongRecord>> {
        let (exact, prefix) = path_scope(scope);
        let records = sqlx::query_as::<_, SongRecord>(&format!(
            "SELECT {} FROM songs WHERE {}",
            SONG_COLUMNS, PATH_IN_SCOPE_SQL
        ))
        .bind(exact)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Songs outside `base`
    pub async fn list_not_in_path(&self, base: &str) -> Result<Vec<SongRecord>> {
        let (exact, prefix) = path_scope(base);
        let records = sqlx::query_as::<_, SongRecord>(&format!(
            "SELECT {} FROM songs WHERE {}",
            SONG_COLUMNS, PATH_NOT_IN_SCOPE_SQL
        ))
        .bind(exact)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM songs WHERE id = ?1")
            .bind(uuid_to_str(id))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
