//! Sidecar metadata file repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{datetime_column, datetime_to_str, uuid_column, uuid_to_str};

/// The per-folder sidecar file holding provider metadata
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub path: String,
    pub file_size: i64,
    pub modified_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for MetadataRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: uuid_column(row, "id")?,
            folder_id: uuid_column(row, "folder_id")?,
            path: row.try_get("path")?,
            file_size: row.try_get("file_size")?,
            modified_at: datetime_column(row, "modified_at")?,
        })
    }
}

#[derive(Debug)]
pub struct CreateMetadata {
    pub folder_id: Uuid,
    pub path: String,
    pub file_size: i64,
    pub modified_at: DateTime<Utc>,
}

pub struct MetadataRepository {
    pool: SqlitePool,
}

impl MetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<MetadataRecord>> {
        let record = sqlx::query_as::<_, MetadataRecord>(
            "SELECT id, folder_id, path, file_size, modified_at FROM metadata WHERE id = ?1",
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<MetadataRecord>> {
        let record = sqlx::query_as::<_, MetadataRecord>(
            "SELECT id, folder_id, path, file_size, modified_at FROM metadata WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create(&self, input: CreateMetadata) -> Result<MetadataRecord> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO metadata (id, folder_id, path, file_size, modified_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(uuid_to_str(id))
        .bind(uuid_to_str(input.folder_id))
        .bind(&input.path)
        .bind(input.file_size)
        .bind(datetime_to_str(input.modified_at))
        .execute(&self.pool)
        .await?;

        Ok(MetadataRecord {
            id,
            folder_id: input.folder_id,
            path: input.path,
            file_size: input.file_size,
            modified_at: input.modified_at,
        })
    }

    /// The sidecar registered for a folder, if any
    pub async fn get_for_folder(&self, folder_id: Uuid) -> Result<Option<MetadataRecord>> {
        let record = sqlx::query_as::<_, MetadataRecord>(
            "SELECT id, folder_id, path, file_size, modified_at FROM metadata WHERE folder_id = ?1",
        )
        .bind(uuid_to_str(folder_id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn delete_for_folder(&self, folder_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metadata WHERE folder_id = ?1")
            .bind(uuid_to_str(folder_id))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
