//! Cover art database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    PATH_IN_SCOPE_SQL, PATH_NOT_IN_SCOPE_SQL, datetime_column, datetime_to_str, path_scope,
    uuid_column, uuid_to_str,
};

/// Image file discovered next to audio files
#[derive(Debug, Clone, PartialEq)]
pub struct ArtRecord {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub path: String,
    pub file_size: i64,
    pub modified_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ArtRecord {
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
pub struct CreateArt {
    pub folder_id: Uuid,
    pub path: String,
    pub file_size: i64,
    pub modified_at: DateTime<Utc>,
}

pub struct ArtRepository {
    pool: SqlitePool,
}

impl ArtRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<ArtRecord>> {
        let record = sqlx::query_as::<_, ArtRecord>(
            "SELECT id, folder_id, path, file_size, modified_at FROM art WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create(&self, input: CreateArt) -> Result<ArtRecord> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO art (id, folder_id, path, file_size, modified_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(uuid_to_str(id))
        .bind(uuid_to_str(input.folder_id))
        .bind(&input.path)
        .bind(input.file_size)
        .bind(datetime_to_str(input.modified_at))
        .execute(&self.pool)
        .await?;

        Ok(ArtRecord {
            id,
            folder_id: input.folder_id,
            path: input.path,
            file_size: input.file_size,
            modified_at: input.modified_at,
        })
    }

    pub async fn list_in_path(&self, scope: &str) -> Result<Vec<ArtRecord>> {
        let (exact, prefix) = path_scope(scope);
        let records = sqlx::query_as::<_, ArtRecord>(&format!(
            "SELECT id, folder_id, path, file_size, modified_at FROM art WHERE {}",
            PATH_IN_SCOPE_SQL
        ))
        .bind(exact)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn list_not_in_path(&self, base: &str) -> Result<Vec<ArtRecord>> {
        let (exact, prefix) = path_scope(base);
        let records = sqlx::query_as::<_, ArtRecord>(&format!(
            "SELECT id, folder_id, path, file_size, modified_at FROM art WHERE {}",
            PATH_NOT_IN_SCOPE_SQL
        ))
        .bind(exact)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM art WHERE id = ?1")
            .bind(uuid_to_str(id))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
