//! Folder database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    PATH_IN_SCOPE_SQL, PATH_NOT_IN_SCOPE_SQL, datetime_column, now_iso8601, path_scope,
    uuid_column, uuid_column_opt, uuid_to_str,
};

/// Folder record from database
#[derive(Debug, Clone, PartialEq)]
pub struct FolderRecord {
    pub id: Uuid,
    /// Unset for the library root (or when the parent was never indexed)
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for FolderRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: uuid_column(row, "id")?,
            parent_id: uuid_column_opt(row, "parent_id")?,
            title: row.try_get("title")?,
            path: row.try_get("path")?,
            created_at: datetime_column(row, "created_at")?,
        })
    }
}

/// Input for creating a folder
#[derive(Debug)]
pub struct CreateFolder {
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub path: String,
}

pub struct FolderRepository {
    pool: SqlitePool,
}

impl FolderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<FolderRecord>> {
        let record = sqlx::query_as::<_, FolderRecord>(
            "SELECT id, parent_id, title, path, created_at FROM folders WHERE id = ?1",
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<FolderRecord>> {
        let record = sqlx::query_as::<_, FolderRecord>(
            "SELECT id, parent_id, title, path, created_at FROM folders WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create(&self, input: CreateFolder) -> Result<FolderRecord> {
        let id = Uuid::new_v4();
        let now = now_iso8601();

        sqlx::query(
            "INSERT INTO folders (id, parent_id, title, path, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(uuid_to_str(id))
        .bind(input.parent_id.map(uuid_to_str))
        .bind(&input.title)
        .bind(&input.path)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Folder {} vanished after insert", input.path))
    }

    /// Folders at or below `scope`
    pub async fn list_in_path(&self, scope: &str) -> Result<Vec<FolderRecord>> {
        let (exact, prefix) = path_scope(scope);
        let records = sqlx::query_as::<_, FolderRecord>(&format!(
            "SELECT id, parent_id, title, path, created_at FROM folders WHERE {} ORDER BY path DESC",
            PATH_IN_SCOPE_SQL
        ))
        .bind(exact)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Folders outside `base`
    pub async fn list_not_in_path(&self, base: &str) -> Result<Vec<FolderRecord>> {
        let (exact, prefix) = path_scope(base);
        let records = sqlx::query_as::<_, FolderRecord>(&format!(
            "SELECT id, parent_id, title, path, created_at FROM folders WHERE {}",
            PATH_NOT_IN_SCOPE_SQL
        ))
        .bind(exact)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = ?1")
            .bind(uuid_to_str(id))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
