//! SQLite helper utilities for type conversion
//!
//! SQLite has no UUID, boolean or timestamp types. Ids are stored as TEXT,
//! flags as 0/1 INTEGERs and timestamps as RFC 3339 TEXT.

use std::path::MAIN_SEPARATOR;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// UUID Helpers
// ============================================================================

/// Convert a UUID to a SQLite-compatible string
#[inline]
pub fn uuid_to_str(id: Uuid) -> String {
    id.to_string()
}

/// Parse a SQLite string back to a UUID
#[inline]
pub fn str_to_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| anyhow!("Invalid UUID '{}': {}", s, e))
}

/// Parse an optional SQLite string to an optional UUID
#[inline]
pub fn str_to_uuid_opt(s: Option<&str>) -> Result<Option<Uuid>> {
    s.map(str_to_uuid).transpose()
}

/// Decode a required UUID column
pub fn uuid_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> sqlx::Result<Uuid> {
    use sqlx::Row;
    let raw: String = row.try_get(column)?;
    str_to_uuid(&raw).map_err(|e| sqlx::Error::Decode(e.into()))
}

/// Decode a nullable UUID column
pub fn uuid_column_opt(row: &sqlx::sqlite::SqliteRow, column: &str) -> sqlx::Result<Option<Uuid>> {
    use sqlx::Row;
    let raw: Option<String> = row.try_get(column)?;
    str_to_uuid_opt(raw.as_deref()).map_err(|e| sqlx::Error::Decode(e.into()))
}

// ============================================================================
// Timestamp Helpers (stored as ISO8601 TEXT in SQLite)
// ============================================================================

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Convert a chrono DateTime to ISO8601 string
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse an ISO8601 string to DateTime
#[inline]
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Try parsing SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

/// Decode a timestamp column
pub fn datetime_column(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> sqlx::Result<DateTime<Utc>> {
    use sqlx::Row;
    let raw: String = row.try_get(column)?;
    str_to_datetime(&raw).map_err(|e| sqlx::Error::Decode(e.into()))
}

// ============================================================================
// Boolean Helpers (SQLite uses 0/1 integers)
// ============================================================================

/// Convert bool to SQLite integer (0 or 1)
#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert SQLite integer to bool
#[inline]
pub fn int_to_bool(i: i32) -> bool {
    i != 0
}

// ============================================================================
// Path Scope Helpers
// ============================================================================

/// Bind values for a path-prefix scope: the scope itself and the scope with
/// a trailing separator.
///
/// Used with [PATH_IN_SCOPE_SQL] so that `/music/a` matches `/music/a` and
/// `/music/a/x.mp3` but not `/music/ab`. An empty scope matches everything.
pub fn path_scope(scope: &str) -> (String, String) {
    let trimmed = scope.trim_end_matches(MAIN_SEPARATOR);
    if trimmed.is_empty() && !scope.is_empty() {
        // The filesystem root itself
        return (scope.to_string(), scope.to_string());
    }
    (trimmed.to_string(), format!("{}{}", trimmed, MAIN_SEPARATOR))
}

/// Predicate over a `path` column, bound with `?1` = scope, `?2` = scope + separator.
pub const PATH_IN_SCOPE_SQL: &str =
    "(?1 = '' OR path = ?1 OR substr(path, 1, length(?2)) = ?2)";

/// Negation of [PATH_IN_SCOPE_SQL].
pub const PATH_NOT_IN_SCOPE_SQL: &str =
    "NOT (?1 = '' OR path = ?1 OR substr(path, 1, length(?2)) = ?2)";
