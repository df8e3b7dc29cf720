//! SQLite helper utilities for type conversion
//!
//! SQLite has no native timestamp or boolean types. Timestamps are stored as
//! RFC 3339 TEXT and booleans as 0/1 INTEGER.

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

// ============================================================================
// Timestamp Helpers (stored as RFC 3339 TEXT in SQLite)
// ============================================================================

/// Get current UTC timestamp as RFC 3339 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    datetime_to_str(Utc::now())
}

/// Convert a chrono DateTime to a fixed-width RFC 3339 string.
///
/// Fixed width keeps lexicographic order equal to chronological order, so
/// `WHERE created_at < ?` comparisons work on the TEXT column.
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 string (or SQLite's `datetime()` output) to DateTime
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

/// Parse an optional datetime string
#[inline]
pub fn str_to_datetime_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(str_to_datetime(s)?)),
        _ => Ok(None),
    }
}

// ============================================================================
// Row Decoding Helpers (for manual FromRow impls)
// ============================================================================

/// Decode a TEXT timestamp column
pub fn row_datetime(row: &SqliteRow, column: &str) -> sqlx::Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    str_to_datetime(&raw).map_err(|e| sqlx::Error::Decode(e.into()))
}

/// Decode a nullable TEXT timestamp column
pub fn row_datetime_opt(row: &SqliteRow, column: &str) -> sqlx::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    str_to_datetime_opt(raw.as_deref()).map_err(|e| sqlx::Error::Decode(e.into()))
}

// ============================================================================
// Query Building Helpers
// ============================================================================

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern and wrap in wildcards
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Clamp user-supplied pagination to sane bounds, returning (limit, offset)
pub fn page_bounds(page: Option<i64>, limit: Option<i64>, max_limit: i64) -> (i64, i64) {
    let limit = limit.unwrap_or(24).clamp(1, max_limit);
    let page = page.unwrap_or(1).max(1);
    (limit, (page - 1) * limit)
}
