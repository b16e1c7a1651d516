//! Persistence layer modules.

pub mod batch_repo;
pub mod conversation_repo;
pub mod db;
pub mod idempotency_repo;
pub mod job_repo;
pub mod owner_repo;
pub mod reminder_repo;
pub mod retention;
pub mod schema;
pub mod task_repo;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AppError, Result};

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// An open `SQLite` transaction shared by several repositories.
pub type Transaction<'a> = sqlx::Transaction<'a, sqlx::Sqlite>;

/// Encode an instant as fixed-width RFC 3339 UTC text.
///
/// Every stored instant uses the same width so that string comparison in
/// SQL orders chronologically.
#[must_use]
pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored instant, naming the column on failure.
///
/// # Errors
///
/// Returns `AppError::Db` if the text is not RFC 3339.
pub fn decode_ts(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

/// Decode an optional stored instant.
///
/// # Errors
///
/// Returns `AppError::Db` if present but malformed.
pub fn decode_opt_ts(raw: Option<&str>, column: &str) -> Result<Option<DateTime<Utc>>> {
    raw.map(|r| decode_ts(r, column)).transpose()
}

/// Convert a stored non-negative counter.
///
/// # Errors
///
/// Returns `AppError::Db` for negative or oversized values.
pub fn decode_count(raw: i64, column: &str) -> Result<u32> {
    u32::try_from(raw).map_err(|_| AppError::Db(format!("invalid {column}: {raw}")))
}
