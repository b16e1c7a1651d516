//! Conversation log repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::conversation::ConversationEntry;
use crate::models::idempotency::Direction;
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_ts, encode_ts};

/// Repository wrapper around `SQLite` for conversation entries.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    owner_id: String,
    direction: String,
    content: String,
    intent: Option<String>,
    task_id: Option<String>,
    created_at: String,
}

impl ConversationRow {
    fn into_entry(self) -> Result<ConversationEntry> {
        let direction = match self.direction.as_str() {
            "incoming" => Direction::Incoming,
            "outgoing" => Direction::Outgoing,
            other => return Err(AppError::Db(format!("invalid direction: {other}"))),
        };
        Ok(ConversationEntry {
            id: self.id,
            owner_id: self.owner_id,
            direction,
            content: self.content,
            intent: self.intent,
            task_id: self.task_id,
            created_at: decode_ts(&self.created_at, "created_at")?,
        })
    }
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn append(&self, entry: &ConversationEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversation_log (id, owner_id, direction, content, intent, task_id,
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&entry.id)
        .bind(&entry.owner_id)
        .bind(entry.direction.as_str())
        .bind(&entry.content)
        .bind(&entry.intent)
        .bind(&entry.task_id)
        .bind(encode_ts(entry.created_at))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// The owner's last `limit` entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn recent(&self, owner_id: &str, limit: u32) -> Result<Vec<ConversationEntry>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT * FROM conversation_log WHERE owner_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(owner_id)
        .bind(i64::from(limit))
        .fetch_all(self.db.as_ref())
        .await?;

        let mut entries = rows
            .into_iter()
            .map(ConversationRow::into_entry)
            .collect::<Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Delete entries created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversation_log WHERE created_at < ?1")
            .bind(encode_ts(cutoff))
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
