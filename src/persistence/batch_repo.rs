//! Pending batch repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::draft::TaskDraft;
use crate::models::pending_batch::PendingBatch;
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_opt_ts, decode_ts, encode_ts, Transaction};

/// Repository wrapper around `SQLite` for pending batches.
#[derive(Clone)]
pub struct BatchRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: String,
    owner_id: String,
    drafts: String,
    source_message: String,
    active: i64,
    created_at: String,
    consumed_at: Option<String>,
}

impl BatchRow {
    fn into_batch(self) -> Result<PendingBatch> {
        let drafts: Vec<TaskDraft> = serde_json::from_str(&self.drafts)
            .map_err(|e| AppError::Db(format!("invalid drafts: {e}")))?;
        Ok(PendingBatch {
            id: self.id,
            owner_id: self.owner_id,
            drafts,
            source_message: self.source_message,
            active: self.active != 0,
            created_at: decode_ts(&self.created_at, "created_at")?,
            consumed_at: decode_opt_ts(self.consumed_at.as_deref(), "consumed_at")?,
        })
    }
}

impl BatchRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a new active batch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the insert fails.
    pub async fn create(&self, batch: &PendingBatch) -> Result<PendingBatch> {
        let drafts = serde_json::to_string(&batch.drafts)
            .map_err(|e| AppError::Db(format!("serialize drafts: {e}")))?;
        sqlx::query(
            "INSERT INTO pending_batch (id, owner_id, drafts, source_message, active,
             created_at, consumed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&batch.id)
        .bind(&batch.owner_id)
        .bind(drafts)
        .bind(&batch.source_message)
        .bind(i64::from(batch.active))
        .bind(encode_ts(batch.created_at))
        .bind(batch.consumed_at.map(encode_ts))
        .execute(self.db.as_ref())
        .await?;
        Ok(batch.clone())
    }

    /// Most recent active batch for an owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn active_for_owner(&self, owner_id: &str) -> Result<Option<PendingBatch>> {
        let row: Option<BatchRow> = sqlx::query_as(
            "SELECT * FROM pending_batch WHERE owner_id = ?1 AND active = 1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(BatchRow::into_batch).transpose()
    }

    /// Consume an active batch as part of `tx`, so the batch only closes
    /// if everything built from it commits too.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyConsumed` if another answer consumed it
    /// first, or `AppError::Db` if the update fails.
    pub async fn consume(
        &self,
        tx: &mut Transaction<'_>,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pending_batch SET active = 0, consumed_at = ?1 WHERE id = ?2 AND active = 1",
        )
        .bind(encode_ts(now))
        .bind(id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::AlreadyConsumed(format!("batch {id}")));
        }
        Ok(())
    }

    /// Delete consumed batches created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM pending_batch WHERE active = 0 AND created_at < ?1")
                .bind(encode_ts(cutoff))
                .execute(self.db.as_ref())
                .await?;
        Ok(result.rows_affected())
    }
}
