//! Idempotency guard storage.
//!
//! The `(external_id, direction)` primary key is the claim: whichever
//! insert lands first owns the event. A stored `response` lets a retried
//! worker resend the exact reply it computed before failing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::models::idempotency::{ClaimOutcome, Direction, IdempotencyRecord};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_ts, encode_ts, Transaction};

/// Repository wrapper around `SQLite` for idempotency records.
#[derive(Clone)]
pub struct IdempotencyRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    external_id: String,
    direction: String,
    holder: Option<String>,
    processed: i64,
    response: Option<String>,
    created_at: String,
}

impl IdempotencyRow {
    fn into_record(self) -> Result<IdempotencyRecord> {
        let direction = match self.direction.as_str() {
            "incoming" => Direction::Incoming,
            "outgoing" => Direction::Outgoing,
            other => return Err(AppError::Db(format!("invalid direction: {other}"))),
        };
        Ok(IdempotencyRecord {
            external_id: self.external_id,
            direction,
            holder: self.holder,
            processed: self.processed != 0,
            response: self.response,
            created_at: decode_ts(&self.created_at, "created_at")?,
        })
    }
}

impl IdempotencyRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Atomically claim `external_id` in `direction` for `holder`.
    ///
    /// A holder that already owns an unfinished claim gets `Claimed` again,
    /// so a retried job can resume its own work. Every other caller gets
    /// `AlreadyProcessed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert or lookup fails.
    pub async fn claim(
        &self,
        external_id: &str,
        direction: Direction,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let mut conn = self.db.acquire().await?;
        claim_on(&mut conn, external_id, direction, holder, now).await
    }

    /// [`IdempotencyRepo::claim`] as part of `tx`; a rollback forgets the
    /// claim.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert or lookup fails.
    pub async fn claim_in(
        &self,
        tx: &mut Transaction<'_>,
        external_id: &str,
        direction: Direction,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        claim_on(&mut **tx, external_id, direction, holder, now).await
    }

    /// Drop an unfinished claim owned by `holder`, so a redelivery of the
    /// same event can claim it afresh.
    ///
    /// Returns `true` if a claim was released.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn release(
        &self,
        external_id: &str,
        direction: Direction,
        holder: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM idempotency_record \
             WHERE external_id = ?1 AND direction = ?2 AND holder = ?3 AND processed = 0",
        )
        .bind(external_id)
        .bind(direction.as_str())
        .bind(holder)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fetch a record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(
        &self,
        external_id: &str,
        direction: Direction,
    ) -> Result<Option<IdempotencyRecord>> {
        let row: Option<IdempotencyRow> = sqlx::query_as(
            "SELECT * FROM idempotency_record WHERE external_id = ?1 AND direction = ?2",
        )
        .bind(external_id)
        .bind(direction.as_str())
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(IdempotencyRow::into_record).transpose()
    }

    /// Store the reply computed for a claimed event before sending it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn record_response(
        &self,
        external_id: &str,
        direction: Direction,
        response: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE idempotency_record SET response = ?1 \
             WHERE external_id = ?2 AND direction = ?3 AND processed = 0",
        )
        .bind(response)
        .bind(external_id)
        .bind(direction.as_str())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Reply stored by an earlier attempt that did not finish.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn pending_response(
        &self,
        external_id: &str,
        direction: Direction,
    ) -> Result<Option<String>> {
        Ok(self
            .get(external_id, direction)
            .await?
            .filter(|rec| !rec.processed)
            .and_then(|rec| rec.response))
    }

    /// Finish a claim.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_processed(&self, external_id: &str, direction: Direction) -> Result<()> {
        sqlx::query(
            "UPDATE idempotency_record SET processed = 1 \
             WHERE external_id = ?1 AND direction = ?2",
        )
        .bind(external_id)
        .bind(direction.as_str())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Delete records created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_record WHERE created_at < ?1")
            .bind(encode_ts(cutoff))
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

async fn claim_on(
    conn: &mut SqliteConnection,
    external_id: &str,
    direction: Direction,
    holder: &str,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO idempotency_record
         (external_id, direction, holder, processed, response, created_at)
         VALUES (?1, ?2, ?3, 0, NULL, ?4)",
    )
    .bind(external_id)
    .bind(direction.as_str())
    .bind(holder)
    .bind(encode_ts(now))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 1 {
        return Ok(ClaimOutcome::Claimed);
    }

    let existing: Option<IdempotencyRow> = sqlx::query_as(
        "SELECT * FROM idempotency_record WHERE external_id = ?1 AND direction = ?2",
    )
    .bind(external_id)
    .bind(direction.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match existing {
        Some(row) if row.processed == 0 && row.holder.as_deref() == Some(holder) => {
            Ok(ClaimOutcome::Claimed)
        }
        _ => Ok(ClaimOutcome::AlreadyProcessed),
    }
}
