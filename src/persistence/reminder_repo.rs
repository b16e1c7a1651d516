//! Reminder attempt repository.
//!
//! A reminder row doubles as the send slot for a task's next reminder:
//! the partial unique index on `(task_id, sequence)` admits one live
//! attempt per sequence number, so two jobs racing for the same reminder
//! cannot both be allowed to send.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::reminder::{Reminder, ReminderStatus};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_count, decode_opt_ts, decode_ts, encode_ts};

/// Error recorded on attempts cut off by a shutdown mid-send.
pub const INTERRUPTED: &str = "interrupted";

/// Repository wrapper around `SQLite` for reminder records.
#[derive(Clone)]
pub struct ReminderRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: String,
    task_id: String,
    sequence: i64,
    channel: String,
    status: String,
    scheduled_at: String,
    sent_at: Option<String>,
    acknowledged_at: Option<String>,
    message_content: String,
    error_message: Option<String>,
    channel_message_id: Option<String>,
}

impl ReminderRow {
    fn into_reminder(self) -> Result<Reminder> {
        Ok(Reminder {
            id: self.id,
            task_id: self.task_id,
            sequence: decode_count(self.sequence, "sequence")?,
            channel: self.channel,
            status: parse_status(&self.status)?,
            scheduled_at: decode_ts(&self.scheduled_at, "scheduled_at")?,
            sent_at: decode_opt_ts(self.sent_at.as_deref(), "sent_at")?,
            acknowledged_at: decode_opt_ts(self.acknowledged_at.as_deref(), "acknowledged_at")?,
            message_content: self.message_content,
            error_message: self.error_message,
            channel_message_id: self.channel_message_id,
        })
    }
}

fn parse_status(s: &str) -> Result<ReminderStatus> {
    match s {
        "scheduled" => Ok(ReminderStatus::Scheduled),
        "sent" => Ok(ReminderStatus::Sent),
        "delivered" => Ok(ReminderStatus::Delivered),
        "failed" => Ok(ReminderStatus::Failed),
        "acknowledged" => Ok(ReminderStatus::Acknowledged),
        other => Err(AppError::Db(format!("invalid reminder status: {other}"))),
    }
}

fn status_str(s: ReminderStatus) -> &'static str {
    match s {
        ReminderStatus::Scheduled => "scheduled",
        ReminderStatus::Sent => "sent",
        ReminderStatus::Delivered => "delivered",
        ReminderStatus::Failed => "failed",
        ReminderStatus::Acknowledged => "acknowledged",
    }
}

impl ReminderRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Claim the send slot for `reminder.sequence`.
    ///
    /// Returns `true` when this attempt now owns the slot. `false` means a
    /// live attempt with the same sequence already exists and the caller
    /// must not send.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn claim_slot(&self, reminder: &Reminder) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO reminder (id, task_id, sequence, channel, status,
             scheduled_at, sent_at, acknowledged_at, message_content, error_message,
             channel_message_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&reminder.id)
        .bind(&reminder.task_id)
        .bind(i64::from(reminder.sequence))
        .bind(&reminder.channel)
        .bind(status_str(reminder.status))
        .bind(encode_ts(reminder.scheduled_at))
        .bind(reminder.sent_at.map(encode_ts))
        .bind(reminder.acknowledged_at.map(encode_ts))
        .bind(&reminder.message_content)
        .bind(&reminder.error_message)
        .bind(&reminder.channel_message_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record channel acceptance of an attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_sent(
        &self,
        id: &str,
        channel_message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE reminder SET status = 'sent', sent_at = ?1, channel_message_id = ?2 \
             WHERE id = ?3",
        )
        .bind(encode_ts(now))
        .bind(channel_message_id)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Record a failed attempt. Failed rows free the slot for a retry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE reminder SET status = 'failed', error_message = ?1 WHERE id = ?2")
            .bind(error)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Fail attempts still `scheduled` that were claimed at or before
    /// `before`.
    ///
    /// A `scheduled` row only exists while a send is in flight, so one
    /// that outlives its process blocks its slot forever. Failing it keeps
    /// the row for the audit trail and frees the sequence for a retry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn fail_interrupted(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE reminder SET status = 'failed', error_message = ?1 \
             WHERE status = 'scheduled' AND scheduled_at <= ?2",
        )
        .bind(INTERRUPTED)
        .bind(encode_ts(before))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark the newest sent reminder of a task as acknowledged.
    ///
    /// Returns `true` if a reminder was acknowledged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn acknowledge_latest(&self, task_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reminder SET status = 'acknowledged', acknowledged_at = ?1
             WHERE id = (
                 SELECT id FROM reminder
                 WHERE task_id = ?2 AND status IN ('sent', 'delivered')
                 ORDER BY sequence DESC LIMIT 1
             )",
        )
        .bind(encode_ts(now))
        .bind(task_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// All attempts for a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_task(&self, task_id: &str) -> Result<Vec<Reminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT * FROM reminder WHERE task_id = ?1 ORDER BY sequence ASC, scheduled_at ASC",
        )
        .bind(task_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ReminderRow::into_reminder).collect()
    }
}
