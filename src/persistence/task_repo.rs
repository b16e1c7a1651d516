//! Task repository for `SQLite` persistence.
//!
//! Every state change is a conditional update: the `WHERE` clause carries
//! the state the caller observed, and the returned flag reports whether
//! the row still matched. Concurrent jobs racing on one task therefore
//! see exactly one winner.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::task::{Priority, Task, TaskLocation, TaskStatus};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_count, decode_opt_ts, decode_ts, encode_ts, Transaction};

const NON_TERMINAL: &str = "status NOT IN ('completed', 'cancelled')";

/// Repository wrapper around `SQLite` for task records.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    owner_id: String,
    title: String,
    description: String,
    priority: String,
    status: String,
    due_at: String,
    snoozed_until: Option<String>,
    reminder_count: i64,
    last_reminded_at: Option<String>,
    completed_at: Option<String>,
    batch_id: Option<String>,
    location: Option<String>,
    source_message: String,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let location: Option<TaskLocation> = self
            .location
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid location: {e}")))?;

        Ok(Task {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            priority: parse_priority(&self.priority)?,
            status: parse_status(&self.status)?,
            due_at: decode_ts(&self.due_at, "due_at")?,
            snoozed_until: decode_opt_ts(self.snoozed_until.as_deref(), "snoozed_until")?,
            reminder_count: decode_count(self.reminder_count, "reminder_count")?,
            last_reminded_at: decode_opt_ts(self.last_reminded_at.as_deref(), "last_reminded_at")?,
            completed_at: decode_opt_ts(self.completed_at.as_deref(), "completed_at")?,
            batch_id: self.batch_id,
            location,
            source_message: self.source_message,
            created_at: decode_ts(&self.created_at, "created_at")?,
            updated_at: decode_ts(&self.updated_at, "updated_at")?,
        })
    }
}

fn parse_priority(s: &str) -> Result<Priority> {
    match s {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "urgent" => Ok(Priority::Urgent),
        other => Err(AppError::Db(format!("invalid task priority: {other}"))),
    }
}

fn priority_str(p: Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        "snoozed" => Ok(TaskStatus::Snoozed),
        other => Err(AppError::Db(format!("invalid task status: {other}"))),
    }
}

/// Column value for a task status.
#[must_use]
pub fn status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Cancelled => "cancelled",
        TaskStatus::Snoozed => "snoozed",
    }
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new task record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, task: &Task) -> Result<Task> {
        insert_task(self.db.as_ref(), task).await?;
        Ok(task.clone())
    }

    /// Insert a new task record as part of `tx`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create_in(&self, tx: &mut Transaction<'_>, task: &Task) -> Result<Task> {
        insert_task(&mut **tx, task).await?;
        Ok(task.clone())
    }

    /// Retrieve a task by its ID.
    ///
    /// Returns `Ok(None)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM task WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(TaskRow::into_task).transpose()
    }

    /// Most recently created non-terminal task for an owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn most_recent_open(&self, owner_id: &str) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT * FROM task WHERE owner_id = ?1 AND {NON_TERMINAL} \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(owner_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(TaskRow::into_task).transpose()
    }

    /// Most recently created task for an owner in the given status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn most_recent_with_status(
        &self,
        owner_id: &str,
        status: TaskStatus,
    ) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT * FROM task WHERE owner_id = ?1 AND status = ?2 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(owner_id)
        .bind(status_str(status))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(TaskRow::into_task).transpose()
    }

    /// Pending tasks for an owner due in `[from, until)`, earliest first.
    ///
    /// `until = None` means no upper bound.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_pending_due_between(
        &self,
        owner_id: &str,
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = if let Some(until) = until {
            sqlx::query_as(
                "SELECT * FROM task WHERE owner_id = ?1 AND status = 'pending' \
                 AND due_at >= ?2 AND due_at < ?3 ORDER BY due_at ASC",
            )
            .bind(owner_id)
            .bind(encode_ts(from))
            .bind(encode_ts(until))
            .fetch_all(self.db.as_ref())
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM task WHERE owner_id = ?1 AND status = 'pending' \
                 AND due_at >= ?2 ORDER BY due_at ASC",
            )
            .bind(owner_id)
            .bind(encode_ts(from))
            .fetch_all(self.db.as_ref())
            .await?
        };

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// All tasks created from one batch, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM task WHERE batch_id = ?1 ORDER BY created_at ASC")
                .bind(batch_id)
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Move a task from `expected` to `next`.
    ///
    /// Terminal rows never match. Entering `Completed` stamps
    /// `completed_at`; leaving `Snoozed` clears `snoozed_until`.
    ///
    /// Returns `true` when the row matched and was updated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn transition(
        &self,
        id: &str,
        expected: TaskStatus,
        next: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if expected.is_terminal() {
            return Ok(false);
        }
        let completed_at = (next == TaskStatus::Completed).then(|| encode_ts(now));
        let result = sqlx::query(
            "UPDATE task SET status = ?1, updated_at = ?2,
                 completed_at = COALESCE(?3, completed_at),
                 snoozed_until = CASE WHEN ?1 = 'snoozed' THEN snoozed_until ELSE NULL END
             WHERE id = ?4 AND status = ?5",
        )
        .bind(status_str(next))
        .bind(encode_ts(now))
        .bind(completed_at)
        .bind(id)
        .bind(status_str(expected))
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Snooze a non-terminal task until `until`.
    ///
    /// Returns `true` when the task was still open and is now snoozed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if `until` is not after `now`, or
    /// `AppError::Db` if the update fails.
    pub async fn snooze(&self, id: &str, until: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        if until <= now {
            return Err(AppError::InvalidInput("snooze must end in the future".into()));
        }
        let result = sqlx::query(&format!(
            "UPDATE task SET status = 'snoozed', snoozed_until = ?1, updated_at = ?2 \
             WHERE id = ?3 AND {NON_TERMINAL}"
        ))
        .bind(encode_ts(until))
        .bind(encode_ts(now))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Return an elapsed snooze to `Pending`.
    ///
    /// Returns `true` if the task was snoozed with a past `snoozed_until`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn wake_from_snooze(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let now_s = encode_ts(now);
        let result = sqlx::query(
            "UPDATE task SET status = 'pending', snoozed_until = NULL, updated_at = ?1 \
             WHERE id = ?2 AND status = 'snoozed' AND snoozed_until <= ?1",
        )
        .bind(&now_s)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Move an open task to a new due time, ending any snooze.
    ///
    /// Returns the updated task, or `None` if it became terminal meanwhile.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn reschedule(
        &self,
        id: &str,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let result = sqlx::query(&format!(
            "UPDATE task SET due_at = ?1, updated_at = ?2, snoozed_until = NULL,
                 status = CASE WHEN status = 'snoozed' THEN 'pending' ELSE status END
             WHERE id = ?3 AND {NON_TERMINAL}"
        ))
        .bind(encode_ts(due_at))
        .bind(encode_ts(now))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    /// Record a delivered reminder: bump the count from `expected_count`.
    ///
    /// Returns `false` when another delivery already advanced the count or
    /// the task became terminal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn record_reminder_sent(
        &self,
        id: &str,
        expected_count: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now_s = encode_ts(now);
        let result = sqlx::query(&format!(
            "UPDATE task SET reminder_count = reminder_count + 1, last_reminded_at = ?1, \
             updated_at = ?1 WHERE id = ?2 AND reminder_count = ?3 AND {NON_TERMINAL}"
        ))
        .bind(&now_s)
        .bind(id)
        .bind(i64::from(expected_count))
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

async fn insert_task<'e, E>(executor: E, task: &Task) -> Result<()>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let location = task
        .location
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::Db(format!("serialize location: {e}")))?;

    sqlx::query(
        "INSERT INTO task (id, owner_id, title, description, priority, status, due_at,
         snoozed_until, reminder_count, last_reminded_at, completed_at, batch_id,
         location, source_message, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )
    .bind(&task.id)
    .bind(&task.owner_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(priority_str(task.priority))
    .bind(status_str(task.status))
    .bind(encode_ts(task.due_at))
    .bind(task.snoozed_until.map(encode_ts))
    .bind(i64::from(task.reminder_count))
    .bind(task.last_reminded_at.map(encode_ts))
    .bind(task.completed_at.map(encode_ts))
    .bind(&task.batch_id)
    .bind(&location)
    .bind(&task.source_message)
    .bind(encode_ts(task.created_at))
    .bind(encode_ts(task.updated_at))
    .execute(executor)
    .await?;
    Ok(())
}
