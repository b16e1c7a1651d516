//! Scheduled job repository.
//!
//! Jobs move `queued → running → done | failed`, or back to `queued`
//! with a later `fire_at` when a retry is scheduled. Claiming is a
//! conditional update, so a job is executed by at most one worker at a
//! time even when several sweeps overlap.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::job::{JobKind, JobStatus, ScheduledJob};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_count, decode_ts, encode_ts, Transaction};

/// Repository wrapper around `SQLite` for scheduled jobs.
#[derive(Clone)]
pub struct JobRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    task_id: Option<String>,
    payload: Option<String>,
    fire_at: String,
    attempt: i64,
    step: i64,
    expected_count: Option<i64>,
    status: String,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn into_job(self) -> Result<ScheduledJob> {
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid payload: {e}")))?;
        Ok(ScheduledJob {
            id: self.id,
            kind: parse_kind(&self.kind)?,
            task_id: self.task_id,
            payload,
            fire_at: decode_ts(&self.fire_at, "fire_at")?,
            attempt: decode_count(self.attempt, "attempt")?,
            step: decode_count(self.step, "step")?,
            expected_count: self
                .expected_count
                .map(|c| decode_count(c, "expected_count"))
                .transpose()?,
            status: parse_status(&self.status)?,
            last_error: self.last_error,
            created_at: decode_ts(&self.created_at, "created_at")?,
            updated_at: decode_ts(&self.updated_at, "updated_at")?,
        })
    }
}

fn parse_kind(s: &str) -> Result<JobKind> {
    match s {
        "message_intake" => Ok(JobKind::MessageIntake),
        "reminder_dispatch" => Ok(JobKind::ReminderDispatch),
        "escalation" => Ok(JobKind::Escalation),
        other => Err(AppError::Db(format!("invalid job kind: {other}"))),
    }
}

fn parse_status(s: &str) -> Result<JobStatus> {
    match s {
        "queued" => Ok(JobStatus::Queued),
        "running" => Ok(JobStatus::Running),
        "done" => Ok(JobStatus::Done),
        "failed" => Ok(JobStatus::Failed),
        other => Err(AppError::Db(format!("invalid job status: {other}"))),
    }
}

fn status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Done => "done",
        JobStatus::Failed => "failed",
    }
}

impl JobRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a queued job.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, job: &ScheduledJob) -> Result<ScheduledJob> {
        insert_job(self.db.as_ref(), job).await?;
        Ok(job.clone())
    }

    /// Persist a queued job as part of `tx`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert_in(
        &self,
        tx: &mut Transaction<'_>,
        job: &ScheduledJob,
    ) -> Result<ScheduledJob> {
        insert_job(&mut **tx, job).await?;
        Ok(job.clone())
    }

    /// Retrieve a job by ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ScheduledJob>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM scheduled_job WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// Queued jobs whose `fire_at` has passed, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ScheduledJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM scheduled_job WHERE status = 'queued' AND fire_at <= ?1 \
             ORDER BY fire_at ASC LIMIT ?2",
        )
        .bind(encode_ts(now))
        .bind(i64::from(limit))
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Earliest `fire_at` among queued jobs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn next_fire_at(&self) -> Result<Option<DateTime<Utc>>> {
        let next: Option<(String,)> = sqlx::query_as(
            "SELECT fire_at FROM scheduled_job WHERE status = 'queued' \
             ORDER BY fire_at ASC LIMIT 1",
        )
        .fetch_optional(self.db.as_ref())
        .await?;
        next.map(|(raw,)| decode_ts(&raw, "fire_at")).transpose()
    }

    /// Claim a queued job for execution.
    ///
    /// Returns `true` when this caller won the claim.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_job SET status = 'running', updated_at = ?1 \
             WHERE id = ?2 AND status = 'queued'",
        )
        .bind(encode_ts(now))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a running job finished.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_done(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.finish(id, JobStatus::Done, None, now).await
    }

    /// Mark a running job abandoned with its last error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<()> {
        self.finish(id, JobStatus::Failed, Some(error), now).await
    }

    async fn finish(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_job SET status = ?1, last_error = COALESCE(?2, last_error), \
             updated_at = ?3 WHERE id = ?4",
        )
        .bind(status_str(status))
        .bind(error)
        .bind(encode_ts(now))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Requeue a running job for another attempt at `fire_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn schedule_retry(
        &self,
        id: &str,
        fire_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_job SET status = 'queued', attempt = attempt + 1, fire_at = ?1, \
             last_error = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(encode_ts(fire_at))
        .bind(error)
        .bind(encode_ts(now))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Return jobs left `running` by a previous process to the queue.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn requeue_running(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scheduled_job SET status = 'queued', updated_at = ?1 WHERE status = 'running'",
        )
        .bind(encode_ts(now))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    /// All jobs targeting a task, by `fire_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_task(&self, task_id: &str) -> Result<Vec<ScheduledJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM scheduled_job WHERE task_id = ?1 ORDER BY fire_at ASC, created_at ASC",
        )
        .bind(task_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Count jobs in a status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_with_status(&self, status: JobStatus) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM scheduled_job WHERE status = ?1")
                .bind(status_str(status))
                .fetch_one(self.db.as_ref())
                .await?;
        u64::try_from(count).map_err(|_| AppError::Db(format!("invalid count: {count}")))
    }

    /// Delete finished jobs last touched before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM scheduled_job WHERE status IN ('done', 'failed') AND updated_at < ?1",
        )
        .bind(encode_ts(cutoff))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }
}

async fn insert_job<'e, E>(executor: E, job: &ScheduledJob) -> Result<()>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let payload = job
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::Db(format!("serialize payload: {e}")))?;
    sqlx::query(
        "INSERT INTO scheduled_job (id, kind, task_id, payload, fire_at, attempt, step,
         expected_count, status, last_error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(&job.id)
    .bind(job.kind.as_str())
    .bind(&job.task_id)
    .bind(payload)
    .bind(encode_ts(job.fire_at))
    .bind(i64::from(job.attempt))
    .bind(i64::from(job.step))
    .bind(job.expected_count.map(i64::from))
    .bind(status_str(job.status))
    .bind(&job.last_error)
    .bind(encode_ts(job.created_at))
    .bind(encode_ts(job.updated_at))
    .execute(executor)
    .await?;
    Ok(())
}
