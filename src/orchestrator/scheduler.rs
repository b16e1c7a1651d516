//! One-shot delayed job scheduling.
//!
//! Scheduling only persists a `scheduled_job` row and wakes the runner.
//! Re-scheduling a task never cancels jobs already queued for it: every
//! job re-validates task state when it fires.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::debug;

use crate::models::job::{JobKind, ScheduledJob};
use crate::persistence::db::Database;
use crate::persistence::job_repo::JobRepo;
use crate::persistence::Transaction;
use crate::Result;

/// Enqueues jobs and nudges the runner.
#[derive(Clone)]
pub struct Scheduler {
    db: Arc<Database>,
    jobs: JobRepo,
    wake: Arc<Notify>,
}

impl Scheduler {
    /// Create a scheduler over the shared database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            jobs: JobRepo::new(Arc::clone(&db)),
            db,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Persist `job` and wake the runner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the job cannot be persisted.
    pub async fn schedule_at(&self, job: ScheduledJob) -> Result<ScheduledJob> {
        let job = self.jobs.insert(&job).await?;
        log_scheduled(&job);
        self.wake();
        Ok(job)
    }

    /// Persist `job` inside `tx`.
    ///
    /// The runner is not woken; call [`Scheduler::wake`] once `tx` has
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the job cannot be persisted.
    pub async fn schedule_in(
        &self,
        tx: &mut Transaction<'_>,
        job: ScheduledJob,
    ) -> Result<ScheduledJob> {
        let job = self.jobs.insert_in(tx, &job).await?;
        log_scheduled(&job);
        Ok(job)
    }

    /// Enqueue the reminder for a task at `fire_at`.
    ///
    /// The job only sends if the task still has `expected_count` reminders
    /// when it fires, so duplicate jobs for one due time send once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the job cannot be persisted.
    pub async fn schedule_dispatch(
        &self,
        task_id: &str,
        fire_at: DateTime<Utc>,
        expected_count: u32,
    ) -> Result<ScheduledJob> {
        self.schedule_at(ScheduledJob::dispatch(task_id, fire_at, expected_count))
            .await
    }

    /// Enqueue escalation `step` for a task that must still have
    /// `expected_count` reminders when it fires.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the job cannot be persisted.
    pub async fn schedule_escalation(
        &self,
        task_id: &str,
        fire_at: DateTime<Utc>,
        step: u32,
        expected_count: u32,
    ) -> Result<ScheduledJob> {
        let job = ScheduledJob::new(JobKind::Escalation, Some(task_id.to_owned()), fire_at)
            .with_chain(step, expected_count);
        self.schedule_at(job).await
    }

    /// Enqueue an inbound message for immediate processing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the job cannot be persisted.
    pub async fn schedule_intake(
        &self,
        payload: serde_json::Value,
        fire_at: DateTime<Utc>,
    ) -> Result<ScheduledJob> {
        self.schedule_at(ScheduledJob::intake(payload, fire_at)).await
    }

    /// Nudge the runner to sweep now.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Database the jobs live in.
    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Job storage shared with the runner.
    #[must_use]
    pub fn jobs(&self) -> &JobRepo {
        &self.jobs
    }

    /// Signal fired whenever a job is enqueued.
    #[must_use]
    pub fn wake_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }
}

fn log_scheduled(job: &ScheduledJob) {
    debug!(
        job_id = %job.id,
        kind = job.kind.as_str(),
        task_id = job.task_id.as_deref().unwrap_or(""),
        fire_at = %job.fire_at,
        "job scheduled"
    );
}
