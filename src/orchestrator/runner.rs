//! Job runner: claims due jobs and executes them on a bounded pool.
//!
//! The runner sweeps `scheduled_job` on a coarse interval and whenever
//! the [`Scheduler`] signals a new job. Each due job is claimed with a
//! conditional update before it runs, so overlapping sweeps never run
//! one job twice. Failures are retried according to the job kind's
//! [`RetryPolicy`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SchedulerConfig;
use crate::models::job::ScheduledJob;
use crate::persistence::job_repo::JobRepo;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::{AppError, Result};

use super::retry::RetryPolicy;
use super::scheduler::Scheduler;

/// Maximum jobs pulled from storage in one sweep.
const SWEEP_BATCH: u32 = 64;

/// Executes the body of a claimed job.
pub trait JobHandler: Send + Sync {
    /// Run `job` as of `now`.
    ///
    /// # Errors
    ///
    /// Any error; retryable ones (see [`AppError::is_retryable`]) are
    /// retried per the job kind's policy.
    fn handle<'a>(
        &'a self,
        job: &'a ScheduledJob,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Result of one job execution, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// Body succeeded.
    Done,
    /// Body failed and was requeued.
    Retrying {
        /// When the next attempt fires.
        fire_at: DateTime<Utc>,
    },
    /// Body failed permanently or ran out of retries.
    Abandoned,
    /// Another sweep claimed the job first.
    NotClaimed,
}

/// Sweeps and executes due jobs.
#[derive(Clone)]
pub struct JobRunner {
    jobs: JobRepo,
    reminders: ReminderRepo,
    handler: Arc<dyn JobHandler>,
    wake: Arc<Notify>,
    poll_interval: Duration,
    workers: Arc<Semaphore>,
}

impl JobRunner {
    /// Create a runner over the scheduler's job storage.
    #[must_use]
    pub fn new(
        scheduler: &Scheduler,
        handler: Arc<dyn JobHandler>,
        config: &SchedulerConfig,
    ) -> Self {
        let workers = usize::try_from(config.workers).unwrap_or(1).max(1);
        Self {
            jobs: scheduler.jobs().clone(),
            reminders: ReminderRepo::new(Arc::clone(scheduler.database())),
            handler,
            wake: scheduler.wake_signal(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            workers: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Requeue jobs left `running` by a previous process.
    ///
    /// Reminder attempts that process left mid-send are failed first, so
    /// the requeued dispatch jobs can claim their slots again.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either update fails.
    pub async fn recover(&self, now: DateTime<Utc>) -> Result<u64> {
        let interrupted = self.reminders.fail_interrupted(now).await?;
        if interrupted > 0 {
            warn!(interrupted, "failed reminder attempts cut off mid-send");
        }
        let requeued = self.jobs.requeue_running(now).await?;
        if requeued > 0 {
            warn!(requeued, "requeued jobs interrupted by a previous shutdown");
        }
        Ok(requeued)
    }

    /// Execute every job due at `now` and wait for all of them.
    ///
    /// Returns how many jobs this sweep executed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the due jobs cannot be listed. Failures of
    /// individual jobs are handled by the retry policy, not returned.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.jobs.list_due(now, SWEEP_BATCH).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "sweeping due jobs");

        let mut running = JoinSet::new();
        for job in due {
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|err| AppError::Io(format!("worker pool closed: {err}")))?;
            let runner = self.clone();
            running.spawn(async move {
                let result = runner.execute(job, now).await;
                drop(permit);
                result
            });
        }

        let mut executed = 0;
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(Ok(JobResult::NotClaimed)) => {}
                Ok(Ok(_)) => executed += 1,
                Ok(Err(err)) => error!(%err, "job bookkeeping failed"),
                Err(err) => error!(%err, "job task panicked"),
            }
        }
        Ok(executed)
    }

    /// Claim and run a single job, then record its outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if claiming or recording the outcome fails.
    pub async fn execute(&self, job: ScheduledJob, now: DateTime<Utc>) -> Result<JobResult> {
        if !self.jobs.claim(&job.id, now).await? {
            return Ok(JobResult::NotClaimed);
        }
        let span = info_span!(
            "job",
            job_id = %job.id,
            kind = job.kind.as_str(),
            attempt = job.attempt
        );

        async {
            match self.handler.handle(&job, now).await {
                Ok(()) => {
                    self.jobs.mark_done(&job.id, now).await?;
                    debug!("job done");
                    Ok(JobResult::Done)
                }
                Err(err) => self.fail(&job, &err, now).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn fail(
        &self,
        job: &ScheduledJob,
        err: &AppError,
        now: DateTime<Utc>,
    ) -> Result<JobResult> {
        let policy = RetryPolicy::for_kind(job.kind);
        let delay = err
            .is_retryable()
            .then(|| policy.next_delay(job.attempt))
            .flatten();

        if let Some(delay) = delay {
            let fire_at = now + delay;
            self.jobs
                .schedule_retry(&job.id, fire_at, &err.to_string(), now)
                .await?;
            warn!(%err, %fire_at, "job failed, retry scheduled");
            return Ok(JobResult::Retrying { fire_at });
        }

        self.jobs.mark_failed(&job.id, &err.to_string(), now).await?;
        error!(%err, retryable = err.is_retryable(), "job abandoned");
        Ok(JobResult::Abandoned)
    }

    /// Spawn the sweep loop.
    ///
    /// On cancellation the loop stops claiming; jobs of the sweep in
    /// progress run to completion first.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                let mut interval = tokio::time::interval(self.poll_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("job runner shutting down");
                            break;
                        }
                        _ = interval.tick() => {}
                        () = self.wake.notified() => {}
                    }
                    if let Err(err) = self.run_due(Utc::now()).await {
                        error!(%err, "job sweep failed");
                    }
                }
            }
            .instrument(info_span!("job_runner")),
        )
    }
}
