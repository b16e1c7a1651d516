//! Job runner: claiming, retry budgets and startup recovery.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use kabanda::models::job::{JobKind, JobStatus, ScheduledJob};
use kabanda::orchestrator::runner::{JobHandler, JobResult, JobRunner};
use kabanda::orchestrator::scheduler::Scheduler;
use kabanda::persistence::db;
use kabanda::{AppError, Result};

use super::test_helpers::{morning, test_config};

/// Handler failing with a fixed error kind a set number of times.
struct Flaky {
    failures: AtomicU32,
    retryable: bool,
    runs: AtomicU32,
}

impl Flaky {
    fn new(failures: u32, retryable: bool) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            retryable,
            runs: AtomicU32::new(0),
        }
    }
}

impl JobHandler for Flaky {
    fn handle<'a>(
        &'a self,
        _job: &'a ScheduledJob,
        _now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            match (failing, self.retryable) {
                (false, _) => Ok(()),
                (true, true) => Err(AppError::Channel("down".into())),
                (true, false) => Err(AppError::NotFound("task gone".into())),
            }
        })
    }
}

async fn setup(handler: Arc<Flaky>) -> (Scheduler, JobRunner) {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let scheduler = Scheduler::new(database);
    let runner = JobRunner::new(
        &scheduler,
        handler as Arc<dyn JobHandler>,
        &test_config().scheduler,
    );
    (scheduler, runner)
}

async fn status(scheduler: &Scheduler, id: &str) -> ScheduledJob {
    scheduler
        .jobs()
        .get_by_id(id)
        .await
        .expect("lookup")
        .expect("job")
}

#[tokio::test]
async fn dispatch_retries_every_five_minutes() {
    let handler = Arc::new(Flaky::new(2, true));
    let (scheduler, runner) = setup(Arc::clone(&handler)).await;
    let job = scheduler
        .schedule_dispatch("t-1", morning(), 0)
        .await
        .expect("schedule");

    let first = runner.execute(job.clone(), morning()).await.expect("execute");
    assert_eq!(
        first,
        JobResult::Retrying {
            fire_at: morning() + Duration::minutes(5)
        }
    );
    let stored = status(&scheduler, &job.id).await;
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.attempt, 1);
    assert_eq!(stored.last_error.as_deref(), Some("channel: down"));

    assert_eq!(runner.run_due(morning() + Duration::minutes(4)).await.expect("sweep"), 0);
    assert_eq!(runner.run_due(morning() + Duration::minutes(5)).await.expect("sweep"), 1);
    assert_eq!(runner.run_due(morning() + Duration::minutes(10)).await.expect("sweep"), 1);

    assert_eq!(status(&scheduler, &job.id).await.status, JobStatus::Done);
    assert_eq!(handler.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn intake_gives_up_after_three_retries() {
    let handler = Arc::new(Flaky::new(u32::MAX, true));
    let (scheduler, runner) = setup(Arc::clone(&handler)).await;
    let job = scheduler
        .schedule_intake(serde_json::json!({}), morning())
        .await
        .expect("schedule");

    let mut now = morning();
    for expected_delay in [60, 120, 240] {
        runner.run_due(now).await.expect("sweep");
        let stored = status(&scheduler, &job.id).await;
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.fire_at, now + Duration::seconds(expected_delay));
        now = stored.fire_at;
    }
    runner.run_due(now).await.expect("sweep");

    let stored = status(&scheduler, &job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.attempt, 3);
    assert_eq!(handler.runs.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn escalation_is_never_retried() {
    let handler = Arc::new(Flaky::new(1, true));
    let (scheduler, runner) = setup(handler).await;
    let job = scheduler
        .schedule_escalation("t-1", morning(), 1, 2)
        .await
        .expect("schedule");

    let result = runner.execute(job.clone(), morning()).await.expect("execute");

    assert_eq!(result, JobResult::Abandoned);
    assert_eq!(status(&scheduler, &job.id).await.status, JobStatus::Failed);
}

#[tokio::test]
async fn permanent_error_is_not_retried() {
    let handler = Arc::new(Flaky::new(1, false));
    let (scheduler, runner) = setup(handler).await;
    let job = scheduler
        .schedule_dispatch("t-1", morning(), 0)
        .await
        .expect("schedule");

    let result = runner.execute(job.clone(), morning()).await.expect("execute");

    assert_eq!(result, JobResult::Abandoned);
    let stored = status(&scheduler, &job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("not found: task gone"));
}

#[tokio::test]
async fn claimed_job_runs_once() {
    let handler = Arc::new(Flaky::new(0, true));
    let (scheduler, runner) = setup(Arc::clone(&handler)).await;
    let job = scheduler
        .schedule_at(ScheduledJob::dispatch("t-1", morning(), 0))
        .await
        .expect("schedule");

    let first = runner.execute(job.clone(), morning()).await.expect("execute");
    let second = runner.execute(job, morning()).await.expect("execute");

    assert_eq!(first, JobResult::Done);
    assert_eq!(second, JobResult::NotClaimed);
    assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scheduling_helpers_persist_and_wake_the_runner() {
    let handler = Arc::new(Flaky::new(0, true));
    let (scheduler, _runner) = setup(handler).await;
    let wake = scheduler.wake_signal();

    let job = scheduler
        .schedule_escalation("t-1", morning(), 2, 3)
        .await
        .expect("schedule");

    tokio::time::timeout(std::time::Duration::from_millis(100), wake.notified())
        .await
        .expect("runner woken");
    let stored = status(&scheduler, &job.id).await;
    assert_eq!(stored.kind, JobKind::Escalation);
    assert_eq!(stored.task_id.as_deref(), Some("t-1"));
    assert_eq!((stored.step, stored.expected_count), (2, Some(3)));
}

#[tokio::test]
async fn future_jobs_wait_for_their_time() {
    let handler = Arc::new(Flaky::new(0, true));
    let (scheduler, runner) = setup(Arc::clone(&handler)).await;
    scheduler
        .schedule_dispatch("t-1", morning() + Duration::hours(1), 0)
        .await
        .expect("schedule");

    assert_eq!(runner.run_due(morning()).await.expect("sweep"), 0);
    assert_eq!(
        scheduler.jobs().next_fire_at().await.expect("next"),
        Some(morning() + Duration::hours(1))
    );
    assert_eq!(runner.run_due(morning() + Duration::hours(1)).await.expect("sweep"), 1);
}

#[tokio::test]
async fn recover_requeues_interrupted_jobs() {
    let handler = Arc::new(Flaky::new(0, true));
    let (scheduler, runner) = setup(Arc::clone(&handler)).await;
    let job = scheduler
        .schedule_dispatch("t-1", morning(), 0)
        .await
        .expect("schedule");
    // Simulate a crash after the claim.
    assert!(scheduler.jobs().claim(&job.id, morning()).await.expect("claim"));
    assert_eq!(runner.run_due(morning()).await.expect("sweep"), 0);

    let later = morning() + Duration::minutes(1);
    assert_eq!(runner.recover(later).await.expect("recover"), 1);
    assert_eq!(runner.run_due(later).await.expect("sweep"), 1);

    assert_eq!(status(&scheduler, &job.id).await.status, JobStatus::Done);
    assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
}
