//! `JobRepo` queue operations.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use kabanda::models::job::{JobKind, JobStatus, ScheduledJob};
use kabanda::persistence::{db, job_repo::JobRepo};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap()
}

async fn repo() -> JobRepo {
    JobRepo::new(Arc::new(db::connect_memory().await.expect("db")))
}

#[tokio::test]
async fn insert_persists_chain_and_payload() {
    let repo = repo().await;
    let job = ScheduledJob::new(JobKind::Escalation, Some("t-1".into()), now())
        .with_chain(3, 4)
        .with_payload(serde_json::json!({"note": "x"}));
    repo.insert(&job).await.expect("insert");

    let stored = repo.get_by_id(&job.id).await.expect("get").expect("job");

    assert_eq!(stored.kind, JobKind::Escalation);
    assert_eq!(stored.task_id.as_deref(), Some("t-1"));
    assert_eq!(stored.step, 3);
    assert_eq!(stored.expected_count, Some(4));
    assert_eq!(stored.payload, Some(serde_json::json!({"note": "x"})));
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.fire_at, now());
}

#[tokio::test]
async fn due_jobs_oldest_first_and_limited() {
    let repo = repo().await;
    for offset in [10, 0, 5, 60] {
        let job = ScheduledJob::new(
            JobKind::ReminderDispatch,
            Some(format!("t-{offset}")),
            now() + Duration::minutes(offset),
        );
        repo.insert(&job).await.expect("insert");
    }

    let due = repo.list_due(now() + Duration::minutes(10), 10).await.expect("due");
    let tasks: Vec<_> = due.iter().filter_map(|j| j.task_id.as_deref()).collect();
    assert_eq!(tasks, ["t-0", "t-5", "t-10"]);

    let limited = repo.list_due(now() + Duration::minutes(10), 2).await.expect("due");
    assert_eq!(limited.len(), 2);
    assert_eq!(repo.next_fire_at().await.expect("next"), Some(now()));
}

#[tokio::test]
async fn claim_is_exclusive() {
    let repo = repo().await;
    let job = ScheduledJob::new(JobKind::ReminderDispatch, Some("t-1".into()), now());
    repo.insert(&job).await.expect("insert");

    assert!(repo.claim(&job.id, now()).await.expect("claim"));
    assert!(!repo.claim(&job.id, now()).await.expect("claim"));
    assert!(repo.list_due(now(), 10).await.expect("due").is_empty());
    assert_eq!(repo.count_with_status(JobStatus::Running).await.expect("count"), 1);
}

#[tokio::test]
async fn retry_requeues_with_attempt_and_error() {
    let repo = repo().await;
    let job = ScheduledJob::new(JobKind::ReminderDispatch, Some("t-1".into()), now());
    repo.insert(&job).await.expect("insert");
    repo.claim(&job.id, now()).await.expect("claim");

    let later = now() + Duration::minutes(5);
    repo.schedule_retry(&job.id, later, "channel: down", now())
        .await
        .expect("retry");

    let stored = repo.get_by_id(&job.id).await.expect("get").expect("job");
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.attempt, 1);
    assert_eq!(stored.fire_at, later);
    assert_eq!(stored.last_error.as_deref(), Some("channel: down"));
}

#[tokio::test]
async fn finish_states() {
    let repo = repo().await;
    let ok = ScheduledJob::new(JobKind::MessageIntake, None, now());
    let bad = ScheduledJob::new(JobKind::MessageIntake, None, now());
    repo.insert(&ok).await.expect("insert");
    repo.insert(&bad).await.expect("insert");

    repo.mark_done(&ok.id, now()).await.expect("done");
    repo.mark_failed(&bad.id, "invalid input: empty", now()).await.expect("failed");

    assert_eq!(repo.count_with_status(JobStatus::Done).await.expect("count"), 1);
    let failed = repo.get_by_id(&bad.id).await.expect("get").expect("job");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("invalid input: empty"));
}

#[tokio::test]
async fn requeue_running_recovers_interrupted_work() {
    let repo = repo().await;
    let job = ScheduledJob::new(JobKind::ReminderDispatch, Some("t-1".into()), now());
    repo.insert(&job).await.expect("insert");
    repo.claim(&job.id, now()).await.expect("claim");

    assert_eq!(repo.requeue_running(now()).await.expect("requeue"), 1);
    assert_eq!(repo.list_due(now(), 10).await.expect("due").len(), 1);
}

#[tokio::test]
async fn purge_only_touches_finished_jobs() {
    let repo = repo().await;
    let done = ScheduledJob::new(JobKind::MessageIntake, None, now());
    let queued = ScheduledJob::new(JobKind::ReminderDispatch, Some("t-1".into()), now());
    repo.insert(&done).await.expect("insert");
    repo.insert(&queued).await.expect("insert");
    repo.mark_done(&done.id, now()).await.expect("done");

    let purged = repo
        .purge_finished_before(now() + Duration::days(1))
        .await
        .expect("purge");

    assert_eq!(purged, 1);
    assert!(repo.get_by_id(&queued.id).await.expect("get").is_some());
}
