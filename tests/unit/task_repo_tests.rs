//! `TaskRepo` persistence and compare-and-set transitions.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use kabanda::models::task::{Priority, Task, TaskLocation, TaskStatus};
use kabanda::persistence::{db, task_repo::TaskRepo};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
}

fn sample(owner: &str, title: &str, due: DateTime<Utc>) -> Task {
    Task::new(owner.into(), title.into(), due, format!("remind me to {title}"))
}

async fn repo() -> TaskRepo {
    TaskRepo::new(Arc::new(db::connect_memory().await.expect("db")))
}

#[tokio::test]
async fn create_persists_all_fields() {
    let repo = repo().await;
    let task = sample("o1", "dinner", at(19, 0))
        .with_priority(Priority::High)
        .with_description("with Sam")
        .with_batch(Some("b-1".into()))
        .with_location(Some(TaskLocation {
            name: "Cafe Javas".into(),
            address: Some("Kampala Road".into()),
            lat: Some(0.31),
            lng: Some(32.58),
        }));

    repo.create(&task).await.expect("create");
    let stored = repo.get_by_id(&task.id).await.expect("get").expect("task");

    assert_eq!(stored.title, "dinner");
    assert_eq!(stored.description, "with Sam");
    assert_eq!(stored.priority, Priority::High);
    assert_eq!(stored.status, TaskStatus::Pending);
    assert_eq!(stored.due_at, at(19, 0));
    assert_eq!(stored.batch_id.as_deref(), Some("b-1"));
    assert_eq!(stored.location, task.location);
    assert_eq!(stored.reminder_count, 0);
}

#[tokio::test]
async fn get_by_id_returns_none_for_missing() {
    let repo = repo().await;
    assert!(repo.get_by_id("nope").await.expect("query").is_none());
}

#[tokio::test]
async fn transition_applies_only_from_expected_status() {
    let repo = repo().await;
    let task = sample("o1", "call mom", at(8, 20));
    repo.create(&task).await.expect("create");

    let won = repo
        .transition(&task.id, TaskStatus::Pending, TaskStatus::Completed, at(8, 30))
        .await
        .expect("transition");
    let lost = repo
        .transition(&task.id, TaskStatus::Pending, TaskStatus::Cancelled, at(8, 31))
        .await
        .expect("transition");

    assert!(won);
    assert!(!lost);
    let stored = repo.get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.completed_at, Some(at(8, 30)));
}

#[tokio::test]
async fn terminal_states_never_reopen() {
    let repo = repo().await;
    let task = sample("o1", "call mom", at(8, 20));
    repo.create(&task).await.expect("create");
    repo.transition(&task.id, TaskStatus::Pending, TaskStatus::Cancelled, at(8, 0))
        .await
        .expect("cancel");

    let reopened = repo
        .transition(&task.id, TaskStatus::Cancelled, TaskStatus::Pending, at(8, 1))
        .await
        .expect("transition");
    let snoozed = repo
        .snooze(&task.id, at(9, 0), at(8, 1))
        .await
        .expect("snooze");

    assert!(!reopened);
    assert!(!snoozed);
    assert_eq!(
        repo.get_by_id(&task.id).await.expect("get").expect("task").status,
        TaskStatus::Cancelled
    );
}

#[tokio::test]
async fn snooze_and_wake() {
    let repo = repo().await;
    let task = sample("o1", "call mom", at(8, 20));
    repo.create(&task).await.expect("create");

    assert!(repo.snooze(&task.id, at(9, 0), at(8, 30)).await.expect("snooze"));
    let snoozed = repo.get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(snoozed.status, TaskStatus::Snoozed);
    assert!(snoozed.is_snoozed_at(at(8, 59)));

    assert!(!repo.wake_from_snooze(&task.id, at(8, 59)).await.expect("early"));
    assert!(repo.wake_from_snooze(&task.id, at(9, 0)).await.expect("wake"));
    let woken = repo.get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(woken.status, TaskStatus::Pending);
    assert_eq!(woken.snoozed_until, None);
}

#[tokio::test]
async fn snooze_must_end_in_future() {
    let repo = repo().await;
    let task = sample("o1", "call mom", at(8, 20));
    repo.create(&task).await.expect("create");

    assert!(repo.snooze(&task.id, at(8, 0), at(8, 0)).await.is_err());
}

#[tokio::test]
async fn reschedule_ends_snooze() {
    let repo = repo().await;
    let task = sample("o1", "call mom", at(8, 20));
    repo.create(&task).await.expect("create");
    repo.snooze(&task.id, at(9, 0), at(8, 30)).await.expect("snooze");

    let moved = repo
        .reschedule(&task.id, at(17, 0), at(8, 40))
        .await
        .expect("reschedule")
        .expect("open task");

    assert_eq!(moved.due_at, at(17, 0));
    assert_eq!(moved.status, TaskStatus::Pending);
    assert_eq!(moved.snoozed_until, None);
}

#[tokio::test]
async fn reminder_count_advances_once_per_expected_value() {
    let repo = repo().await;
    let task = sample("o1", "call mom", at(8, 20));
    repo.create(&task).await.expect("create");

    assert!(repo.record_reminder_sent(&task.id, 0, at(8, 20)).await.expect("first"));
    assert!(!repo.record_reminder_sent(&task.id, 0, at(8, 20)).await.expect("stale"));
    assert!(repo.record_reminder_sent(&task.id, 1, at(8, 30)).await.expect("second"));

    let stored = repo.get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(stored.reminder_count, 2);
    assert_eq!(stored.last_reminded_at, Some(at(8, 30)));
}

#[tokio::test]
async fn pending_window_is_half_open_and_sorted() {
    let repo = repo().await;
    for (title, due) in [("late", at(12, 0)), ("early", at(9, 0)), ("edge", at(10, 0))] {
        repo.create(&sample("o1", title, due)).await.expect("create");
    }
    repo.create(&sample("o2", "someone else", at(9, 30)))
        .await
        .expect("create");

    let listed = repo
        .list_pending_due_between("o1", at(9, 0), Some(at(12, 0)))
        .await
        .expect("list");
    let titles: Vec<_> = listed.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["early", "edge"]);

    let open_ended = repo
        .list_pending_due_between("o1", at(9, 0), None)
        .await
        .expect("list");
    assert_eq!(open_ended.len(), 3);
}

#[tokio::test]
async fn most_recent_lookups() {
    let repo = repo().await;
    let first = sample("o1", "first", at(9, 0));
    repo.create(&first).await.expect("create");
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = sample("o1", "second", at(8, 0));
    repo.create(&second).await.expect("create");

    let open = repo.most_recent_open("o1").await.expect("query").expect("task");
    assert_eq!(open.title, "second");

    repo.transition(&second.id, TaskStatus::Pending, TaskStatus::Completed, at(8, 5))
        .await
        .expect("complete");
    let open = repo.most_recent_open("o1").await.expect("query").expect("task");
    assert_eq!(open.title, "first");
    let done = repo
        .most_recent_with_status("o1", TaskStatus::Completed)
        .await
        .expect("query")
        .expect("task");
    assert_eq!(done.title, "second");
    assert!(repo.most_recent_open("o2").await.expect("query").is_none());
}

#[tokio::test]
async fn batch_members_in_creation_order() {
    let repo = repo().await;
    for title in ["buy milk", "gym"] {
        let task = sample("o1", title, at(17, 0)).with_batch(Some("b-1".into()));
        repo.create(&task).await.expect("create");
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let members = repo.list_by_batch("b-1").await.expect("list");
    let titles: Vec<_> = members.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["buy milk", "gym"]);
}
