//! Reminder dispatch: due-time delivery, duplicates, stale jobs and
//! closed tasks.

use chrono::Duration;

use kabanda::channel::Button;
use kabanda::models::job::JobStatus;
use kabanda::models::reminder::{Reminder, ReminderStatus};
use kabanda::models::task::TaskStatus;
use kabanda::persistence::reminder_repo::INTERRUPTED;
use kabanda::router::format::NOTHING_TO_MODIFY;

use super::test_helpers::{harness, morning, CHAT};

#[tokio::test]
async fn reminder_fires_at_due_time_with_buttons() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    let task = h.latest_task().await;

    assert_eq!(h.drain(morning() + Duration::minutes(19)).await, 0);
    assert_eq!(h.drain(morning() + Duration::minutes(20)).await, 1);

    let sent = h.channel.last();
    assert_eq!(sent.chat_id, CHAT);
    assert_eq!(sent.text, "🔔 Reminder: call mom");
    let payloads: Vec<&str> = sent.buttons.iter().map(|b: &Button| b.payload.as_str()).collect();
    assert_eq!(
        payloads,
        vec![
            format!("complete_{}", task.id),
            format!("snooze_{}", task.id),
            format!("delete_{}", task.id),
        ]
    );

    let task = h.tasks().get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(task.reminder_count, 1);
    assert_eq!(task.last_reminded_at, Some(morning() + Duration::minutes(20)));
    assert_eq!(task.status, TaskStatus::Pending);

    let attempts = h.reminders().list_for_task(&task.id).await.expect("list");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].sequence, 1);
    assert_eq!(attempts[0].status, ReminderStatus::Sent);
    assert_eq!(attempts[0].channel, "test");

    // A first reminder does not start an escalation chain.
    let jobs = h.state.scheduler.jobs().list_for_task(&task.id).await.expect("jobs");
    assert!(jobs.iter().all(|j| j.status == JobStatus::Done));
}

#[tokio::test]
async fn duplicate_dispatch_jobs_send_once() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    let task = h.latest_task().await;
    let due = morning() + Duration::minutes(20);
    for _ in 0..2 {
        h.state
            .scheduler
            .schedule_dispatch(&task.id, due, 0)
            .await
            .expect("schedule");
    }

    h.drain(due).await;

    let reminders: Vec<String> = h
        .channel
        .texts()
        .into_iter()
        .filter(|t| t.starts_with("🔔"))
        .collect();
    assert_eq!(reminders, vec!["🔔 Reminder: call mom".to_owned()]);
    let task = h.tasks().get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(task.reminder_count, 1);
}

#[tokio::test]
async fn send_cut_off_by_shutdown_is_retried_after_recovery() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    let task = h.latest_task().await;
    let due = morning() + Duration::minutes(20);
    let jobs = h.state.scheduler.jobs();
    let job = jobs
        .list_for_task(&task.id)
        .await
        .expect("jobs")
        .pop()
        .expect("dispatch job");

    // The previous process claimed the job and the slot, then died.
    assert!(jobs.claim(&job.id, due).await.expect("claim"));
    let stuck = Reminder::new(
        task.id.clone(),
        1,
        "test".into(),
        "🔔 Reminder: call mom".into(),
        due,
    );
    assert!(h.reminders().claim_slot(&stuck).await.expect("slot"));

    let restart = due + Duration::minutes(3);
    assert_eq!(h.runner.recover(restart).await.expect("recover"), 1);
    assert_eq!(h.drain(restart).await, 1);

    assert_eq!(h.channel.count(), 2);
    assert_eq!(h.channel.last().text, "🔔 Reminder: call mom");
    let attempts = h.reminders().list_for_task(&task.id).await.expect("list");
    let statuses: Vec<ReminderStatus> = attempts.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![ReminderStatus::Failed, ReminderStatus::Sent]);
    assert_eq!(attempts[0].error_message.as_deref(), Some(INTERRUPTED));
    assert_eq!(h.latest_task().await.reminder_count, 1);
}

#[tokio::test]
async fn rescheduled_task_skips_stale_job() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;

    let reply = h
        .say("m-2", "reschedule it at 5 pm", morning() + Duration::minutes(5))
        .await;
    assert_eq!(reply, "✓ Updated: call mom is now scheduled for 05:00 PM on Mar 14");

    assert_eq!(h.drain(morning() + Duration::minutes(20)).await, 1);
    assert_eq!(h.channel.count(), 2, "old due time must not send");

    let five_pm = morning() + Duration::hours(9);
    h.drain(five_pm).await;
    assert_eq!(h.channel.last().text, "🔔 Reminder: call mom");
    assert_eq!(h.latest_task().await.reminder_count, 1);
}

#[tokio::test]
async fn modify_without_time_asks_for_one() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;

    let reply = h.say("m-2", "move it later", morning()).await;

    assert_eq!(reply, kabanda::router::format::MODIFY_NEEDS_TIME);
    assert_eq!(
        h.latest_task().await.due_at,
        morning() + Duration::minutes(20)
    );
}

#[tokio::test]
async fn completed_task_stays_closed() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    let task = h.latest_task().await;

    let ack = h
        .press("cb-1", "complete", &task.id, morning() + Duration::minutes(10))
        .await;
    assert_eq!(ack.as_deref(), Some("✅ Task completed: call mom"));

    h.drain(morning() + Duration::minutes(20)).await;
    assert_eq!(h.channel.count(), 1, "closed task must not be reminded");

    let reply = h
        .say("m-2", "reschedule it at 5 pm", morning() + Duration::minutes(30))
        .await;
    assert_eq!(reply, NOTHING_TO_MODIFY);

    let stored = h.tasks().get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.completed_at, Some(morning() + Duration::minutes(10)));
    assert_eq!(stored.reminder_count, 0);
    assert_eq!(stored.due_at, task.due_at);

    let now = morning() + Duration::hours(1);
    assert!(!h
        .tasks()
        .transition(&task.id, TaskStatus::Completed, TaskStatus::Pending, now)
        .await
        .expect("transition"));
    assert!(h
        .tasks()
        .reschedule(&task.id, now + Duration::hours(1), now)
        .await
        .expect("reschedule")
        .is_none());
    assert!(!h
        .tasks()
        .record_reminder_sent(&task.id, 0, now)
        .await
        .expect("record"));
}

#[tokio::test]
async fn failed_send_is_retried_five_minutes_later() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    let task = h.latest_task().await;
    let due = morning() + Duration::minutes(20);

    h.channel.fail_next(1);
    h.drain(due).await;
    assert_eq!(h.channel.count(), 1);

    h.drain(due + Duration::minutes(4)).await;
    assert_eq!(h.channel.count(), 1);
    h.drain(due + Duration::minutes(5)).await;
    assert_eq!(h.channel.last().text, "🔔 Reminder: call mom");

    let attempts = h.reminders().list_for_task(&task.id).await.expect("list");
    let statuses: Vec<ReminderStatus> = attempts.iter().map(|r| r.status).collect();
    assert_eq!(attempts.len(), 2);
    assert!(statuses.contains(&ReminderStatus::Failed));
    assert!(statuses.contains(&ReminderStatus::Sent));
    assert!(attempts.iter().all(|r| r.sequence == 1));
    assert_eq!(h.latest_task().await.reminder_count, 1);
}

#[tokio::test]
async fn located_task_sends_map_pin() {
    let h = harness().await;
    h.say("m-1", "find me a lunch spot at 1 pm", morning()).await;
    h.say("m-2", "Kampala", morning()).await;

    h.drain(morning() + Duration::hours(5)).await;

    let pins = h.channel.locations.lock().unwrap().clone();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].title.as_deref(), Some("Cafe Javas"));
    assert_eq!(pins[0].address.as_deref(), Some("Kampala Road"));
    assert_eq!(
        h.channel.last().text,
        "🔔 Reminder: a lunch spot at Cafe Javas\n📍 Cafe Javas - Kampala Road"
    );
}
