//! Conversation routing: cancellation and schedule queries.

use chrono::Duration;

use kabanda::models::task::TaskStatus;
use kabanda::router::format::NOTHING_TO_CANCEL;

use super::test_helpers::{harness, morning};

#[tokio::test]
async fn cancel_removes_most_recent_pending_task() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    let task = h.latest_task().await;

    let reply = h.say("m-2", "cancel that", morning() + Duration::minutes(1)).await;
    assert_eq!(reply, "🗑️ Task cancelled: call mom");
    let stored = h.tasks().get_by_id(&task.id).await.expect("get").expect("task");
    assert_eq!(stored.status, TaskStatus::Cancelled);

    let again = h.say("m-3", "cancel that", morning() + Duration::minutes(2)).await;
    assert_eq!(again, NOTHING_TO_CANCEL);

    h.drain(morning() + Duration::minutes(20)).await;
    assert_eq!(h.channel.count(), 3, "cancelled task must not be reminded");
}

#[tokio::test]
async fn cancel_picks_newest_of_several() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    h.say("m-2", "remind me to pay rent at 3 pm", morning() + Duration::minutes(1))
        .await;

    let reply = h.say("m-3", "delete it", morning() + Duration::minutes(2)).await;

    assert_eq!(reply, "🗑️ Task cancelled: pay rent");
    assert_eq!(h.latest_task().await.title, "call mom");
}

#[tokio::test]
async fn query_lists_tasks_in_window() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    h.say("m-2", "remind me to pay rent at 3 pm", morning() + Duration::minutes(1))
        .await;
    let asked = morning() + Duration::minutes(2);

    let morning_list = h.say("m-3", "what do i have this morning", asked).await;
    assert_eq!(
        morning_list,
        "📋 You have 1 pending task(s):\n\n1. **call mom**\n   ⏰ 08:20 AM on Mar 14\n   📊 Medium\n\n"
    );

    let today = h.say("m-4", "what do i have today", asked).await;
    assert!(today.starts_with("📋 You have 2 pending task(s):"));
    let first = today.find("call mom").expect("call mom listed");
    let second = today.find("pay rent").expect("pay rent listed");
    assert!(first < second, "earliest due first");

    let evening = h.say("m-5", "what do i have this evening", asked).await;
    assert_eq!(evening, "You have no pending tasks this evening. All clear! 🎉");
}

#[tokio::test]
async fn query_excludes_closed_tasks() {
    let h = harness().await;
    h.say("m-1", "remind me to call mom in 20 mins", morning()).await;
    h.say("m-2", "cancel that", morning() + Duration::minutes(1)).await;

    let reply = h
        .say("m-3", "what do i have today", morning() + Duration::minutes(2))
        .await;

    assert_eq!(reply, "You have no pending tasks for today. All clear! 🎉");
}

#[tokio::test]
async fn message_without_time_gets_default_due_and_question() {
    let h = harness().await;

    let reply = h.say("m-1", "buy groceries", morning()).await;

    assert!(reply.starts_with("✓ Task created: **buy groceries**"));
    assert!(reply.ends_with("\n\n❓ Could you specify when you want to be reminded?"));
    assert_eq!(h.latest_task().await.due_at, morning() + Duration::hours(2));
}
