//! Inbound message flow: duplicate suppression, stored-reply resend and
//! the conversation log.

use std::sync::Arc;

use chrono::Duration;

use kabanda::ingress::InboundEvent;
use kabanda::models::idempotency::Direction;
use kabanda::persistence::conversation_repo::ConversationRepo;
use kabanda::persistence::idempotency_repo::IdempotencyRepo;

use super::test_helpers::{harness, morning, CHAT};

const CONFIRMATION: &str =
    "✓ Task created: **call mom**\n⏰ Reminder: 08:20 AM on Mar 14, 2026\n📊 Priority: Medium";

fn event(id: &str, text: &str) -> InboundEvent {
    InboundEvent {
        external_message_id: id.to_owned(),
        chat_id: CHAT.to_owned(),
        text: text.to_owned(),
    }
}

#[tokio::test]
async fn new_task_message_gets_confirmation() {
    let h = harness().await;

    let reply = h.say("m-1", "remind me to call mom in 20 mins", morning()).await;

    assert_eq!(reply, CONFIRMATION);
    let task = h.latest_task().await;
    assert_eq!(task.title, "call mom");
    assert_eq!(task.due_at, morning() + Duration::minutes(20));
    assert_eq!(task.reminder_count, 0);
}

#[tokio::test]
async fn redelivered_message_is_processed_once() {
    let h = harness().await;
    let first = event("m-1", "remind me to call mom in 20 mins");

    assert!(h.state.ingress.accept_message(&first, morning()).await.expect("accept"));
    assert!(!h.state.ingress.accept_message(&first, morning()).await.expect("accept"));
    h.drain(morning()).await;

    // Redelivery after processing is still a duplicate.
    let later = morning() + Duration::minutes(1);
    assert!(!h.state.ingress.accept_message(&first, later).await.expect("accept"));
    h.drain(later).await;

    assert_eq!(h.channel.count(), 1);
    let owner = h.owner().await;
    let open = h
        .tasks()
        .list_pending_due_between(&owner.id, morning(), None)
        .await
        .expect("list");
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn failed_accept_leaves_redelivery_acceptable() {
    let h = harness().await;
    let first = event("m-1", "remind me to call mom in 20 mins");

    h.hide_table("scheduled_job").await;
    let failed = h.state.ingress.accept_message(&first, morning()).await;
    assert!(failed.is_err());
    h.restore_table("scheduled_job").await;

    let idempotency = IdempotencyRepo::new(Arc::clone(&h.state.db));
    assert!(idempotency
        .get("m-1", Direction::Incoming)
        .await
        .expect("get")
        .is_none());

    assert!(h.state.ingress.accept_message(&first, morning()).await.expect("accept"));
    h.drain(morning()).await;
    assert_eq!(h.channel.last().text, CONFIRMATION);
}

#[tokio::test]
async fn failed_reply_is_resent_without_rerouting() {
    let h = harness().await;
    h.channel.fail_next(1);

    let accepted = h
        .state
        .ingress
        .accept_message(&event("m-1", "remind me to call mom in 20 mins"), morning())
        .await
        .expect("accept");
    assert!(accepted);
    h.runner.run_due(morning()).await.expect("sweep");
    assert_eq!(h.channel.count(), 0);

    let idempotency = IdempotencyRepo::new(Arc::clone(&h.state.db));
    let stored = idempotency
        .pending_response("m-1", Direction::Outgoing)
        .await
        .expect("lookup");
    assert_eq!(stored.as_deref(), Some(CONFIRMATION));

    // Intake retries one minute later.
    h.drain(morning() + Duration::seconds(59)).await;
    assert_eq!(h.channel.count(), 0);
    h.drain(morning() + Duration::seconds(60)).await;

    assert_eq!(h.channel.texts(), vec![CONFIRMATION.to_owned()]);
    let owner = h.owner().await;
    let open = h
        .tasks()
        .list_pending_due_between(&owner.id, morning(), None)
        .await
        .expect("list");
    assert_eq!(open.len(), 1, "retry must not create a second task");

    let conversation = ConversationRepo::new(Arc::clone(&h.state.db))
        .recent(&owner.id, 10)
        .await
        .expect("recent");
    assert_eq!(conversation.len(), 2);

    let outgoing = idempotency
        .get("m-1", Direction::Outgoing)
        .await
        .expect("lookup")
        .expect("record");
    assert!(outgoing.processed);
    let incoming = idempotency
        .get("m-1", Direction::Incoming)
        .await
        .expect("lookup")
        .expect("record");
    assert!(incoming.processed);
}

#[tokio::test]
async fn exchange_is_logged_with_intent_and_task() {
    let h = harness().await;

    let reply = h.say("m-1", "remind me to call mom in 20 mins", morning()).await;

    let owner = h.owner().await;
    let task = h.latest_task().await;
    let log = ConversationRepo::new(Arc::clone(&h.state.db))
        .recent(&owner.id, 10)
        .await
        .expect("recent");
    assert_eq!(log.len(), 2);

    assert_eq!(log[0].direction, Direction::Incoming);
    assert_eq!(log[0].content, "remind me to call mom in 20 mins");
    assert_eq!(log[0].intent.as_deref(), Some("new_task"));
    assert_eq!(log[0].task_id.as_deref(), Some(task.id.as_str()));

    assert_eq!(log[1].direction, Direction::Outgoing);
    assert_eq!(log[1].content, reply);
}

#[tokio::test]
async fn greeting_gets_general_reply() {
    let h = harness().await;

    let reply = h.say("m-1", "hello", morning()).await;

    assert_eq!(reply, kabanda::router::format::DEFAULT_GENERAL_REPLY);
}

#[tokio::test]
async fn malformed_intake_payload_is_abandoned() {
    let h = harness().await;
    let job = h
        .state
        .scheduler
        .schedule_intake(serde_json::json!({ "bogus": 1 }), morning())
        .await
        .expect("schedule");

    h.drain(morning()).await;

    let stored = h
        .state
        .scheduler
        .jobs()
        .get_by_id(&job.id)
        .await
        .expect("lookup")
        .expect("job");
    assert_eq!(stored.status, kabanda::models::job::JobStatus::Failed);
    assert_eq!(stored.attempt, 0);
    assert_eq!(h.channel.count(), 0);
}
