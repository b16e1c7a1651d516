//! Inbound message and button-press handling.
//!
//! Transport handlers call [`Ingress::accept_message`], which claims the
//! external message id and enqueues a `MessageIntake` job. The job runs
//! [`Ingress::process_intake`]: it claims the outgoing side of the same
//! id, routes the text, stores the reply before sending it and marks the
//! claim processed only after delivery. A retried intake job therefore
//! resends the stored reply instead of routing the message again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::channel::{parse_callback_payload, CallbackAction, NotificationChannel};
use crate::config::GlobalConfig;
use crate::errors::bounded;
use crate::models::conversation::ConversationEntry;
use crate::models::idempotency::{ClaimOutcome, Direction};
use crate::models::job::ScheduledJob;
use crate::models::task::{Task, TaskStatus};
use crate::orchestrator::scheduler::Scheduler;
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::db::Database;
use crate::persistence::idempotency_repo::IdempotencyRepo;
use crate::persistence::owner_repo::OwnerRepo;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::router::Router;
use crate::{AppError, Result};

/// Snooze length applied by the reminder button.
pub const SNOOZE_MINUTES: i64 = 30;

/// Reply to a button on a task that no longer exists for this owner.
pub const UNKNOWN_TASK: &str = "I couldn't find that task.";

/// An inbound chat message as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundEvent {
    /// Transport-unique message id; redeliveries carry the same value.
    pub external_message_id: String,
    /// Chat the message came from and the reply goes to.
    pub chat_id: String,
    /// Message text.
    pub text: String,
}

/// A pressed reminder button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    /// Transport-unique id of the press; redeliveries carry the same value.
    pub callback_id: String,
    /// Chat the button lives in.
    pub chat_id: String,
    /// Button payload (`action_taskId`).
    pub payload: String,
}

/// What processing an intake job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// The message was routed and the reply delivered.
    Replied {
        /// Reply text.
        text: String,
    },
    /// A reply stored by an earlier attempt was delivered.
    Resent,
    /// Another job already handled this message.
    Duplicate,
}

/// Entry point for everything the transport hands us.
#[derive(Clone)]
pub struct Ingress {
    db: Arc<Database>,
    router: Router,
    scheduler: Scheduler,
    owners: OwnerRepo,
    tasks: TaskRepo,
    reminders: ReminderRepo,
    idempotency: IdempotencyRepo,
    conversation: ConversationRepo,
    channel: Arc<dyn NotificationChannel>,
    config: Arc<GlobalConfig>,
}

impl Ingress {
    /// Create the ingress over shared storage.
    #[must_use]
    pub fn new(
        db: &Arc<Database>,
        router: Router,
        scheduler: Scheduler,
        channel: Arc<dyn NotificationChannel>,
        config: Arc<GlobalConfig>,
    ) -> Self {
        Self {
            db: Arc::clone(db),
            router,
            scheduler,
            owners: OwnerRepo::new(Arc::clone(db)),
            tasks: TaskRepo::new(Arc::clone(db)),
            reminders: ReminderRepo::new(Arc::clone(db)),
            idempotency: IdempotencyRepo::new(Arc::clone(db)),
            conversation: ConversationRepo::new(Arc::clone(db)),
            channel,
            config,
        }
    }

    /// Accept a message from the transport.
    ///
    /// The incoming claim and the intake job commit together, so a failed
    /// accept leaves nothing behind and the redelivery is accepted.
    /// Returns `false` when the message id was seen before; nothing is
    /// enqueued in that case.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the claim or the job cannot be persisted.
    pub async fn accept_message(&self, event: &InboundEvent, now: DateTime<Utc>) -> Result<bool> {
        let holder = format!("ingress:{}", Uuid::new_v4());
        let payload = serde_json::to_value(event)?;

        let mut tx = self.db.begin().await?;
        let outcome = self
            .idempotency
            .claim_in(
                &mut tx,
                &event.external_message_id,
                Direction::Incoming,
                &holder,
                now,
            )
            .await?;
        if outcome == ClaimOutcome::AlreadyProcessed {
            debug!(external_id = %event.external_message_id, "duplicate message ignored");
            return Ok(false);
        }
        let job = self
            .scheduler
            .schedule_in(&mut tx, ScheduledJob::intake(payload, now))
            .await?;
        tx.commit().await?;
        self.scheduler.wake();

        info!(
            external_id = %event.external_message_id,
            job_id = %job.id,
            "message accepted"
        );
        Ok(true)
    }

    /// Body of a `MessageIntake` job.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a malformed payload, or the
    /// storage, routing or channel error. Channel failures leave the reply
    /// stored so the retry resends it.
    pub async fn process_intake(&self, job: &ScheduledJob, now: DateTime<Utc>) -> Result<IntakeOutcome> {
        let payload = job
            .payload
            .clone()
            .ok_or_else(|| AppError::InvalidInput("intake job has no payload".into()))?;
        let event: InboundEvent = serde_json::from_value(payload)
            .map_err(|err| AppError::InvalidInput(format!("malformed intake payload: {err}")))?;

        let span = info_span!("intake", external_id = %event.external_message_id, job_id = %job.id);
        self.process_event(&event, &job.id, now).instrument(span).await
    }

    async fn process_event(
        &self,
        event: &InboundEvent,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<IntakeOutcome> {
        let key = event.external_message_id.as_str();
        let claim = self
            .idempotency
            .claim(key, Direction::Outgoing, holder, now)
            .await?;
        if claim == ClaimOutcome::AlreadyProcessed {
            debug!("reply already produced by another job");
            return Ok(IntakeOutcome::Duplicate);
        }

        if let Some(stored) = self.idempotency.pending_response(key, Direction::Outgoing).await? {
            self.send_reply(&event.chat_id, &stored).await?;
            self.finish(key).await?;
            info!("stored reply resent");
            return Ok(IntakeOutcome::Resent);
        }

        let owner = self.owners.get_or_create(&event.chat_id).await?;
        let reply = self.router.handle(&owner, &event.text, now).await?;
        self.idempotency
            .record_response(key, Direction::Outgoing, &reply.text)
            .await?;

        let first_task = reply.task_ids.first().cloned();
        let mut incoming = ConversationEntry::new(owner.id.clone(), Direction::Incoming, event.text.clone())
            .with_intent(reply.intent)
            .with_task(first_task.clone());
        incoming.created_at = now;
        let mut outgoing = ConversationEntry::new(owner.id.clone(), Direction::Outgoing, reply.text.clone())
            .with_intent(reply.intent)
            .with_task(first_task);
        outgoing.created_at = now;
        self.conversation.append(&incoming).await?;
        self.conversation.append(&outgoing).await?;

        self.send_reply(&event.chat_id, &reply.text).await?;
        self.finish(key).await?;
        info!(intent = reply.intent, "message handled");
        Ok(IntakeOutcome::Replied { text: reply.text })
    }

    async fn send_reply(&self, chat_id: &str, text: &str) -> Result<()> {
        bounded(
            self.config.timeouts.channel(),
            "reply send",
            self.channel.send_text(chat_id, text, &[]),
        )
        .await
        .map(|_| ())
    }

    async fn finish(&self, key: &str) -> Result<()> {
        self.idempotency.mark_processed(key, Direction::Outgoing).await?;
        self.idempotency.mark_processed(key, Direction::Incoming).await
    }

    /// Apply a pressed reminder button.
    ///
    /// Returns the acknowledgement text, or `None` for a repeated press
    /// delivery. A press that fails releases its claim so the transport's
    /// redelivery is handled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for an unparseable payload, or the
    /// storage error.
    pub async fn handle_callback(
        &self,
        event: &CallbackEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let holder = format!("callback:{}", Uuid::new_v4());
        let claim = self
            .idempotency
            .claim(&event.callback_id, Direction::Incoming, &holder, now)
            .await?;
        if claim == ClaimOutcome::AlreadyProcessed {
            debug!(callback_id = %event.callback_id, "duplicate button press ignored");
            return Ok(None);
        }

        match self.press(event, now).await {
            Ok(text) => Ok(Some(text)),
            Err(err) => {
                if let Err(release_err) = self
                    .idempotency
                    .release(&event.callback_id, Direction::Incoming, &holder)
                    .await
                {
                    warn!(
                        %release_err,
                        callback_id = %event.callback_id,
                        "callback claim not released"
                    );
                }
                Err(err)
            }
        }
    }

    async fn press(&self, event: &CallbackEvent, now: DateTime<Utc>) -> Result<String> {
        let (action, task_id) = parse_callback_payload(&event.payload)?;
        let span = info_span!("callback", action = action.as_str(), task_id = %task_id);
        let text = self
            .apply_callback(&event.chat_id, action, &task_id, now)
            .instrument(span)
            .await?;

        if let Err(err) = bounded(
            self.config.timeouts.channel(),
            "callback ack",
            self.channel.ack_callback(&event.callback_id, &text),
        )
        .await
        {
            warn!(%err, callback_id = %event.callback_id, "callback acknowledgement failed");
        }
        self.idempotency
            .mark_processed(&event.callback_id, Direction::Incoming)
            .await?;
        Ok(text)
    }

    async fn apply_callback(
        &self,
        chat_id: &str,
        action: CallbackAction,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let owner = self.owners.get_or_create(chat_id).await?;
        let Some(task) = self
            .tasks
            .get_by_id(task_id)
            .await?
            .filter(|t| t.owner_id == owner.id)
        else {
            warn!("button pressed for unknown task");
            return Ok(UNKNOWN_TASK.to_owned());
        };
        if task.status.is_terminal() {
            return Ok(closed_text(&task));
        }

        match action {
            CallbackAction::Complete => {
                if !self
                    .tasks
                    .transition(&task.id, task.status, TaskStatus::Completed, now)
                    .await?
                {
                    return self.current_state(&task).await;
                }
                self.reminders.acknowledge_latest(&task.id, now).await?;
                info!("task completed");
                Ok(format!("✅ Task completed: {}", task.title))
            }
            CallbackAction::Snooze => {
                let until = now + Duration::minutes(SNOOZE_MINUTES);
                if !self.tasks.snooze(&task.id, until, now).await? {
                    return self.current_state(&task).await;
                }
                self.scheduler
                    .schedule_dispatch(&task.id, until, task.reminder_count)
                    .await?;
                info!(%until, "task snoozed");
                Ok(format!(
                    "💤 Snoozed for {SNOOZE_MINUTES} minutes: {}",
                    task.title
                ))
            }
            CallbackAction::Delete => {
                if !self
                    .tasks
                    .transition(&task.id, task.status, TaskStatus::Cancelled, now)
                    .await?
                {
                    return self.current_state(&task).await;
                }
                info!("task cancelled");
                Ok(format!("🗑️ Task cancelled: {}", task.title))
            }
        }
    }

    async fn current_state(&self, task: &Task) -> Result<String> {
        let latest = self.tasks.get_by_id(&task.id).await?;
        Ok(latest.map_or_else(|| UNKNOWN_TASK.to_owned(), |t| closed_text(&t)))
    }
}

fn closed_text(task: &Task) -> String {
    match task.status {
        TaskStatus::Completed => format!("This task is already completed: {}", task.title),
        TaskStatus::Cancelled => format!("This task was cancelled: {}", task.title),
        TaskStatus::Snoozed => format!("This task is snoozed: {}", task.title),
        TaskStatus::Pending | TaskStatus::InProgress => {
            format!("This task changed meanwhile: {}", task.title)
        }
    }
}
