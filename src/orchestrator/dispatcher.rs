//! Reminder dispatch and escalation job bodies.
//!
//! Both bodies re-read the task when they fire and act only if it is
//! still in the state the job was scheduled for. Sends are serialized per
//! task by the reminder slot (`task_id`, `sequence`): a job must win the
//! slot before it talks to the channel, and only a successful send
//! advances `reminder_count`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn, Instrument};

use crate::channel::{Button, CallbackAction, LocationPin, NotificationChannel};
use crate::errors::bounded;
use crate::models::reminder::Reminder;
use crate::models::task::{Task, TaskStatus};
use crate::persistence::db::Database;
use crate::persistence::owner_repo::OwnerRepo;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::{AppError, Result};

use super::escalation::{self, EscalationStep, ESCALATION_CAP};
use super::scheduler::Scheduler;

/// What a dispatch or escalation job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reminder was delivered.
    Sent {
        /// Task's reminder count after the send.
        reminder_count: u32,
        /// Whether an escalation job was enqueued.
        escalation_scheduled: bool,
    },
    /// Task is completed or cancelled.
    Terminal,
    /// Task is snoozed; the dispatch was moved to `until`.
    Deferred {
        /// End of the snooze.
        until: DateTime<Utc>,
    },
    /// Task was rescheduled to a later due time.
    Stale,
    /// Another reminder, snooze or modification overtook this job.
    Superseded,
    /// Another job already owns this reminder.
    Duplicate,
}

enum Delivery {
    Sent(u32),
    SlotTaken,
    Overtaken,
}

/// Executes reminder dispatch and escalation jobs.
#[derive(Clone)]
pub struct Dispatcher {
    tasks: TaskRepo,
    reminders: ReminderRepo,
    owners: OwnerRepo,
    scheduler: Scheduler,
    channel: Arc<dyn NotificationChannel>,
    send_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        db: &Arc<Database>,
        scheduler: Scheduler,
        channel: Arc<dyn NotificationChannel>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            tasks: TaskRepo::new(Arc::clone(db)),
            reminders: ReminderRepo::new(Arc::clone(db)),
            owners: OwnerRepo::new(Arc::clone(db)),
            scheduler,
            channel,
            send_timeout,
        }
    }

    /// Send the due-time reminder for a task.
    ///
    /// `expected_count` is the reminder count the task had when the job
    /// was scheduled; `None` skips that check.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task or its owner is gone, or
    /// the channel error when the send fails (the attempt is recorded as
    /// failed and may be retried).
    pub async fn dispatch(
        &self,
        task_id: &str,
        expected_count: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        async {
            let task = self.load(task_id).await?;

            if task.status.is_terminal() {
                info!(status = ?task.status, "task closed, reminder skipped");
                return Ok(DispatchOutcome::Terminal);
            }
            if let Some(until) = task.snoozed_until.filter(|_| task.is_snoozed_at(now)) {
                self.scheduler
                    .schedule_dispatch(&task.id, until, task.reminder_count)
                    .await?;
                info!(%until, "task snoozed, reminder deferred");
                return Ok(DispatchOutcome::Deferred { until });
            }
            if task.due_at > now {
                info!(due_at = %task.due_at, "task rescheduled later, stale reminder skipped");
                return Ok(DispatchOutcome::Stale);
            }
            if expected_count.is_some_and(|expected| expected != task.reminder_count) {
                info!(
                    reminder_count = task.reminder_count,
                    "reminder already delivered for this due time"
                );
                return Ok(DispatchOutcome::Superseded);
            }
            if task.status == TaskStatus::Snoozed {
                self.tasks.wake_from_snooze(&task.id, now).await?;
            }

            let text = render_dispatch(&task);
            let buttons = [
                Button::for_task("✅ Complete", CallbackAction::Complete, &task.id),
                Button::for_task("💤 Snooze 30min", CallbackAction::Snooze, &task.id),
                Button::for_task("🗑️ Delete", CallbackAction::Delete, &task.id),
            ];
            let count = match self.deliver(&task, text, &buttons, now).await? {
                Delivery::Sent(count) => count,
                Delivery::SlotTaken => return Ok(DispatchOutcome::Duplicate),
                Delivery::Overtaken => return Ok(DispatchOutcome::Superseded),
            };

            let mut escalation_scheduled = false;
            if escalation::starts_chain(count) {
                self.scheduler
                    .schedule_escalation(&task.id, now + escalation::interval(), 1, count)
                    .await?;
                escalation_scheduled = true;
            }
            Ok(DispatchOutcome::Sent {
                reminder_count: count,
                escalation_scheduled,
            })
        }
        .instrument(info_span!("dispatch", task_id))
        .await
    }

    /// Send escalation `step` for a task.
    ///
    /// The job acts only while the task is open, not snoozed, and still has
    /// `expected_count` reminders; anything else means the owner reacted or
    /// another reminder overtook the chain.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task or its owner is gone, or
    /// the channel error when the send fails. Escalations are not retried,
    /// so a failed send ends the chain.
    pub async fn escalate(
        &self,
        task_id: &str,
        step: u32,
        expected_count: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        async {
            let task = self.load(task_id).await?;

            if task.status.is_terminal() {
                return Ok(DispatchOutcome::Terminal);
            }
            if task.status == TaskStatus::Snoozed
                || expected_count.is_some_and(|expected| expected != task.reminder_count)
            {
                info!(status = ?task.status, "escalation chain superseded");
                return Ok(DispatchOutcome::Superseded);
            }
            if step > ESCALATION_CAP {
                info!(step, "escalation cap reached");
                return Ok(DispatchOutcome::Superseded);
            }

            let decision = EscalationStep::for_count(task.reminder_count);
            let text = decision.render(task.reminder_count, &task.title);
            let buttons = [
                Button::for_task("✅ Complete", CallbackAction::Complete, &task.id),
                Button::for_task("💤 Snooze 30min", CallbackAction::Snooze, &task.id),
            ];
            let count = match self.deliver(&task, text, &buttons, now).await? {
                Delivery::Sent(count) => count,
                Delivery::SlotTaken => return Ok(DispatchOutcome::Duplicate),
                Delivery::Overtaken => return Ok(DispatchOutcome::Superseded),
            };

            if decision.should_continue {
                self.scheduler
                    .schedule_escalation(&task.id, now + escalation::interval(), step + 1, count)
                    .await?;
            } else {
                info!(reminder_count = count, "escalation cap reached, chain stopped");
            }
            Ok(DispatchOutcome::Sent {
                reminder_count: count,
                escalation_scheduled: decision.should_continue,
            })
        }
        .instrument(info_span!("escalate", task_id, step))
        .await
    }

    async fn load(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {task_id}")))
    }

    /// Claim the next reminder slot, send, and advance the count.
    async fn deliver(
        &self,
        task: &Task,
        text: String,
        buttons: &[Button],
        now: DateTime<Utc>,
    ) -> Result<Delivery> {
        let owner = self
            .owners
            .get_by_id(&task.owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("owner {}", task.owner_id)))?;

        let sequence = task.reminder_count + 1;
        let reminder = Reminder::new(
            task.id.clone(),
            sequence,
            self.channel.name().to_owned(),
            text,
            now,
        );
        if !self.reminders.claim_slot(&reminder).await? {
            info!(sequence, "reminder slot already claimed");
            return Ok(Delivery::SlotTaken);
        }

        let sent = bounded(
            self.send_timeout,
            "send reminder",
            self.channel
                .send_text(&owner.transport_chat_id, &reminder.message_content, buttons),
        )
        .await;
        let message_id = match sent {
            Ok(id) => id,
            Err(err) => {
                self.reminders.mark_failed(&reminder.id, &err.to_string()).await?;
                warn!(%err, sequence, "reminder send failed");
                return Err(err);
            }
        };
        self.reminders.mark_sent(&reminder.id, Some(&message_id), now).await?;

        if let Some(pin) = location_pin(task) {
            let pinned = bounded(
                self.send_timeout,
                "send location",
                self.channel.send_location(&owner.transport_chat_id, &pin),
            )
            .await;
            if let Err(err) = pinned {
                warn!(%err, "location widget not delivered");
            }
        }

        if !self
            .tasks
            .record_reminder_sent(&task.id, task.reminder_count, now)
            .await?
        {
            warn!(sequence, "task changed while the reminder was being sent");
            return Ok(Delivery::Overtaken);
        }
        info!(reminder_count = sequence, "reminder sent");
        Ok(Delivery::Sent(sequence))
    }
}

/// Text of the due-time reminder.
#[must_use]
pub fn render_dispatch(task: &Task) -> String {
    let mut text = if task.reminder_count == 0 {
        format!("🔔 Reminder: {}", task.title)
    } else {
        format!("🔔 Reminder ({}x): {}", task.reminder_count + 1, task.title)
    };
    if let Some(location) = &task.location {
        text.push_str(&format!("\n📍 {}", location.name));
        if let Some(address) = &location.address {
            text.push_str(&format!(" - {address}"));
        }
    }
    text
}

fn location_pin(task: &Task) -> Option<LocationPin> {
    let location = task.location.as_ref()?;
    let (lat, lng) = location.coordinates()?;
    Some(LocationPin {
        lat,
        lng,
        title: Some(location.name.clone()),
        address: location.address.clone(),
    })
}
