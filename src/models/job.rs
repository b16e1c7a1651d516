//! Persisted one-shot job record consumed by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job classes, each with its own retry policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Process one inbound chat message.
    MessageIntake,
    /// Send the due-time reminder for a task.
    ReminderDispatch,
    /// Send a follow-up reminder after an ignored one.
    Escalation,
}

impl JobKind {
    /// Column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageIntake => "message_intake",
            Self::ReminderDispatch => "reminder_dispatch",
            Self::Escalation => "escalation",
        }
    }
}

/// Job lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `fire_at`.
    Queued,
    /// Claimed by a worker.
    Running,
    /// Finished (including idempotent no-ops).
    Done,
    /// Abandoned after a permanent error or exhausted retries.
    Failed,
}

/// A scheduled unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledJob {
    /// Unique record identifier.
    pub id: String,
    /// Job class.
    pub kind: JobKind,
    /// Target task for dispatch/escalation jobs.
    pub task_id: Option<String>,
    /// Opaque body for intake jobs.
    pub payload: Option<serde_json::Value>,
    /// Earliest execution instant.
    pub fire_at: DateTime<Utc>,
    /// Retries consumed so far.
    pub attempt: u32,
    /// Position in an escalation chain (1-based for escalation jobs).
    pub step: u32,
    /// Reminder count the task must still have for this job to act.
    pub expected_count: Option<u32>,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Last failure detail.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Construct a queued job.
    #[must_use]
    pub fn new(kind: JobKind, task_id: Option<String>, fire_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            task_id,
            payload: None,
            fire_at,
            attempt: 0,
            step: 0,
            expected_count: None,
            status: JobStatus::Queued,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A reminder dispatch that only sends while the task still has
    /// `expected_count` reminders.
    #[must_use]
    pub fn dispatch(task_id: &str, fire_at: DateTime<Utc>, expected_count: u32) -> Self {
        let mut job = Self::new(JobKind::ReminderDispatch, Some(task_id.to_owned()), fire_at);
        job.expected_count = Some(expected_count);
        job
    }

    /// An intake job carrying an inbound message.
    #[must_use]
    pub fn intake(payload: serde_json::Value, fire_at: DateTime<Utc>) -> Self {
        Self::new(JobKind::MessageIntake, None, fire_at).with_payload(payload)
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set escalation chain position and the reminder count it expects.
    #[must_use]
    pub fn with_chain(mut self, step: u32, expected_count: u32) -> Self {
        self.step = step;
        self.expected_count = Some(expected_count);
        self
    }
}
