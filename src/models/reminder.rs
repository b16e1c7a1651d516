//! Reminder attempt record. One row per dispatch attempt, append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of a single reminder attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Recorded, send not yet confirmed.
    Scheduled,
    /// Channel accepted the message.
    Sent,
    /// Channel confirmed delivery.
    Delivered,
    /// Send failed; see `error_message`.
    Failed,
    /// Owner acted on the reminder.
    Acknowledged,
}

/// A single reminder dispatch attempt for a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    /// Unique record identifier.
    pub id: String,
    /// Task being reminded about.
    pub task_id: String,
    /// The task's reminder count this attempt would produce once sent.
    pub sequence: u32,
    /// Channel name (e.g. `slack`).
    pub channel: String,
    /// Delivery status.
    pub status: ReminderStatus,
    /// When the attempt was recorded.
    pub scheduled_at: DateTime<Utc>,
    /// When the channel accepted it.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the owner acted on it.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Rendered message text.
    pub message_content: String,
    /// Failure detail for `Failed` attempts.
    pub error_message: Option<String>,
    /// Channel-side message identifier.
    pub channel_message_id: Option<String>,
}

impl Reminder {
    /// Construct a new attempt in `Scheduled` state.
    #[must_use]
    pub fn new(
        task_id: String,
        sequence: u32,
        channel: String,
        message_content: String,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            sequence,
            channel,
            status: ReminderStatus::Scheduled,
            scheduled_at,
            sent_at: None,
            acknowledged_at: None,
            message_content,
            error_message: None,
            channel_message_id: None,
        }
    }
}
