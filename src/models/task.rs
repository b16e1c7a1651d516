//! Task model: a reminder-bearing unit of work owned by one person.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Urgency classification for a task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Should be handled soon.
    High,
    /// Needs attention now.
    Urgent,
}

impl Priority {
    /// Parse a priority label, falling back to `Medium` for unknown input.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Medium,
        }
    }

    /// Capitalized label for user-facing text.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

/// Lifecycle status for a task.
///
/// `Completed` and `Cancelled` are terminal: once reached, no further
/// mutation of status, due time or reminder count is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its due time.
    Pending,
    /// Owner has started working on it.
    InProgress,
    /// Done (terminal).
    Completed,
    /// Cancelled by the owner (terminal).
    Cancelled,
    /// Reminders deferred until `snoozed_until`.
    Snoozed,
}

impl TaskStatus {
    /// Whether the status admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Physical place attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskLocation {
    /// Place name.
    pub name: String,
    /// Street address, if known.
    pub address: Option<String>,
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lng: Option<f64>,
}

impl TaskLocation {
    /// Coordinates when both halves are present.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lng)
    }
}

/// A reminder-bearing task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique record identifier.
    pub id: String,
    /// Owning person.
    pub owner_id: String,
    /// Short title shown in reminders.
    pub title: String,
    /// Longer free-form description.
    pub description: String,
    /// Urgency.
    pub priority: Priority,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// When the first reminder fires.
    pub due_at: DateTime<Utc>,
    /// Set while snoozed.
    pub snoozed_until: Option<DateTime<Utc>>,
    /// Number of reminders delivered so far.
    pub reminder_count: u32,
    /// When the last reminder was delivered.
    pub last_reminded_at: Option<DateTime<Utc>>,
    /// When the task was completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Groups tasks created from one multi-task message.
    pub batch_id: Option<String>,
    /// Attached place, if any.
    pub location: Option<TaskLocation>,
    /// The message that created this task.
    pub source_message: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Construct a new pending task.
    #[must_use]
    pub fn new(
        owner_id: String,
        title: String,
        due_at: DateTime<Utc>,
        source_message: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            title,
            description: String::new(),
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            due_at,
            snoozed_until: None,
            reminder_count: 0,
            last_reminded_at: None,
            completed_at: None,
            batch_id: None,
            location: None,
            source_message,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Tag the task with a batch identifier.
    #[must_use]
    pub fn with_batch(mut self, batch_id: Option<String>) -> Self {
        self.batch_id = batch_id;
        self
    }

    /// Attach a location.
    #[must_use]
    pub fn with_location(mut self, location: Option<TaskLocation>) -> Self {
        self.location = location;
        self
    }

    /// Whether the task is snoozed past `now`.
    #[must_use]
    pub fn is_snoozed_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Snoozed && self.snoozed_until.is_some_and(|until| until > now)
    }
}
