//! Conversation log entries used as context for intent extraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::idempotency::Direction;

/// One inbound or outbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationEntry {
    /// Unique record identifier.
    pub id: String,
    /// Owner the message belongs to.
    pub owner_id: String,
    /// Inbound (user) or outbound (assistant).
    pub direction: Direction,
    /// Message text.
    pub content: String,
    /// Intent label assigned to the inbound message or its reply.
    pub intent: Option<String>,
    /// Task the message created or touched.
    pub task_id: Option<String>,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

impl ConversationEntry {
    /// Construct a log entry.
    #[must_use]
    pub fn new(owner_id: String, direction: Direction, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            direction,
            content,
            intent: None,
            task_id: None,
            created_at: Utc::now(),
        }
    }

    /// Attach an intent label.
    #[must_use]
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Attach a task reference.
    #[must_use]
    pub fn with_task(mut self, task_id: Option<String>) -> Self {
        self.task_id = task_id;
        self
    }
}
