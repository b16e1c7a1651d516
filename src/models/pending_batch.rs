//! Held task drafts waiting for the owner to say where they are.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::draft::TaskDraft;

/// Drafts held until a location answer arrives. Consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingBatch {
    /// Unique record identifier; becomes the tasks' batch id.
    pub id: String,
    /// Owner who must answer.
    pub owner_id: String,
    /// Drafts to materialize.
    pub drafts: Vec<TaskDraft>,
    /// Message that produced the drafts.
    pub source_message: String,
    /// Whether the batch is still waiting.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the batch was consumed.
    pub consumed_at: Option<DateTime<Utc>>,
}

impl PendingBatch {
    /// Construct an active batch.
    #[must_use]
    pub fn new(owner_id: String, drafts: Vec<TaskDraft>, source_message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            drafts,
            source_message,
            active: true,
            created_at: Utc::now(),
            consumed_at: None,
        }
    }
}
