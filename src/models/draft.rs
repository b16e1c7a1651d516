//! Task drafts produced by intent extraction and held in pending batches.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::task::Priority;

/// A task described by the owner but not yet materialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDraft {
    /// Short title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Urgency.
    #[serde(default)]
    pub priority: Priority,
    /// Due time in the owner's fixed offset.
    pub due_at: DateTime<FixedOffset>,
    /// Whether a physical place must be chosen for this task.
    #[serde(default)]
    pub requires_location: bool,
    /// What to search for near the owner (e.g. "cool dinner spot").
    #[serde(default)]
    pub location_query: Option<String>,
    /// Kind of place (e.g. "restaurant").
    #[serde(default)]
    pub location_type: Option<String>,
}

impl TaskDraft {
    /// Construct a medium-priority draft with no location needs.
    #[must_use]
    pub fn new(title: impl Into<String>, due_at: DateTime<FixedOffset>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            due_at,
            requires_location: false,
            location_query: None,
            location_type: None,
        }
    }

    /// Mark the draft as needing a place search for `query`.
    #[must_use]
    pub fn needing_location(mut self, query: impl Into<String>) -> Self {
        self.requires_location = true;
        self.location_query = Some(query.into());
        self
    }

    /// Search text for the place resolver.
    #[must_use]
    pub fn search_query(&self) -> &str {
        self.location_query
            .as_deref()
            .or(self.location_type.as_deref())
            .unwrap_or(&self.title)
    }
}
