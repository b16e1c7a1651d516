//! Owner (end user) registry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Remembered home area used to resolve location-needing tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnownLocation {
    /// What the owner called it.
    pub name: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// A person who owns tasks, identified on the transport by a chat id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Owner {
    /// Unique record identifier.
    pub id: String,
    /// Transport-side chat identifier (Slack DM channel).
    pub transport_chat_id: String,
    /// Optional human-readable name.
    pub display_name: Option<String>,
    /// Last resolved location answer.
    pub home_location: Option<KnownLocation>,
    /// First-contact timestamp.
    pub created_at: DateTime<Utc>,
}

impl Owner {
    /// Construct an owner on first contact.
    #[must_use]
    pub fn new(transport_chat_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transport_chat_id,
            display_name: None,
            home_location: None,
            created_at: Utc::now(),
        }
    }
}
