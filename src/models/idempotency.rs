//! Idempotency records keyed by external message identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the conversation an external identifier belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Event received from the transport.
    Incoming,
    /// Effect produced towards the transport.
    Outgoing,
}

impl Direction {
    /// Column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

/// Result of attempting to claim an external identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller won the claim and must process the event.
    Claimed,
    /// Another delivery already claimed or finished it; the caller does nothing.
    AlreadyProcessed,
}

/// Persisted claim for one external identifier and direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdempotencyRecord {
    /// External message identifier.
    pub external_id: String,
    /// Direction of the claim.
    pub direction: Direction,
    /// Identifier of the worker holding the claim.
    pub holder: Option<String>,
    /// Whether processing finished.
    pub processed: bool,
    /// Reply computed for this event but possibly not yet delivered.
    pub response: Option<String>,
    /// Claim timestamp.
    pub created_at: DateTime<Utc>,
}
