//! Escalation policy.
//!
//! Pure decision logic: the reminder count a task has when an escalation
//! job fires determines the wording of the next message and whether the
//! chain continues after it.

use chrono::Duration;

/// Reminder count, reached by a dispatch, that starts an escalation chain.
pub const ESCALATION_START_COUNT: u32 = 2;

/// Reminder count from which escalations use urgent wording.
pub const URGENT_COUNT: u32 = 3;

/// Reminder count at which the chain stops.
pub const ESCALATION_CAP: u32 = 10;

/// Minutes between escalation sends.
pub const ESCALATION_INTERVAL_MINUTES: i64 = 10;

/// Message wording tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Repeat of the reminder with a counter.
    Persistent,
    /// Tells the owner they have ignored several reminders.
    Urgent,
}

/// What an escalation job should do for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationStep {
    /// Wording for this send.
    pub tier: Tier,
    /// Whether another escalation follows this send.
    pub should_continue: bool,
}

impl EscalationStep {
    /// Decide from the task's reminder count before this send.
    #[must_use]
    pub fn for_count(reminder_count: u32) -> Self {
        let tier = if reminder_count >= URGENT_COUNT {
            Tier::Urgent
        } else {
            Tier::Persistent
        };
        Self {
            tier,
            should_continue: reminder_count.saturating_add(1) < ESCALATION_CAP,
        }
    }

    /// Message text for this send.
    #[must_use]
    pub fn render(&self, reminder_count: u32, title: &str) -> String {
        match self.tier {
            Tier::Persistent => format!("🔔 Reminder ({reminder_count}x): {title}"),
            Tier::Urgent => format!(
                "⚠️ URGENT: You have ignored '{title}' for {reminder_count} reminders. \
                 Please address this now!"
            ),
        }
    }
}

/// Whether a dispatch that produced `reminder_count` starts a chain.
#[must_use]
pub fn starts_chain(reminder_count: u32) -> bool {
    reminder_count >= ESCALATION_START_COUNT
}

/// Delay between escalation sends.
#[must_use]
pub fn interval() -> Duration {
    Duration::minutes(ESCALATION_INTERVAL_MINUTES)
}
