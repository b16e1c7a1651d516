//! Reply texts.

use chrono::{DateTime, FixedOffset, Utc};

use crate::intent::QueryWindow;
use crate::models::task::Task;

/// Prompt sent when drafts need a location the owner has not given.
pub const DEFAULT_LOCATION_PROMPT: &str =
    "📍 Where are you right now? Tell me your area and I'll find the best spot.";

/// Reply to a general message without a proposed answer.
pub const DEFAULT_GENERAL_REPLY: &str =
    "I'm listening. You can ask me to remind you of tasks or check your schedule.";

/// Reply when a modify request names no usable time.
pub const MODIFY_NEEDS_TIME: &str =
    "When should I move it to? Please include a time, like \"at 5 pm\" or \"in 2 hours\".";

/// Reply when there is no open task to modify.
pub const NOTHING_TO_MODIFY: &str =
    "I couldn't find a recent task to modify. Could you be more specific?";

/// Reply when there is no pending task to cancel.
pub const NOTHING_TO_CANCEL: &str = "I couldn't find a pending task to cancel.";

/// Reply to a location answer when nothing was waiting for one.
pub const NO_PENDING_LOCATION: &str =
    "Thanks! I don't have anything waiting on a location right now.";

fn local(ts: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    ts.with_timezone(&offset)
}

/// `05:30 PM on Mar 14`.
#[must_use]
pub fn short_time(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    local(ts, offset).format("%I:%M %p on %b %d").to_string()
}

/// Confirmation for one new task.
#[must_use]
pub fn task_confirmation(task: &Task, offset: FixedOffset, clarification: Option<&str>) -> String {
    let mut msg = format!(
        "✓ Task created: **{}**\n⏰ Reminder: {}\n📊 Priority: {}",
        task.title,
        local(task.due_at, offset).format("%I:%M %p on %b %d, %Y"),
        task.priority.label()
    );
    if let Some(question) = clarification {
        msg.push_str("\n\n❓ ");
        msg.push_str(question);
    }
    msg
}

/// Confirmation for several tasks created together.
#[must_use]
pub fn batch_confirmation(tasks: &[Task], offset: FixedOffset, clarification: Option<&str>) -> String {
    if let [task] = tasks {
        return task_confirmation(task, offset, clarification);
    }
    let mut msg = format!("✓ Created {} tasks:\n", tasks.len());
    for task in tasks {
        msg.push_str(&format!(
            "\n• **{}**\n   ⏰ {}",
            task.title,
            short_time(task.due_at, offset)
        ));
    }
    if let Some(question) = clarification {
        msg.push_str("\n\n❓ ");
        msg.push_str(question);
    }
    msg
}

/// Pending-task listing.
#[must_use]
pub fn task_list(tasks: &[Task], window: QueryWindow, offset: FixedOffset) -> String {
    if tasks.is_empty() {
        return format!("You have no pending tasks {}. All clear! 🎉", window.phrase());
    }
    let mut msg = format!("📋 You have {} pending task(s):\n\n", tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        msg.push_str(&format!(
            "{}. **{}**\n   ⏰ {}\n   📊 {}\n\n",
            i + 1,
            task.title,
            short_time(task.due_at, offset),
            task.priority.label()
        ));
    }
    msg
}

/// Confirmation for a moved task.
#[must_use]
pub fn updated(task: &Task, offset: FixedOffset) -> String {
    format!(
        "✓ Updated: {} is now scheduled for {}",
        task.title,
        short_time(task.due_at, offset)
    )
}

/// Confirmation for a cancelled task.
#[must_use]
pub fn cancelled(task: &Task) -> String {
    format!("🗑️ Task cancelled: {}", task.title)
}
