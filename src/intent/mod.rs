//! Intent extraction boundary.
//!
//! Extractors turn a chat message into a [`ParsedMessage`] carrying one
//! variant of the closed [`Intent`] union. Loosely typed service output
//! is validated into that union exactly once, in [`IntentPayload::validate`];
//! everything downstream matches on variants only.

pub mod heuristic;
pub mod http;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Duration, FixedOffset};
use serde::Deserialize;

use crate::models::conversation::ConversationEntry;
use crate::models::draft::TaskDraft;
use crate::models::idempotency::Direction;
use crate::models::task::Priority;
use crate::{AppError, Result};

/// Clarification asked when no due time could be read from the message.
pub const DEFAULT_TIME_CLARIFICATION: &str = "Could you specify when you want to be reminded?";

/// Hours from now used when a task has no usable due time.
pub const DEFAULT_DUE_HOURS: i64 = 2;

/// Time window for task queries, in the owner's offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryWindow {
    /// Rest of today's calendar day.
    #[default]
    Today,
    /// Today 00:00 to 12:00.
    Morning,
    /// Today 12:00 to 18:00.
    Afternoon,
    /// Today 18:00 to midnight.
    Evening,
    /// Next 7 days.
    Week,
    /// Next 30 days.
    Upcoming,
    /// Everything from now on.
    All,
}

impl QueryWindow {
    /// Parse a window label, defaulting to `Today`.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "morning" => Self::Morning,
            "afternoon" => Self::Afternoon,
            "evening" | "tonight" => Self::Evening,
            "week" | "this_week" => Self::Week,
            "upcoming" => Self::Upcoming,
            "all" => Self::All,
            _ => Self::Today,
        }
    }

    /// Phrase used in "no pending tasks ..." replies.
    #[must_use]
    pub fn phrase(self) -> &'static str {
        match self {
            Self::Today => "for today",
            Self::Morning => "this morning",
            Self::Afternoon => "this afternoon",
            Self::Evening => "this evening",
            Self::Week => "this week",
            Self::Upcoming => "coming up",
            Self::All => "at all",
        }
    }
}

/// What the owner wants.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Create one task, or several sharing a batch id.
    NewTasks {
        /// Drafts in message order; never empty.
        drafts: Vec<TaskDraft>,
    },
    /// The message answers an earlier "where are you?" prompt.
    LocationAnswer {
        /// The owner's answer, e.g. a town name.
        text: String,
    },
    /// Move the most recent open task.
    ModifyTask {
        /// New due time, if the message had one.
        due_at: Option<DateTime<FixedOffset>>,
    },
    /// Cancel the most recent pending task.
    DeleteTask,
    /// List pending tasks in a window.
    QueryTasks {
        /// Requested window.
        window: QueryWindow,
    },
    /// Anything else.
    General {
        /// Reply proposed by the extractor.
        response: Option<String>,
    },
}

impl Intent {
    /// Label stored in the conversation log.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NewTasks { drafts } if drafts.len() > 1 => "new_tasks",
            Self::NewTasks { .. } => "new_task",
            Self::LocationAnswer { .. } => "location_query_needed",
            Self::ModifyTask { .. } => "modify_task",
            Self::DeleteTask => "delete_task",
            Self::QueryTasks { .. } => "query_tasks",
            Self::General { .. } => "general_question",
        }
    }
}

/// Validated extractor output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    /// The intent.
    pub intent: Intent,
    /// Extractor confidence in `[0, 1]`.
    pub confidence: f32,
    /// Question to append to the reply.
    pub clarification: Option<String>,
    /// Prompt to send when a location must be asked for.
    pub location_prompt: Option<String>,
}

impl ParsedMessage {
    /// Wrap an intent with full confidence and no extras.
    #[must_use]
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            confidence: 1.0,
            clarification: None,
            location_prompt: None,
        }
    }
}

/// What an extractor knows besides the message itself.
#[derive(Debug, Clone)]
pub struct IntentContext {
    /// Current time in the owner's offset.
    pub now: DateTime<FixedOffset>,
    /// Recent conversation, oldest first.
    pub history: Vec<ConversationEntry>,
    /// Whether the last reply asked the owner where they are.
    pub awaiting_location: bool,
    /// Name of the owner's remembered area.
    pub home_location: Option<String>,
}

impl IntentContext {
    /// Context with no history.
    #[must_use]
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self {
            now,
            history: Vec::new(),
            awaiting_location: false,
            home_location: None,
        }
    }

    /// Render history as "User: …" / "Assistant: …" lines.
    #[must_use]
    pub fn history_text(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }
        let mut out = String::from("Recent conversation:");
        for entry in &self.history {
            let who = match entry.direction {
                Direction::Incoming => "User",
                Direction::Outgoing => "Assistant",
            };
            out.push('\n');
            out.push_str(who);
            out.push_str(": ");
            out.push_str(&entry.content);
        }
        out
    }
}

/// Turns a message into an intent.
pub trait IntentExtractor: Send + Sync {
    /// Parse `text` given `context`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::External` or `AppError::Timeout` when the backing
    /// service fails; callers fall back to the heuristic extractor.
    fn parse<'a>(
        &'a self,
        text: &'a str,
        context: &'a IntentContext,
    ) -> Pin<Box<dyn Future<Output = Result<ParsedMessage>> + Send + 'a>>;
}

/// Task draft as returned by an extraction service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DraftPayload {
    /// Title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Priority label.
    pub priority: Option<String>,
    /// ISO-8601 due time.
    pub due_at: Option<String>,
    /// Whether a place must be found.
    pub requires_location: bool,
    /// Place search text.
    pub location_query: Option<String>,
    /// Place category.
    pub location_type: Option<String>,
}

/// Loosely typed extraction service output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntentPayload {
    /// Intent label.
    pub intent: String,
    /// Task drafts.
    pub tasks: Vec<DraftPayload>,
    /// Query window label.
    pub query_type: Option<String>,
    /// Confidence.
    pub confidence: Option<f32>,
    /// Clarifying question.
    pub clarification_needed: Option<String>,
    /// Conversational reply.
    pub conversational_response: Option<String>,
    /// Whether the drafts need a location from the owner.
    pub needs_location_input: bool,
    /// Question asking for the location.
    pub location_prompt: Option<String>,
    /// Legacy single-task title.
    pub task_title: Option<String>,
    /// Legacy single-task description.
    pub task_description: Option<String>,
    /// Legacy single-task due time.
    pub due_datetime: Option<String>,
    /// Legacy single-task priority.
    pub priority: Option<String>,
}

impl IntentPayload {
    /// Validate into a [`ParsedMessage`].
    ///
    /// Drafts with a missing or unreadable due time get `now + 2h` and a
    /// clarification question. `text` is the original message, used as
    /// the location answer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a task intent without any
    /// titled task.
    pub fn validate(self, text: &str, now: DateTime<FixedOffset>) -> Result<ParsedMessage> {
        let mut clarification = self.clarification_needed.filter(|c| !c.trim().is_empty());
        let confidence = self.confidence.unwrap_or(0.5).clamp(0.0, 1.0);

        let intent = match self.intent.trim() {
            "new_task" | "new_tasks" => {
                let mut raw = self.tasks;
                if raw.is_empty() {
                    if let Some(title) = self.task_title {
                        raw.push(DraftPayload {
                            title: Some(title),
                            description: self.task_description,
                            priority: self.priority,
                            due_at: self.due_datetime,
                            ..DraftPayload::default()
                        });
                    }
                }
                let mut drafts = Vec::with_capacity(raw.len());
                for payload in raw {
                    let (draft, missing_time) = draft_from_payload(payload, now)?;
                    if missing_time && clarification.is_none() {
                        clarification = Some(DEFAULT_TIME_CLARIFICATION.to_owned());
                    }
                    drafts.push(draft);
                }
                if drafts.is_empty() {
                    return Err(AppError::InvalidInput("task intent without a task".into()));
                }
                if self.needs_location_input && !drafts.iter().any(|d| d.requires_location) {
                    for draft in &mut drafts {
                        draft.requires_location = true;
                    }
                }
                Intent::NewTasks { drafts }
            }
            "location_query_needed" | "location_answer" => Intent::LocationAnswer {
                text: text.trim().to_owned(),
            },
            "modify_task" => {
                let raw_due = self
                    .tasks
                    .into_iter()
                    .find_map(|t| t.due_at)
                    .or(self.due_datetime);
                Intent::ModifyTask {
                    due_at: raw_due.and_then(|raw| parse_due(&raw, now)),
                }
            }
            "delete_task" => Intent::DeleteTask,
            "query_tasks" => Intent::QueryTasks {
                window: self
                    .query_type
                    .as_deref()
                    .map(QueryWindow::parse_lenient)
                    .unwrap_or_default(),
            },
            _ => Intent::General {
                response: self.conversational_response.filter(|r| !r.trim().is_empty()),
            },
        };

        Ok(ParsedMessage {
            intent,
            confidence,
            clarification,
            location_prompt: self.location_prompt.filter(|p| !p.trim().is_empty()),
        })
    }
}

fn draft_from_payload(
    payload: DraftPayload,
    now: DateTime<FixedOffset>,
) -> Result<(TaskDraft, bool)> {
    let title = payload
        .title
        .map(|t| t.trim().chars().take(100).collect::<String>())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::InvalidInput("task draft without a title".into()))?;

    let parsed_due = payload.due_at.as_deref().and_then(|raw| parse_due(raw, now));
    let missing_time = parsed_due.is_none();
    let due_at = parsed_due.unwrap_or_else(|| default_due(now));

    let mut draft = TaskDraft::new(title, due_at);
    draft.description = payload.description.unwrap_or_default();
    draft.priority = payload
        .priority
        .as_deref()
        .map(Priority::parse_lenient)
        .unwrap_or_default();
    draft.requires_location = payload.requires_location;
    draft.location_query = payload.location_query.filter(|q| !q.trim().is_empty());
    draft.location_type = payload.location_type.filter(|t| !t.trim().is_empty());
    Ok((draft, missing_time))
}

/// Parse an ISO-8601 instant and express it in `now`'s offset.
///
/// Naive timestamps (no offset) are read in that offset too.
#[must_use]
pub fn parse_due(raw: &str, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(now.offset()));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()
        .and_then(|naive| naive.and_local_timezone(*now.offset()).single())
}

/// Due time used when a message carries none.
#[must_use]
pub fn default_due(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now + Duration::hours(DEFAULT_DUE_HOURS)
}
