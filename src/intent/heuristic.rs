//! Keyword and regex intent extraction.
//!
//! Used on its own when no extraction service is configured and as the
//! fallback whenever the service fails. It understands relative times
//! ("in 20 mins", "in 2 hours") and clock times ("at 7", "at 5:30 pm").

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Timelike};
use regex::Regex;

use super::{
    default_due, Intent, IntentContext, IntentExtractor, ParsedMessage, QueryWindow,
    DEFAULT_TIME_CLARIFICATION,
};
use crate::models::draft::TaskDraft;
use crate::models::task::Priority;
use crate::Result;

const DELETE_WORDS: &[&str] = &["delete", "cancel", "remove", "forget"];
const MODIFY_WORDS: &[&str] = &["move ", "change ", "update ", "reschedule", "push "];
const QUERY_PHRASES: &[&str] = &[
    "what do i have",
    "what's on",
    "whats on",
    "list my tasks",
    "my tasks",
    "my schedule",
    "show my",
];
const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "who are you",
    "thanks",
    "thank you",
    "good morning",
    "good evening",
];
const PLACE_WORDS: &[&str] = &[
    "find me",
    "place",
    "restaurant",
    "dinner spot",
    "lunch spot",
    "hangout",
    "bar ",
    "cafe",
    "spot for",
];
const URGENT_WORDS: &[&str] = &["asap", "urgent", "immediately", "right now"];
const HIGH_WORDS: &[&str] = &["important", "don't forget", "dont forget"];
const LEAD_INS: &[&str] = &["remind me to ", "remind me ", "find me ", "please "];

#[allow(clippy::expect_used)] // Patterns are literals; a typo fails every test.
fn pattern(cell: &'static OnceLock<Regex>, src: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(src).expect("valid regex"))
}

fn minutes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"(?i)\bin (\d+) ?(?:mins?|minutes?)\b")
}

fn hours_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"(?i)\bin (\d+) ?(?:hrs?|hours?)\b")
}

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"(?i)\bat (\d{1,2})(?::(\d{2}))? ?(am|pm)?\b")
}

/// Extractor that never calls out.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicIntentExtractor;

impl IntentExtractor for HeuristicIntentExtractor {
    fn parse<'a>(
        &'a self,
        text: &'a str,
        context: &'a IntentContext,
    ) -> Pin<Box<dyn Future<Output = Result<ParsedMessage>> + Send + 'a>> {
        Box::pin(async move { Ok(parse(text, context)) })
    }
}

/// Classify `text` without any external service.
#[must_use]
pub fn parse(text: &str, context: &IntentContext) -> ParsedMessage {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    if context.awaiting_location {
        return ParsedMessage::new(Intent::LocationAnswer {
            text: trimmed.to_owned(),
        });
    }

    if contains_any(&lower, DELETE_WORDS) {
        return ParsedMessage::new(Intent::DeleteTask);
    }

    if contains_any(&lower, QUERY_PHRASES) {
        return ParsedMessage::new(Intent::QueryTasks {
            window: window_from(&lower),
        });
    }

    if contains_any(&lower, MODIFY_WORDS) {
        let due_at = extract_time(trimmed, context.now).map(|(due, _)| due);
        let mut parsed = ParsedMessage::new(Intent::ModifyTask { due_at });
        parsed.confidence = 0.5;
        return parsed;
    }

    let bare = lower.trim_end_matches(['!', '.', '?']);
    if GREETINGS.contains(&bare) {
        return ParsedMessage::new(Intent::General { response: None });
    }

    let (due_at, clarification, time_span) = match extract_time(trimmed, context.now) {
        Some((due, span)) => (due, None, Some(span)),
        None => (
            default_due(context.now),
            Some(DEFAULT_TIME_CLARIFICATION.to_owned()),
            None,
        ),
    };

    let title = title_from(trimmed, time_span);
    let mut draft = TaskDraft::new(title, due_at);
    draft.priority = priority_from(&lower);
    if contains_any(&lower, PLACE_WORDS) {
        let query = draft.title.clone();
        draft = draft.needing_location(query);
    }

    ParsedMessage {
        intent: Intent::NewTasks {
            drafts: vec![draft],
        },
        confidence: 0.5,
        clarification,
        location_prompt: None,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn window_from(lower: &str) -> QueryWindow {
    if lower.contains("morning") {
        QueryWindow::Morning
    } else if lower.contains("afternoon") {
        QueryWindow::Afternoon
    } else if lower.contains("evening") || lower.contains("tonight") {
        QueryWindow::Evening
    } else if lower.contains("week") {
        QueryWindow::Week
    } else if lower.contains("upcoming") || lower.contains("coming up") {
        QueryWindow::Upcoming
    } else if lower.contains("all") {
        QueryWindow::All
    } else {
        QueryWindow::Today
    }
}

fn priority_from(lower: &str) -> Priority {
    if contains_any(lower, URGENT_WORDS) {
        Priority::Urgent
    } else if contains_any(lower, HIGH_WORDS) {
        Priority::High
    } else {
        Priority::Medium
    }
}

/// Find a time phrase. Returns the due time and the byte span matched.
///
/// Clock times without am/pm that have already passed today are read as
/// afternoon/evening first, then as tomorrow. Relative offsets too large
/// to represent count as no time at all.
#[must_use]
pub fn extract_time(
    text: &str,
    now: DateTime<FixedOffset>,
) -> Option<(DateTime<FixedOffset>, (usize, usize))> {
    if let Some(caps) = minutes_re().captures(text) {
        let whole = caps.get(0)?;
        let minutes: i64 = caps.get(1)?.as_str().parse().ok()?;
        let due = now.checked_add_signed(Duration::try_minutes(minutes)?)?;
        return Some((due, (whole.start(), whole.end())));
    }
    if let Some(caps) = hours_re().captures(text) {
        let whole = caps.get(0)?;
        let hours: i64 = caps.get(1)?.as_str().parse().ok()?;
        let due = now.checked_add_signed(Duration::try_hours(hours)?)?;
        return Some((due, (whole.start(), whole.end())));
    }
    let caps = clock_re().captures(text)?;
    let whole = caps.get(0)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let meridiem = caps.get(3).map(|m| m.as_str().to_ascii_lowercase());
    match meridiem.as_deref() {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let mut due = now
        .date_naive()
        .and_time(time)
        .and_local_timezone(*now.offset())
        .single()?;
    if due <= now && meridiem.is_none() && hour < 12 {
        due += Duration::hours(12);
    }
    if due <= now {
        due += Duration::days(1);
    }
    Some((due.with_nanosecond(0)?, (whole.start(), whole.end())))
}

fn title_from(text: &str, time_span: Option<(usize, usize)>) -> String {
    let mut title = match time_span {
        Some((start, end)) => format!("{} {}", &text[..start], &text[end..]),
        None => text.to_owned(),
    };
    title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = title.to_lowercase();
    if let Some(lead) = LEAD_INS.iter().find(|lead| lower.starts_with(*lead)) {
        title = title[lead.len()..].to_owned();
    }
    let title = title.trim_end_matches(['.', '!', ',', ' ']).trim();
    let title = if title.is_empty() { text.trim() } else { title };
    title.chars().take(100).collect()
}
