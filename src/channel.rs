//! Notification channel abstraction and callback payloads.
//!
//! The [`NotificationChannel`] trait decouples reminder delivery and
//! conversation replies from the chat transport. Owners are addressed by
//! their transport chat identifier; registering owners on first contact
//! is the owner repository's job (see
//! [`OwnerRepo::get_or_create`](crate::persistence::owner_repo::OwnerRepo::get_or_create)).

use std::future::Future;
use std::pin::Pin;

use crate::{AppError, Result};

/// Interactive button attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Visible label.
    pub label: String,
    /// Callback payload returned when pressed (`action_taskId`).
    pub payload: String,
}

impl Button {
    /// Button that triggers `action` on `task_id`.
    #[must_use]
    pub fn for_task(label: &str, action: CallbackAction, task_id: &str) -> Self {
        Self {
            label: label.to_owned(),
            payload: format!("{}_{task_id}", action.as_str()),
        }
    }
}

/// Map pin sent alongside a reminder for a located task.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPin {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Place name.
    pub title: Option<String>,
    /// Street address.
    pub address: Option<String>,
}

/// Outbound side of the chat transport.
pub trait NotificationChannel: Send + Sync {
    /// Transport name recorded on reminder rows.
    fn name(&self) -> &str;

    /// Send a text message with optional buttons.
    ///
    /// Returns the transport's message identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` or `AppError::Slack` when the transport
    /// cannot deliver.
    fn send_text<'a>(
        &'a self,
        chat_id: &'a str,
        text: &'a str,
        buttons: &'a [Button],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Send a location widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` or `AppError::Slack` when the transport
    /// cannot deliver.
    fn send_location<'a>(
        &'a self,
        chat_id: &'a str,
        pin: &'a LocationPin,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Acknowledge a pressed button with a short text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` or `AppError::Slack` on transport failure.
    fn ack_callback<'a>(
        &'a self,
        callback_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Button actions available on reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Mark the task completed.
    Complete,
    /// Snooze the task for 30 minutes.
    Snooze,
    /// Cancel the task.
    Delete,
}

impl CallbackAction {
    /// Payload prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Snooze => "snooze",
            Self::Delete => "delete",
        }
    }
}

/// Split an `action_taskId` payload.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` for unknown actions or an empty task id.
pub fn parse_callback_payload(payload: &str) -> Result<(CallbackAction, String)> {
    let (action, task_id) = payload
        .split_once('_')
        .ok_or_else(|| AppError::InvalidInput(format!("malformed callback payload: {payload}")))?;
    let action = match action {
        "complete" => CallbackAction::Complete,
        "snooze" => CallbackAction::Snooze,
        "delete" => CallbackAction::Delete,
        other => {
            return Err(AppError::InvalidInput(format!("unknown callback action: {other}")));
        }
    };
    if task_id.is_empty() {
        return Err(AppError::InvalidInput("callback payload has no task id".into()));
    }
    Ok((action, task_id.to_owned()))
}
