//! `/remind` slash command.
//!
//! The command text is handled exactly like a direct message; the
//! trigger id serves as the external message id.

use std::sync::Arc;

use chrono::Utc;
use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector, SlackCommandEvent,
    SlackCommandEventResponse, SlackMessageContent, SlackMessageResponseType,
};
use tracing::{info, warn};

use crate::app::AppState;
use crate::ingress::InboundEvent;

/// Ephemeral reply when `/remind` has no text.
pub const USAGE: &str = "Usage: /remind <what and when>, e.g. /remind call mom in 20 mins";

/// Ephemeral reply once the command is queued.
pub const ACCEPTED: &str = "Got it, working on it…";

fn ephemeral(text: &str) -> SlackCommandEventResponse {
    SlackCommandEventResponse {
        content: SlackMessageContent {
            text: Some(text.to_owned()),
            blocks: None,
            attachments: None,
            upload: None,
            files: None,
            reactions: None,
            metadata: None,
        },
        response_type: Some(SlackMessageResponseType::Ephemeral),
    }
}

/// Handle incoming slash commands routed via Socket Mode.
///
/// # Errors
///
/// Returns an error if the command response cannot be constructed.
pub async fn handle_command(
    event: SlackCommandEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::AnyStdResult<SlackCommandEventResponse> {
    info!(command = ?event.command, user = ?event.user_id, "received slash command");

    let text = event.text.as_deref().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Ok(ephemeral(USAGE));
    }

    let app: Option<Arc<AppState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<AppState>>().cloned()
    };
    let Some(app) = app else {
        warn!("app state not available; cannot accept command");
        return Ok(ephemeral("Not ready yet, please try again shortly."));
    };

    let inbound = InboundEvent {
        external_message_id: format!("cmd:{}", event.trigger_id),
        chat_id: event.channel_id.to_string(),
        text: text.to_owned(),
    };
    if let Err(err) = app.ingress.accept_message(&inbound, Utc::now()).await {
        warn!(%err, "failed to accept slash command");
        return Ok(ephemeral("Something went wrong, please try again."));
    }
    Ok(ephemeral(ACCEPTED))
}
