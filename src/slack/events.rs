//! Slack push event and interaction handlers.
//!
//! Direct messages become [`InboundEvent`]s keyed by `channel:ts`, so a
//! redelivered event maps to the same external id. Reminder buttons
//! become [`CallbackEvent`]s keyed by the press's trigger id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackInteractionEvent, SlackMessageEvent, SlackPushEventCallback,
};
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::channel::parse_callback_payload;
use crate::ingress::{CallbackEvent, InboundEvent, Ingress};
use crate::slack::client::CallbackTargets;

async fn app_state(state: &SlackClientEventsUserState) -> Option<Arc<AppState>> {
    let guard = state.read().await;
    guard.get_user_state::<Arc<AppState>>().cloned()
}

/// Turn a Slack message event into an inbound event.
///
/// Bot messages, edits and other subtyped events yield `None`.
#[must_use]
pub fn inbound_from_message(message: &SlackMessageEvent) -> Option<InboundEvent> {
    if message.sender.bot_id.is_some() || message.subtype.is_some() {
        return None;
    }
    let channel = message.origin.channel.as_ref()?;
    let text = message
        .content
        .as_ref()
        .and_then(|c| c.text.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())?;
    Some(InboundEvent {
        external_message_id: format!("{}:{}", channel, message.origin.ts),
        chat_id: channel.to_string(),
        text: text.to_owned(),
    })
}

/// Handle push events (direct messages) delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; processing errors are logged.
pub async fn handle_push(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackEventCallbackBody::Message(message) = &event.event else {
        debug!("push event ignored");
        return Ok(());
    };
    let Some(inbound) = inbound_from_message(message) else {
        debug!("non-user message ignored");
        return Ok(());
    };
    let Some(app) = app_state(&state).await else {
        warn!("app state not available; cannot accept message");
        return Ok(());
    };

    if let Err(err) = app.ingress.accept_message(&inbound, Utc::now()).await {
        warn!(%err, external_id = %inbound.external_message_id, "failed to accept message");
    }
    Ok(())
}

/// Run a button press through ingress.
///
/// The pressed message's target is dropped unless the press produced an
/// acknowledgement, which consumes it.
pub async fn handle_press(
    ingress: &Ingress,
    targets: Option<&CallbackTargets>,
    callback: &CallbackEvent,
    now: DateTime<Utc>,
) -> Option<String> {
    let outcome = ingress.handle_callback(callback, now).await;
    let text = match outcome {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, callback_id = %callback.callback_id, "reminder button failed");
            None
        }
    };
    if text.is_none() {
        if let Some(targets) = targets {
            targets.take(&callback.callback_id).await;
        }
    }
    text
}

/// Handle reminder button presses delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; processing errors are logged.
pub async fn handle_interaction(
    event: SlackInteractionEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackInteractionEvent::BlockActions(block_event) = &event else {
        info!("unhandled interaction event type");
        return Ok(());
    };
    let Some(app) = app_state(&state).await else {
        warn!("app state not available; cannot process interaction");
        return Ok(());
    };
    let Some(channel) = block_event.channel.as_ref().map(|c| c.id.clone()) else {
        warn!("block action without channel; ignoring");
        return Ok(());
    };

    for action in block_event.actions.iter().flatten() {
        let action_id = action.action_id.to_string();
        let payload = action.value.clone().unwrap_or_else(|| action_id.clone());
        if parse_callback_payload(&payload).is_err() {
            warn!(action_id, "unknown block action");
            continue;
        }

        let callback_id = format!("{}:{action_id}", block_event.trigger_id);
        let targets = app.slack.as_ref().map(|slack| slack.callbacks());
        if let (Some(targets), Some(message)) = (targets, &block_event.message) {
            targets
                .register(&callback_id, channel.clone(), message.origin.ts.clone())
                .await;
        }
        let callback = CallbackEvent {
            callback_id,
            chat_id: channel.to_string(),
            payload,
        };
        info!(action_id, "dispatching reminder button");
        handle_press(&app.ingress, targets, &callback, Utc::now()).await;
    }
    Ok(())
}
