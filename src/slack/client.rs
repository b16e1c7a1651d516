//! Slack Web API client and Socket Mode listener.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiChatUpdateRequest, SlackApiToken, SlackApiTokenType,
    SlackApiTokenValue, SlackBlock, SlackChannelId, SlackClient,
    SlackClientEventsListenerEnvironment, SlackClientHyperHttpsConnector, SlackClientSession,
    SlackClientSocketModeConfig, SlackClientSocketModeListener, SlackMessageContent,
    SlackSocketModeListenerCallbacks, SlackTs,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::app::AppState;
use crate::channel::{Button, LocationPin, NotificationChannel};
use crate::slack::{blocks, commands, events};
use crate::{config::SlackConfig, AppError, Result};

/// Where each pressed button's message lives, until the press is
/// acknowledged or dropped.
#[derive(Default)]
pub struct CallbackTargets {
    targets: Mutex<HashMap<String, (SlackChannelId, SlackTs)>>,
}

impl CallbackTargets {
    /// Remember the message a press came from.
    pub async fn register(&self, callback_id: &str, channel: SlackChannelId, ts: SlackTs) {
        self.targets
            .lock()
            .await
            .insert(callback_id.to_owned(), (channel, ts));
    }

    /// Remove and return the message for a press.
    pub async fn take(&self, callback_id: &str) -> Option<(SlackChannelId, SlackTs)> {
        self.targets.lock().await.remove(callback_id)
    }

    /// Presses still waiting for an acknowledgement.
    pub async fn pending(&self) -> usize {
        self.targets.lock().await.len()
    }
}

fn content(text: Option<String>, blocks: Option<Vec<SlackBlock>>) -> SlackMessageContent {
    SlackMessageContent {
        text,
        blocks,
        attachments: None,
        upload: None,
        files: None,
        reactions: None,
        metadata: None,
    }
}

fn slack_error(what: &str, err: &SlackClientError) -> AppError {
    match err {
        SlackClientError::RateLimitError(_) => AppError::Channel(format!("{what}: rate limited")),
        other => AppError::Slack(format!("{what}: {other}")),
    }
}

/// Slack transport: posts replies and reminders, and receives messages,
/// button presses and slash commands over Socket Mode.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
    app_token: SlackApiToken,
    callbacks: CallbackTargets,
}

impl SlackService {
    /// Build the Web API client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.bot_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::Bot),
        };
        let app_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.app_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::App),
        };
        Ok(Self {
            client,
            bot_token,
            app_token,
            callbacks: CallbackTargets::default(),
        })
    }

    /// Start the Socket Mode listener. Event handlers receive `state`.
    #[must_use]
    pub fn spawn_socket_mode(&self, state: Arc<AppState>) -> JoinHandle<()> {
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(state),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_command_events(commands::handle_command)
            .with_interaction_events(events::handle_interaction)
            .with_push_events(events::handle_push);
        let config = SlackClientSocketModeConfig {
            max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
            debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
            initial_backoff_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
            reconnect_timeout_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
            ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
            ping_failure_threshold_times:
                SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
        };

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        let app_token = self.app_token.clone();
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }

            listener.serve().await;
            info!("socket mode listener exited");
        })
    }

    /// Create an HTTP session for direct API calls using the bot token.
    #[must_use]
    pub fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    /// Post a message and return its timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` when rate limited, `AppError::Slack` on
    /// any other API failure.
    pub async fn post(&self, channel: &str, message: SlackMessageContent) -> Result<SlackTs> {
        let request = SlackApiChatPostMessageRequest {
            channel: SlackChannelId(channel.to_owned()),
            content: message,
            as_user: None,
            icon_emoji: None,
            icon_url: None,
            link_names: Some(true),
            parse: None,
            thread_ts: None,
            username: None,
            reply_broadcast: None,
            unfurl_links: None,
            unfurl_media: None,
        };
        let response = self
            .http_session()
            .chat_post_message(&request)
            .await
            .map_err(|err| slack_error("failed to post message", &err))?;
        debug!(channel, ts = %response.ts, "sent slack message");
        Ok(response.ts)
    }

    /// Update an existing Slack message (e.g., replace buttons with static text).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the Slack API call fails.
    pub async fn update_message(
        &self,
        channel: SlackChannelId,
        ts: SlackTs,
        blocks: Vec<SlackBlock>,
    ) -> Result<()> {
        let request = SlackApiChatUpdateRequest::new(channel, content(None, Some(blocks)), ts);
        self.http_session()
            .chat_update(&request)
            .await
            .map_err(|err| slack_error("failed to update message", &err))?;
        Ok(())
    }

    /// Messages of presses awaiting acknowledgement.
    #[must_use]
    pub fn callbacks(&self) -> &CallbackTargets {
        &self.callbacks
    }

    async fn acknowledge(&self, callback_id: &str, text: &str) -> Result<()> {
        let Some((channel, ts)) = self.callbacks.take(callback_id).await else {
            debug!(callback_id, "no message registered for callback");
            return Ok(());
        };
        self.update_message(channel, ts, vec![blocks::text_section(text)])
            .await
    }
}

impl NotificationChannel for SlackService {
    fn name(&self) -> &str {
        "slack"
    }

    fn send_text<'a>(
        &'a self,
        chat_id: &'a str,
        text: &'a str,
        buttons: &'a [Button],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let message = content(
                Some(text.to_owned()),
                Some(blocks::message_blocks(text, buttons)),
            );
            let ts = self.post(chat_id, message).await?;
            Ok(ts.to_string())
        })
    }

    fn send_location<'a>(
        &'a self,
        chat_id: &'a str,
        pin: &'a LocationPin,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let text = blocks::location_text(pin);
            let message = content(Some(text.clone()), Some(vec![blocks::text_section(&text)]));
            let ts = self.post(chat_id, message).await?;
            Ok(ts.to_string())
        })
    }

    fn ack_callback<'a>(
        &'a self,
        callback_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.acknowledge(callback_id, text))
    }
}
