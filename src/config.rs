//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which all secrets are stored.
const KEYRING_SERVICE: &str = "kabanda";

/// Slack connectivity settings.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

/// Job runner settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Sweep interval for due jobs when no wake-up arrives earlier.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of jobs executing concurrently.
    #[serde(default = "default_workers")]
    pub workers: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            workers: default_workers(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_workers() -> u32 {
    4
}

/// Time budgets (seconds) for calls to external collaborators.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Notification channel calls.
    #[serde(default = "default_channel_seconds")]
    pub channel_seconds: u64,
    /// Intent extraction calls.
    #[serde(default = "default_intent_seconds")]
    pub intent_seconds: u64,
    /// Geocoding and place search calls.
    #[serde(default = "default_place_seconds")]
    pub place_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            channel_seconds: default_channel_seconds(),
            intent_seconds: default_intent_seconds(),
            place_seconds: default_place_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Notification channel timeout as a [`Duration`].
    #[must_use]
    pub fn channel(&self) -> Duration {
        Duration::from_secs(self.channel_seconds)
    }

    /// Intent extraction timeout as a [`Duration`].
    #[must_use]
    pub fn intent(&self) -> Duration {
        Duration::from_secs(self.intent_seconds)
    }

    /// Place resolver timeout as a [`Duration`].
    #[must_use]
    pub fn place(&self) -> Duration {
        Duration::from_secs(self.place_seconds)
    }
}

fn default_channel_seconds() -> u64 {
    10
}

fn default_intent_seconds() -> u64 {
    30
}

fn default_place_seconds() -> u64 {
    10
}

/// Intent extraction service settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IntentConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_intent_endpoint")]
    pub endpoint: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_intent_model")]
    pub model: String,
    /// Bearer key (populated at runtime; empty means heuristic-only).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_intent_endpoint(),
            model: default_intent_model(),
            api_key: String::new(),
        }
    }
}

fn default_intent_endpoint() -> String {
    "https://api.x.ai/v1/chat/completions".into()
}

fn default_intent_model() -> String {
    "grok-3-mini".into()
}

/// Place lookup settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PlacesConfig {
    /// Nearby search radius.
    #[serde(default = "default_search_radius")]
    pub search_radius_meters: u32,
    /// API key (populated at runtime; empty disables enrichment).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            search_radius_meters: default_search_radius(),
            api_key: String::new(),
        }
    }
}

fn default_search_radius() -> u32 {
    5000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/kabanda.db")
}

fn default_utc_offset() -> String {
    "+03:00".into()
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Owners' fixed UTC offset, e.g. `+03:00`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    /// Days before idempotency records, finished jobs and logs are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Job runner settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// External call timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Intent extraction settings.
    #[serde(default)]
    pub intent: IntentConfig,
    /// Place lookup settings.
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(skip)]
    offset: Option<FixedOffset>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load secrets from OS keychain with env-var fallback.
    ///
    /// Slack tokens are mandatory. Intent and places keys are optional:
    /// without them the heuristic extractor is used and place enrichment
    /// is skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a Slack token cannot be found.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        self.intent.api_key = load_credential("intent_api_key", "INTENT_API_KEY")
            .await
            .unwrap_or_else(|err| {
                warn!(%err, "intent api key missing; heuristic extraction only");
                String::new()
            });
        self.places.api_key = load_credential("places_api_key", "PLACES_API_KEY")
            .await
            .unwrap_or_else(|err| {
                warn!(%err, "places api key missing; location enrichment disabled");
                String::new()
            });
        Ok(())
    }

    /// Owners' fixed UTC offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset.unwrap_or_else(|| Utc.fix())
    }

    fn validate(&mut self) -> Result<()> {
        if self.scheduler.workers == 0 {
            return Err(AppError::Config("scheduler.workers must be greater than zero".into()));
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "scheduler.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.retention_days == 0 {
            return Err(AppError::Config("retention_days must be greater than zero".into()));
        }
        self.offset = Some(parse_offset(&self.utc_offset)?);
        Ok(())
    }
}

/// Parse a `+HH:MM` / `-HH:MM` offset string.
///
/// # Errors
///
/// Returns `AppError::Config` for malformed or out-of-range offsets.
pub fn parse_offset(raw: &str) -> Result<FixedOffset> {
    let invalid = || AppError::Config(format!("invalid utc_offset: {raw}"));
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
