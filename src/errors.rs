//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Slack API or Socket Mode failure.
    Slack(String),
    /// Notification channel temporarily unable to deliver.
    Channel(String),
    /// Intent extraction or place lookup service failure.
    External(String),
    /// An outbound call exceeded its time budget.
    Timeout(String),
    /// User input cannot be acted upon without clarification.
    InvalidInput(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Event or batch has already been consumed.
    AlreadyConsumed(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the scheduler may retry a job that failed with this error.
    ///
    /// Missing entities and unusable input never become valid by waiting,
    /// so retrying them only burns attempts.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Db(_) | Self::Slack(_) | Self::Channel(_) | Self::External(_) | Self::Timeout(_)
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Slack(msg) => write!(f, "slack: {msg}"),
            Self::Channel(msg) => write!(f, "channel: {msg}"),
            Self::External(msg) => write!(f, "external: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::AlreadyConsumed(msg) => write!(f, "already consumed: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::External(format!("malformed json: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::External(err.to_string())
        }
    }
}

/// Run an outbound call under a time budget.
///
/// # Errors
///
/// Returns `AppError::Timeout` naming `what` when `limit` elapses first,
/// otherwise whatever the call itself returns.
pub async fn bounded<T, F>(limit: std::time::Duration, what: &str, call: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!("{what} exceeded {}s", limit.as_secs()))),
    }
}
