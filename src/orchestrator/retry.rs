//! Per job-kind retry policy evaluated by the job runner.

use chrono::Duration;

use crate::models::job::JobKind;

/// How the delay before the next attempt grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed {
        /// Delay in seconds.
        seconds: i64,
    },
    /// `base * 2^retries`.
    Exponential {
        /// Delay before the first retry, in seconds.
        base_seconds: i64,
    },
}

/// Retry budget and backoff for one job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay function.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy for a job kind.
    ///
    /// Intake retries back off from one minute, reminder dispatch retries
    /// every five minutes, escalation never retries.
    #[must_use]
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::MessageIntake => Self {
                max_retries: 3,
                backoff: Backoff::Exponential { base_seconds: 60 },
            },
            JobKind::ReminderDispatch => Self {
                max_retries: 5,
                backoff: Backoff::Fixed { seconds: 300 },
            },
            JobKind::Escalation => Self {
                max_retries: 0,
                backoff: Backoff::Fixed { seconds: 0 },
            },
        }
    }

    /// Delay before the next attempt, given `retries` already consumed.
    ///
    /// `None` means the budget is exhausted and the job is abandoned.
    #[must_use]
    pub fn next_delay(&self, retries: u32) -> Option<Duration> {
        if retries >= self.max_retries {
            return None;
        }
        let seconds = match self.backoff {
            Backoff::Fixed { seconds } => seconds,
            Backoff::Exponential { base_seconds } => {
                base_seconds.saturating_mul(2_i64.saturating_pow(retries))
            }
        };
        Some(Duration::seconds(seconds))
    }
}
