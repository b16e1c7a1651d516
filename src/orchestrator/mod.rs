//! Reminder scheduling modules.
//!
//! Covers job persistence and wake-up, the job runner with per-kind
//! retry, reminder dispatch, and the escalation policy.

pub mod dispatcher;
pub mod escalation;
pub mod retry;
pub mod runner;
pub mod scheduler;
