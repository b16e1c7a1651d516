#![forbid(unsafe_code)]

//! `kabanda`: a chat reminder assistant.
//!
//! Messages arrive over Slack, are turned into tasks by an intent
//! extractor, and reminders are delivered at the tasks' due times by a
//! persistent one-shot job scheduler. Ignored reminders escalate.

pub mod app;
pub mod channel;
pub mod config;
pub mod errors;
pub mod ingress;
pub mod intent;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod places;
pub mod router;
pub mod slack;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
