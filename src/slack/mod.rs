//! Slack transport.

pub mod blocks;
pub mod client;
pub mod commands;
pub mod events;
