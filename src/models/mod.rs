//! Domain model module declarations.

pub mod conversation;
pub mod draft;
pub mod idempotency;
pub mod job;
pub mod owner;
pub mod pending_batch;
pub mod reminder;
pub mod task;
