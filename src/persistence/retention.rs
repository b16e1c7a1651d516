//! Retention service for time-based data purge.
//!
//! Runs as a background task deleting idempotency records, finished
//! jobs, consumed batches and conversation entries older than
//! `retention_days`. Tasks and reminders are history and are kept.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::batch_repo::BatchRepo;
use super::conversation_repo::ConversationRepo;
use super::db::Database;
use super::idempotency_repo::IdempotencyRepo;
use super::job_repo::JobRepo;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Row counts removed by one purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Idempotency records.
    pub idempotency: u64,
    /// Done or failed jobs.
    pub jobs: u64,
    /// Consumed pending batches.
    pub batches: u64,
    /// Conversation log entries.
    pub conversation: u64,
}

/// Spawn the retention purge background task.
///
/// The task runs hourly, starting immediately.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db, retention_days, Utc::now()).await {
                        error!(?err, "retention purge failed");
                    }
                }
            }
        }
    })
}

/// Delete everything older than `retention_days` before `now`.
///
/// # Errors
///
/// Returns `AppError::Db` if any delete fails.
pub async fn purge(
    db: &Arc<Database>,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<PurgeReport> {
    let cutoff = now - chrono::Duration::days(i64::from(retention_days));

    let report = PurgeReport {
        idempotency: IdempotencyRepo::new(Arc::clone(db)).purge_before(cutoff).await?,
        jobs: JobRepo::new(Arc::clone(db)).purge_finished_before(cutoff).await?,
        batches: BatchRepo::new(Arc::clone(db)).purge_inactive_before(cutoff).await?,
        conversation: ConversationRepo::new(Arc::clone(db)).purge_before(cutoff).await?,
    };

    info!(
        retention_days,
        idempotency = report.idempotency,
        jobs = report.jobs,
        batches = report.batches,
        conversation = report.conversation,
        "retention purge completed"
    );
    Ok(report)
}
