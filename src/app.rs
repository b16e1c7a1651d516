//! Shared application state and job dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::channel::NotificationChannel;
use crate::config::GlobalConfig;
use crate::ingress::Ingress;
use crate::intent::IntentExtractor;
use crate::models::job::{JobKind, ScheduledJob};
use crate::orchestrator::dispatcher::Dispatcher;
use crate::orchestrator::runner::JobHandler;
use crate::orchestrator::scheduler::Scheduler;
use crate::persistence::db::Database;
use crate::places::PlaceResolver;
use crate::router::Router;
use crate::slack::client::SlackService;
use crate::{AppError, Result};

/// Everything request handlers and job bodies need.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// `SQLite` connection pool.
    pub db: Arc<Database>,
    /// Job scheduler.
    pub scheduler: Scheduler,
    /// Reminder and escalation bodies.
    pub dispatcher: Dispatcher,
    /// Inbound message and button handling.
    pub ingress: Ingress,
    /// Outbound transport.
    pub channel: Arc<dyn NotificationChannel>,
    /// Slack service, when the channel is Slack.
    pub slack: Option<Arc<SlackService>>,
}

impl AppState {
    /// Wire the application over an open database.
    #[must_use]
    pub fn build(
        config: Arc<GlobalConfig>,
        db: Arc<Database>,
        channel: Arc<dyn NotificationChannel>,
        intents: Arc<dyn IntentExtractor>,
        places: Option<Arc<dyn PlaceResolver>>,
    ) -> Self {
        let scheduler = Scheduler::new(Arc::clone(&db));
        let dispatcher = Dispatcher::new(
            &db,
            scheduler.clone(),
            Arc::clone(&channel),
            config.timeouts.channel(),
        );
        let router = Router::new(&db, scheduler.clone(), intents, places, &config);
        let ingress = Ingress::new(
            &db,
            router,
            scheduler.clone(),
            Arc::clone(&channel),
            Arc::clone(&config),
        );
        Self {
            config,
            db,
            scheduler,
            dispatcher,
            ingress,
            channel,
            slack: None,
        }
    }

    /// Attach the Slack service used for interactive callbacks.
    #[must_use]
    pub fn with_slack(mut self, slack: Arc<SlackService>) -> Self {
        self.slack = Some(slack);
        self
    }

    async fn run_job(&self, job: &ScheduledJob, now: DateTime<Utc>) -> Result<()> {
        match job.kind {
            JobKind::MessageIntake => {
                let outcome = self.ingress.process_intake(job, now).await?;
                debug!(?outcome, "intake finished");
            }
            JobKind::ReminderDispatch => {
                let outcome = self
                    .dispatcher
                    .dispatch(task_of(job)?, job.expected_count, now)
                    .await?;
                debug!(?outcome, "dispatch finished");
            }
            JobKind::Escalation => {
                let outcome = self
                    .dispatcher
                    .escalate(task_of(job)?, job.step, job.expected_count, now)
                    .await?;
                debug!(?outcome, "escalation finished");
            }
        }
        Ok(())
    }
}

fn task_of(job: &ScheduledJob) -> Result<&str> {
    job.task_id
        .as_deref()
        .ok_or_else(|| AppError::InvalidInput(format!("job {} has no task id", job.id)))
}

impl JobHandler for AppState {
    fn handle<'a>(
        &'a self,
        job: &'a ScheduledJob,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.run_job(job, now))
    }
}
