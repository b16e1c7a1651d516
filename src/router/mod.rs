//! Conversation router.
//!
//! Maps one inbound message from one owner to task mutations, scheduled
//! dispatch jobs and exactly one reply. Multi-task messages that need a
//! place the owner has not named are parked in a [`PendingBatch`] until
//! the owner answers with a location.

pub mod format;
pub mod window;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{GlobalConfig, TimeoutConfig};
use crate::errors::bounded;
use crate::intent::{heuristic, Intent, IntentContext, IntentExtractor, ParsedMessage, QueryWindow};
use crate::models::draft::TaskDraft;
use crate::models::job::ScheduledJob;
use crate::models::owner::{KnownLocation, Owner};
use crate::models::pending_batch::PendingBatch;
use crate::models::task::{Task, TaskStatus};
use crate::orchestrator::scheduler::Scheduler;
use crate::persistence::batch_repo::BatchRepo;
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::db::Database;
use crate::persistence::owner_repo::OwnerRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::places::{format_place, Place, PlaceResolver};
use crate::{AppError, Result};

/// Conversation entries passed to the extractor as context.
pub const HISTORY_LIMIT: u32 = 6;

/// The single response to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text to send.
    pub text: String,
    /// Intent label for the conversation log.
    pub intent: &'static str,
    /// Tasks created or touched.
    pub task_ids: Vec<String>,
}

impl Reply {
    fn new(text: impl Into<String>, intent: &'static str) -> Self {
        Self {
            text: text.into(),
            intent,
            task_ids: Vec::new(),
        }
    }

    fn with_tasks(mut self, tasks: &[Task]) -> Self {
        self.task_ids = tasks.iter().map(|t| t.id.clone()).collect();
        self
    }
}

/// Routes parsed intents to repository mutations and scheduling.
#[derive(Clone)]
pub struct Router {
    db: Arc<Database>,
    tasks: TaskRepo,
    batches: BatchRepo,
    owners: OwnerRepo,
    conversation: ConversationRepo,
    scheduler: Scheduler,
    intents: Arc<dyn IntentExtractor>,
    places: Option<Arc<dyn PlaceResolver>>,
    offset: FixedOffset,
    timeouts: TimeoutConfig,
}

impl Router {
    /// Create a router.
    #[must_use]
    pub fn new(
        db: &Arc<Database>,
        scheduler: Scheduler,
        intents: Arc<dyn IntentExtractor>,
        places: Option<Arc<dyn PlaceResolver>>,
        config: &GlobalConfig,
    ) -> Self {
        Self {
            db: Arc::clone(db),
            tasks: TaskRepo::new(Arc::clone(db)),
            batches: BatchRepo::new(Arc::clone(db)),
            owners: OwnerRepo::new(Arc::clone(db)),
            conversation: ConversationRepo::new(Arc::clone(db)),
            scheduler,
            intents,
            places,
            offset: config.offset(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Handle one message from `owner` received at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on storage failure. Extractor and place
    /// failures degrade to the heuristic parser and unenriched tasks.
    pub async fn handle(&self, owner: &Owner, text: &str, now: DateTime<Utc>) -> Result<Reply> {
        async {
            let pending = self.batches.active_for_owner(&owner.id).await?;
            let context = IntentContext {
                now: now.with_timezone(&self.offset),
                history: self.conversation.recent(&owner.id, HISTORY_LIMIT).await?,
                awaiting_location: pending.is_some(),
                home_location: owner.home_location.as_ref().map(|h| h.name.clone()),
            };
            let parsed = self.extract(text, &context).await;
            info!(intent = parsed.intent.label(), confidence = parsed.confidence, "intent extracted");

            let ParsedMessage {
                intent,
                clarification,
                location_prompt,
                ..
            } = parsed;
            match intent {
                Intent::NewTasks { drafts } => {
                    self.create_tasks(owner, drafts, text, clarification, location_prompt, now)
                        .await
                }
                Intent::LocationAnswer { text: answer } => match pending {
                    Some(batch) => self.resolve_batch(owner, batch, &answer, now).await,
                    None => Ok(Reply::new(format::NO_PENDING_LOCATION, "location_query_needed")),
                },
                Intent::ModifyTask { due_at } => self.modify(owner, due_at, now).await,
                Intent::DeleteTask => self.delete(owner, now).await,
                Intent::QueryTasks { window } => self.query(owner, window, now).await,
                Intent::General { response } => Ok(Reply::new(
                    response.unwrap_or_else(|| format::DEFAULT_GENERAL_REPLY.to_owned()),
                    "general_question",
                )),
            }
        }
        .instrument(info_span!("route", owner_id = %owner.id))
        .await
    }

    async fn extract(&self, text: &str, context: &IntentContext) -> ParsedMessage {
        match bounded(
            self.timeouts.intent(),
            "intent extraction",
            self.intents.parse(text, context),
        )
        .await
        {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "intent extraction failed, using heuristics");
                heuristic::parse(text, context)
            }
        }
    }

    async fn create_tasks(
        &self,
        owner: &Owner,
        mut drafts: Vec<TaskDraft>,
        source: &str,
        clarification: Option<String>,
        location_prompt: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Reply> {
        let needs_place = self.places.is_some() && drafts.iter().any(|d| d.requires_location);

        let mut found = vec![None; drafts.len()];
        if needs_place {
            let Some(home) = &owner.home_location else {
                let mut batch = PendingBatch::new(owner.id.clone(), drafts, source.to_owned());
                batch.created_at = now;
                self.batches.create(&batch).await?;
                info!(batch_id = %batch.id, "drafts held until the owner gives a location");
                let prompt = location_prompt.unwrap_or_else(|| format::DEFAULT_LOCATION_PROMPT.to_owned());
                return Ok(Reply::new(prompt, "location_query_needed"));
            };
            found = self.enrich(&mut drafts, home.lat, home.lng).await;
        }

        let batch_id = (drafts.len() > 1).then(|| Uuid::new_v4().to_string());
        let tasks = self
            .materialize(owner, drafts, &found, source, batch_id, None, now)
            .await?;
        let mut text = format::batch_confirmation(&tasks, self.offset, clarification.as_deref());
        append_places(&mut text, &found);
        let label = if tasks.len() > 1 { "new_tasks" } else { "new_task" };
        Ok(Reply::new(text, label).with_tasks(&tasks))
    }

    /// Turn a parked batch into tasks once the owner names a location.
    ///
    /// Lookups run first; the batch is consumed in the same transaction
    /// that stores its tasks, so a failure leaves it parked for the retry.
    async fn resolve_batch(
        &self,
        owner: &Owner,
        batch: PendingBatch,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<Reply> {
        let coords = match &self.places {
            Some(places) => match bounded(self.timeouts.place(), "geocode", places.geocode(answer)).await {
                Ok(coords) => coords,
                Err(err) => {
                    warn!(%err, "geocoding failed, creating tasks without a place");
                    None
                }
            },
            None => None,
        };

        let mut drafts = batch.drafts;
        let mut found = vec![None; drafts.len()];
        if let Some((lat, lng)) = coords {
            let home = KnownLocation {
                name: answer.to_owned(),
                lat,
                lng,
            };
            self.owners.set_home_location(&owner.id, &home).await?;
            found = self.enrich(&mut drafts, lat, lng).await;
        }

        let batch_id = (drafts.len() > 1).then(|| batch.id.clone());
        let created = self
            .materialize(
                owner,
                drafts,
                &found,
                &batch.source_message,
                batch_id,
                Some(&batch.id),
                now,
            )
            .await;
        let tasks = match created {
            Ok(tasks) => tasks,
            Err(AppError::AlreadyConsumed(_)) => {
                return Ok(Reply::new(format::NO_PENDING_LOCATION, "location_query_needed"));
            }
            Err(err) => return Err(err),
        };
        info!(batch_id = %batch.id, created = tasks.len(), "pending batch resolved");

        let mut text = format::batch_confirmation(&tasks, self.offset, None);
        append_places(&mut text, &found);
        Ok(Reply::new(text, "location_query_needed").with_tasks(&tasks))
    }

    /// Attach the top recommendation near `(lat, lng)` to every draft that
    /// needs a place. Returns the place found for each draft, by index.
    async fn enrich(&self, drafts: &mut [TaskDraft], lat: f64, lng: f64) -> Vec<Option<Place>> {
        let mut found = vec![None; drafts.len()];
        let Some(places) = &self.places else {
            return found;
        };
        for (idx, draft) in drafts.iter_mut().enumerate() {
            if !draft.requires_location {
                continue;
            }
            let query = draft.search_query().to_owned();
            let result = bounded(
                self.timeouts.place(),
                "place search",
                places.search_top_recommendation(&query, lat, lng),
            )
            .await;
            match result {
                Ok(Some(place)) => {
                    draft.title = format!("{} at {}", draft.title, place.name);
                    if !draft.description.is_empty() {
                        draft.description.push('\n');
                    }
                    draft.description.push_str(&format_place(&place));
                    draft.requires_location = false;
                    found[idx] = Some(place);
                }
                Ok(None) => info!(%query, "no place found"),
                Err(err) => warn!(%err, %query, "place search failed, task left unenriched"),
            }
        }
        found
    }

    /// Store one task and its dispatch job per draft, consuming
    /// `consumes` if given. Nothing is stored unless all of it is.
    #[allow(clippy::too_many_arguments)]
    async fn materialize(
        &self,
        owner: &Owner,
        drafts: Vec<TaskDraft>,
        places: &[Option<Place>],
        source: &str,
        batch_id: Option<String>,
        consumes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(drafts.len());
        for (idx, draft) in drafts.into_iter().enumerate() {
            let location = places.get(idx).and_then(|p| p.as_ref().map(Place::to_task_location));
            let mut task = Task::new(
                owner.id.clone(),
                draft.title,
                draft.due_at.with_timezone(&Utc),
                source.to_owned(),
            )
            .with_description(draft.description)
            .with_priority(draft.priority)
            .with_batch(batch_id.clone())
            .with_location(location);
            task.created_at = now;
            task.updated_at = now;

            let task = self.tasks.create_in(&mut tx, &task).await?;
            self.scheduler
                .schedule_in(
                    &mut tx,
                    ScheduledJob::dispatch(&task.id, task.due_at, task.reminder_count),
                )
                .await?;
            created.push(task);
        }
        if let Some(pending) = consumes {
            self.batches.consume(&mut tx, pending, now).await?;
        }
        tx.commit().await?;
        self.scheduler.wake();

        for task in &created {
            info!(task_id = %task.id, due_at = %task.due_at, "task created");
        }
        Ok(created)
    }

    async fn modify(
        &self,
        owner: &Owner,
        due_at: Option<DateTime<FixedOffset>>,
        now: DateTime<Utc>,
    ) -> Result<Reply> {
        let Some(due_at) = due_at else {
            return Ok(Reply::new(format::MODIFY_NEEDS_TIME, "modify_task"));
        };
        let Some(task) = self.tasks.most_recent_open(&owner.id).await? else {
            return Ok(Reply::new(format::NOTHING_TO_MODIFY, "modify_task"));
        };
        let Some(task) = self
            .tasks
            .reschedule(&task.id, due_at.with_timezone(&Utc), now)
            .await?
        else {
            return Ok(Reply::new(format::NOTHING_TO_MODIFY, "modify_task"));
        };
        self.scheduler
            .schedule_dispatch(&task.id, task.due_at, task.reminder_count)
            .await?;
        info!(task_id = %task.id, due_at = %task.due_at, "task rescheduled");
        Ok(Reply::new(format::updated(&task, self.offset), "modify_task").with_tasks(&[task]))
    }

    async fn delete(&self, owner: &Owner, now: DateTime<Utc>) -> Result<Reply> {
        let Some(task) = self
            .tasks
            .most_recent_with_status(&owner.id, TaskStatus::Pending)
            .await?
        else {
            return Ok(Reply::new(format::NOTHING_TO_CANCEL, "delete_task"));
        };
        if !self
            .tasks
            .transition(&task.id, TaskStatus::Pending, TaskStatus::Cancelled, now)
            .await?
        {
            return Ok(Reply::new(format::NOTHING_TO_CANCEL, "delete_task"));
        }
        info!(task_id = %task.id, "task cancelled");
        Ok(Reply::new(format::cancelled(&task), "delete_task").with_tasks(&[task]))
    }

    async fn query(&self, owner: &Owner, window: QueryWindow, now: DateTime<Utc>) -> Result<Reply> {
        let (from, until) = window::bounds(window, now.with_timezone(&self.offset));
        let tasks = self
            .tasks
            .list_pending_due_between(&owner.id, from, until)
            .await?;
        Ok(Reply::new(
            format::task_list(&tasks, window, self.offset),
            "query_tasks",
        ))
    }
}

fn append_places(text: &mut String, found: &[Option<Place>]) {
    for place in found.iter().flatten() {
        text.push_str("\n📍 ");
        text.push_str(&format_place(place));
    }
}
