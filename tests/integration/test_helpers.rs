//! Shared test helpers for flow-level integration tests.
//!
//! Provides in-process stand-ins for the external collaborators and a
//! one-call construction of `AppState` over an in-memory database, so
//! individual test modules can focus on behaviour rather than wiring.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use kabanda::app::AppState;
use kabanda::channel::{Button, LocationPin, NotificationChannel};
use kabanda::config::GlobalConfig;
use kabanda::intent::{IntentContext, IntentExtractor, ParsedMessage};
use kabanda::models::owner::Owner;
use kabanda::models::task::Task;
use kabanda::orchestrator::runner::{JobHandler, JobRunner};
use kabanda::persistence::db;
use kabanda::persistence::owner_repo::OwnerRepo;
use kabanda::persistence::reminder_repo::ReminderRepo;
use kabanda::persistence::task_repo::TaskRepo;
use kabanda::places::{Place, PlaceResolver};
use kabanda::{AppError, Result};

/// Chat id used by the default test owner.
pub const CHAT: &str = "D_OWNER";

/// A message captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub chat_id: String,
    pub text: String,
    pub buttons: Vec<Button>,
}

/// Notification channel that records everything and can be told to fail.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Sent>>,
    pub locations: Mutex<Vec<LocationPin>>,
    pub acks: Mutex<Vec<(String, String)>>,
    fail_next: AtomicU32,
}

impl RecordingChannel {
    /// Make the next `n` text sends fail with a retryable error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.text.clone())
            .collect()
    }

    pub fn last(&self) -> Sent {
        self.sent.lock().unwrap().last().cloned().expect("a message was sent")
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "test"
    }

    fn send_text<'a>(
        &'a self,
        chat_id: &'a str,
        text: &'a str,
        buttons: &'a [Button],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let failing = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(AppError::Channel("simulated outage".into()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(Sent {
                chat_id: chat_id.to_owned(),
                text: text.to_owned(),
                buttons: buttons.to_vec(),
            });
            Ok(format!("msg-{}", sent.len()))
        })
    }

    fn send_location<'a>(
        &'a self,
        _chat_id: &'a str,
        pin: &'a LocationPin,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.locations.lock().unwrap().push(pin.clone());
            Ok("loc".to_owned())
        })
    }

    fn ack_callback<'a>(
        &'a self,
        callback_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.acks
                .lock()
                .unwrap()
                .push((callback_id.to_owned(), text.to_owned()));
            Ok(())
        })
    }
}

/// Extractor returning queued results; an empty queue fails, which sends
/// the router to the heuristic parser.
#[derive(Default)]
pub struct ScriptedIntents {
    queue: Mutex<VecDeque<ParsedMessage>>,
    pub calls: AtomicU32,
}

impl ScriptedIntents {
    pub fn push(&self, parsed: ParsedMessage) {
        self.queue.lock().unwrap().push_back(parsed);
    }
}

impl IntentExtractor for ScriptedIntents {
    fn parse<'a>(
        &'a self,
        _text: &'a str,
        _context: &'a IntentContext,
    ) -> Pin<Box<dyn Future<Output = Result<ParsedMessage>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queue
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::External("no scripted intent".into()))
        })
    }
}

/// Place resolver that knows one city and one venue.
pub struct FakePlaces {
    pub city: &'static str,
    pub coords: (f64, f64),
    pub venue: Place,
}

impl Default for FakePlaces {
    fn default() -> Self {
        Self {
            city: "kampala",
            coords: (0.3476, 32.5825),
            venue: Place {
                name: "Cafe Javas".into(),
                address: Some("Kampala Road".into()),
                rating: Some(4.5),
                ratings_total: Some(320),
                lat: 0.3136,
                lng: 32.5811,
            },
        }
    }
}

impl PlaceResolver for FakePlaces {
    fn geocode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(f64, f64)>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(text
                .to_lowercase()
                .contains(self.city)
                .then_some(self.coords))
        })
    }

    fn search_top_recommendation<'a>(
        &'a self,
        _query: &'a str,
        _lat: f64,
        _lng: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Place>>> + Send + 'a>> {
        Box::pin(async move { Ok(Some(self.venue.clone())) })
    }
}

/// Minimal config: UTC owners, short timeouts.
pub fn test_config() -> GlobalConfig {
    GlobalConfig::from_toml_str(
        r#"
utc_offset = "+00:00"
retention_days = 30

[scheduler]
poll_interval_ms = 50
workers = 2

[timeouts]
channel_seconds = 2
intent_seconds = 2
place_seconds = 2
"#,
    )
    .expect("valid test config")
}

/// 2026-03-14 08:00 UTC.
pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap()
}

/// Everything a flow test touches.
pub struct Harness {
    pub state: Arc<AppState>,
    pub runner: JobRunner,
    pub channel: Arc<RecordingChannel>,
    pub intents: Arc<ScriptedIntents>,
}

/// Build the app with places enabled.
pub async fn harness() -> Harness {
    build(Some(Arc::new(FakePlaces::default()))).await
}

/// Build the app without a place resolver.
pub async fn harness_without_places() -> Harness {
    build(None).await
}

async fn build(places: Option<Arc<dyn PlaceResolver>>) -> Harness {
    let config = Arc::new(test_config());
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let channel = Arc::new(RecordingChannel::default());
    let intents = Arc::new(ScriptedIntents::default());
    let state = Arc::new(AppState::build(
        Arc::clone(&config),
        db,
        Arc::clone(&channel) as Arc<dyn NotificationChannel>,
        Arc::clone(&intents) as Arc<dyn IntentExtractor>,
        places,
    ));
    let runner = JobRunner::new(
        &state.scheduler,
        Arc::clone(&state) as Arc<dyn JobHandler>,
        &config.scheduler,
    );
    Harness {
        state,
        runner,
        channel,
        intents,
    }
}

impl Harness {
    pub fn tasks(&self) -> TaskRepo {
        TaskRepo::new(Arc::clone(&self.state.db))
    }

    pub fn reminders(&self) -> ReminderRepo {
        ReminderRepo::new(Arc::clone(&self.state.db))
    }

    pub async fn owner(&self) -> Owner {
        OwnerRepo::new(Arc::clone(&self.state.db))
            .get_by_chat(CHAT)
            .await
            .expect("query")
            .expect("owner registered")
    }

    /// The owner's most recently created open task.
    pub async fn latest_task(&self) -> Task {
        let owner = self.owner().await;
        self.tasks()
            .most_recent_open(&owner.id)
            .await
            .expect("query")
            .expect("an open task")
    }

    /// Make `table` unreachable, so every statement touching it fails
    /// until [`Harness::restore_table`].
    pub async fn hide_table(&self, table: &str) {
        let sql = format!("ALTER TABLE {table} RENAME TO {table}_hidden");
        sqlx::query(&sql)
            .execute(self.state.db.as_ref())
            .await
            .expect("hide table");
    }

    pub async fn restore_table(&self, table: &str) {
        let sql = format!("ALTER TABLE {table}_hidden RENAME TO {table}");
        sqlx::query(&sql)
            .execute(self.state.db.as_ref())
            .await
            .expect("restore table");
    }

    /// Press a reminder button.
    pub async fn press(
        &self,
        callback_id: &str,
        action: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let event = kabanda::ingress::CallbackEvent {
            callback_id: callback_id.to_owned(),
            chat_id: CHAT.to_owned(),
            payload: format!("{action}_{task_id}"),
        };
        self.state
            .ingress
            .handle_callback(&event, now)
            .await
            .expect("callback")
    }

    /// Accept a message and run its intake job at `now`.
    pub async fn say(&self, external_id: &str, text: &str, now: DateTime<Utc>) -> String {
        let event = kabanda::ingress::InboundEvent {
            external_message_id: external_id.to_owned(),
            chat_id: CHAT.to_owned(),
            text: text.to_owned(),
        };
        self.state
            .ingress
            .accept_message(&event, now)
            .await
            .expect("accept");
        self.runner.run_due(now).await.expect("sweep");
        self.channel.last().text
    }

    /// Run every job due at `now`, repeating until a sweep does nothing.
    pub async fn drain(&self, now: DateTime<Utc>) -> usize {
        let mut total = 0;
        loop {
            let ran = self.runner.run_due(now).await.expect("sweep");
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}
