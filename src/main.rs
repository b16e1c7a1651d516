#![forbid(unsafe_code)]

//! `kabanda`: reminder assistant server binary.
//!
//! Bootstraps configuration, opens the database, recovers interrupted
//! jobs, starts the job runner and retention purge, and connects to Slack
//! over Socket Mode.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use kabanda::app::AppState;
use kabanda::channel::NotificationChannel;
use kabanda::config::GlobalConfig;
use kabanda::intent::heuristic::HeuristicIntentExtractor;
use kabanda::intent::http::HttpIntentExtractor;
use kabanda::intent::IntentExtractor;
use kabanda::orchestrator::runner::{JobHandler, JobRunner};
use kabanda::persistence::{db, retention};
use kabanda::places::google::GooglePlaceResolver;
use kabanda::places::PlaceResolver;
use kabanda::slack::client::SlackService;
use kabanda::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "kabanda", about = "Chat reminder assistant", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the database path from the configuration.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("kabanda server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(path) = args.db {
        config.db_path = path;
    }
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(path = %config.db_path.display(), "database connected");

    // ── Collaborators ───────────────────────────────────
    let slack = Arc::new(SlackService::new(&config.slack).map_err(|err| {
        error!(%err, "slack client init failed");
        err
    })?);
    let channel: Arc<dyn NotificationChannel> = Arc::clone(&slack) as Arc<dyn NotificationChannel>;
    let intents = build_intents(&config);
    let places = build_places(&config);

    let state = Arc::new(
        AppState::build(Arc::clone(&config), Arc::clone(&db), channel, intents, places)
            .with_slack(Arc::clone(&slack)),
    );

    // ── Recover and start background services ───────────
    let ct = CancellationToken::new();
    let runner = JobRunner::new(
        &state.scheduler,
        Arc::clone(&state) as Arc<dyn JobHandler>,
        &config.scheduler,
    );
    runner.recover(Utc::now()).await?;
    let runner_handle = runner.spawn(ct.clone());
    info!("job runner started");

    let retention_handle =
        retention::spawn_retention_task(Arc::clone(&db), config.retention_days, ct.clone());
    info!("retention service started");

    let socket_handle = slack.spawn_socket_mode(Arc::clone(&state));
    info!("slack socket mode started");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();
    socket_handle.abort();

    let _ = tokio::join!(runner_handle, retention_handle);
    db.close().await;
    info!("kabanda shut down");

    Ok(())
}

fn build_intents(config: &GlobalConfig) -> Arc<dyn IntentExtractor> {
    if config.intent.api_key.is_empty() {
        return Arc::new(HeuristicIntentExtractor);
    }
    match HttpIntentExtractor::new(&config.intent, config.timeouts.intent()) {
        Ok(extractor) => Arc::new(extractor),
        Err(err) => {
            warn!(%err, "intent service unavailable; heuristic extraction only");
            Arc::new(HeuristicIntentExtractor)
        }
    }
}

fn build_places(config: &GlobalConfig) -> Option<Arc<dyn PlaceResolver>> {
    if config.places.api_key.is_empty() {
        return None;
    }
    match GooglePlaceResolver::new(&config.places, config.timeouts.place()) {
        Ok(resolver) => Some(Arc::new(resolver)),
        Err(err) => {
            warn!(%err, "place resolver unavailable; location enrichment disabled");
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
