//! # Herald — Broadcast Bot
//!
//! Staged, confirmed, queued mass messaging over the Telegram Bot API.
//!
//! Usage:
//!   herald                         # Run with ~/.herald/config.toml
//!   herald --config ./herald.toml  # Explicit config path
//!   herald --verbose               # Debug logging

mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use herald_broadcast::{
    broadcast_queue, BroadcastRunner, ConfirmService, ProgressProjector, ReminderScheduler,
    StagingStore,
};
use herald_core::{AudienceResolver, HeraldConfig, HexIdGenerator, InMemoryAudience, Recipient, Transport};
use herald_telegram::{TelegramTransport, UpdatePoller};
use herald_workflow::broadcast_flow::broadcast_workflow;
use herald_workflow::WorkflowEngine;

use router::UpdateRouter;

#[derive(Parser)]
#[command(name = "herald", version, about = "📣 Herald — staged broadcast bot")]
struct Cli {
    /// Config file path (default: ~/.herald/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Seed the in-memory audience from ~/.herald/audience.json if present.
fn load_audience() -> Result<Arc<InMemoryAudience>> {
    let audience = Arc::new(InMemoryAudience::new());
    let path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".herald")
        .join("audience.json");
    if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let recipients: Vec<Recipient> =
            serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        for recipient in recipients {
            audience.insert(recipient);
        }
        tracing::info!("📇 Loaded {} recipients from {}", audience.len(), path.display());
    } else {
        tracing::warn!("📇 No audience file at {}; starting empty", path.display());
    }
    Ok(audience)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "herald=debug,herald_core=debug,herald_broadcast=debug,herald_workflow=debug,herald_telegram=debug"
    } else {
        "herald=info,herald_core=info,herald_broadcast=info,herald_workflow=info,herald_telegram=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => HeraldConfig::load_from(path)?,
        None => HeraldConfig::load()?,
    };
    if config.telegram.bot_token.is_empty() {
        bail!("No bot token configured. Set telegram.bot_token in the config file.");
    }
    if config.admins.is_empty() {
        tracing::warn!("⚠️ No admins configured; nobody can stage broadcasts");
    }

    let transport: Arc<TelegramTransport> =
        Arc::new(TelegramTransport::new(&config.telegram.bot_token));
    let transport_dyn: Arc<dyn Transport> = transport.clone();

    let me = transport.get_me().await.context("getMe failed; check the bot token")?;
    tracing::info!(
        "🤖 Running as @{} (id {})",
        me.username.as_deref().unwrap_or("?"),
        me.id
    );

    let audience = load_audience()?;
    let audience_dyn: Arc<dyn AudienceResolver> = audience;

    // Staging, reminders, progress: each owns a background loop.
    let staging = Arc::new(StagingStore::new(
        Arc::new(HexIdGenerator),
        config.broadcast.proposal_ttl(),
    ));
    staging.spawn_sweeper(std::time::Duration::from_secs(config.broadcast.staging_sweep_secs));

    let reminders = Arc::new(ReminderScheduler::new(
        transport_dyn.clone(),
        config.reminder.clone(),
    ));
    reminders.spawn_ticker();

    let progress = Arc::new(ProgressProjector::new(
        transport_dyn.clone(),
        std::time::Duration::from_secs(config.broadcast.progress_ttl_secs),
    ));
    progress.spawn_sweeper(std::time::Duration::from_secs(config.broadcast.progress_sweep_secs));

    // The queue and its single consumer.
    let (queue, rx) = broadcast_queue(config.broadcast.queue_capacity);
    let runner = BroadcastRunner::new(
        transport_dyn.clone(),
        audience_dyn.clone(),
        staging.clone(),
        progress.clone(),
        config.broadcast.progress_update_every,
    );
    tokio::spawn(runner.run(rx));

    let confirm = Arc::new(ConfirmService::new(
        staging.clone(),
        reminders.clone(),
        queue,
        transport_dyn.clone(),
    ));

    let mut engine = WorkflowEngine::new(std::time::Duration::from_secs(
        config.workflow.idle_timeout_secs,
    ));
    engine.register(broadcast_workflow(
        staging.clone(),
        reminders.clone(),
        transport_dyn.clone(),
        audience_dyn.clone(),
    ));
    let engine = Arc::new(engine);
    engine.spawn_sweeper(std::time::Duration::from_secs(config.workflow.sweep_secs));

    let router = UpdateRouter::new(
        engine,
        confirm,
        transport_dyn.clone(),
        config.admins.clone(),
    );

    tracing::info!("📣 Herald v{} polling for updates", env!("CARGO_PKG_VERSION"));
    let mut poller = UpdatePoller::new(transport.clone());
    loop {
        match poller.next_batch().await {
            Ok(updates) => {
                for update in updates {
                    router.handle(update).await;
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ getUpdates failed: {e}; retrying");
                tokio::time::sleep(std::time::Duration::from_secs(
                    config.telegram.poll_interval.max(1),
                ))
                .await;
            }
        }
    }
}
