use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serenity::http::Http;
use tracing::{info, warn};

use muster_attendance::{InteractionGuard, Reconciler, ResponseRecorder, RosterRenderer};
use muster_core::config::MusterConfig;
use muster_core::render::Renderer;
use muster_countdown::{CountdownOptions, CountdownScheduler, SchedulerDeps, SystemClock};
use muster_discord::{DiscordAdapter, MusterContext, SerenityMessageStore};
use muster_health::{CircuitBreaker, RetryPolicy};
use muster_store::SqliteStore;

#[derive(Debug, Parser)]
#[command(name = "muster-bot", about = "Event countdowns and attendance rosters for Discord")]
struct Args {
    /// Config file; falls back to MUSTER_CONFIG, then ~/.muster/muster.toml.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "muster_bot=info,muster_countdown=info,muster_attendance=info,\
                 muster_health=info,muster_discord=info,serenity=warn"
                    .into()
            }),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.or_else(|| std::env::var("MUSTER_CONFIG").ok());
    let config = MusterConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        MusterConfig::default()
    });
    if config.discord.bot_token.trim().is_empty() {
        anyhow::bail!("discord.bot_token is not set (MUSTER_DISCORD__BOT_TOKEN)");
    }

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = rusqlite::Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    let store = Arc::new(SqliteStore::new(conn)?);
    info!("database migrations complete");

    let breaker = Arc::new(CircuitBreaker::from_config(&config.health));
    let retry = RetryPolicy::from_config(&config.retry);

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::clone(&breaker),
        retry.clone(),
    ));
    let recorder = Arc::new(ResponseRecorder::new(
        store.clone(),
        store.clone(),
        Arc::clone(&breaker),
        retry.clone(),
        Arc::clone(&reconciler),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let guard = Arc::new(InteractionGuard::from_config(
        store.clone(),
        Arc::clone(&breaker),
        &config.interactions,
    ));
    let sweeper = Arc::clone(&guard).spawn_sweeper(
        Duration::from_secs(config.interactions.sweep_interval_secs.max(1)),
        shutdown_rx,
    );

    // REST client for countdown edits; independent of the gateway session.
    let http = Arc::new(Http::new(&config.discord.bot_token));
    let renderer: Arc<dyn Renderer> = Arc::new(RosterRenderer);

    let scheduler = CountdownScheduler::new(
        SchedulerDeps {
            events: store.clone(),
            reconciler,
            renderer: Arc::clone(&renderer),
            messages: Arc::new(SerenityMessageStore::new(http)),
            breaker: Arc::clone(&breaker),
            retry,
            clock: Arc::new(SystemClock),
        },
        CountdownOptions::from_config(&config.countdown),
    );

    let ctx = Arc::new(MusterContext::new(
        scheduler.clone(),
        guard,
        recorder,
        renderer,
        config.countdown.default_timezone.clone(),
    ));
    let adapter = DiscordAdapter::new(&config.discord, ctx)?;
    tokio::spawn(adapter.run());
    info!("muster-bot running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.stop();
    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
