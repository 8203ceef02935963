mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use orderly_core::config::{AppConfig, LoadOptions};
use orderly_db::OrderFeed;
use orderly_engine::EngineEvent;

const FEED_POLL_INTERVAL: Duration = Duration::from_secs(2);
const STAGE_EVICTION_INTERVAL: Duration = Duration::from_secs(3_600);

fn init_logging(config: &AppConfig) {
    use orderly_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let mut app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    // Identify the bot so its own reactions and messages are dropped before
    // routing. Failure degrades to no filtering (offline development).
    match app.transport.current_user().await {
        Ok(me) => {
            tracing::info!(
                event_name = "system.server.identity_resolved",
                bot_user_id = me.id.0,
                "bot identity resolved"
            );
            app.engine.set_bot_user(me.id);
        }
        Err(error) => {
            tracing::warn!(
                event_name = "system.server.identity_unresolved",
                error = %error,
                "could not resolve bot identity; self-event filtering disabled"
            );
        }
    }

    // Insert feed: the listener task only enqueues; the engine loop is the
    // sole consumer of workflow state.
    let (feed_tx, mut feed_rx) = tokio::sync::mpsc::channel(64);
    OrderFeed::new(app.repository.clone(), feed_tx, FEED_POLL_INTERVAL, chrono::Utc::now())
        .spawn();
    let feed_handle = app.handle.clone();
    tokio::spawn(async move {
        while let Some(order) = feed_rx.recv().await {
            if !feed_handle.send(EngineEvent::OrderInserted(order)).await {
                return;
            }
        }
    });

    // Periodic work arrives through the same queue as everything else.
    app.handle.spawn_interval(
        Duration::from_secs(app.config.workflow.stale_sweep_interval_secs),
        EngineEvent::StaleSweep,
    );
    app.handle.spawn_interval(STAGE_EVICTION_INTERVAL, EngineEvent::EvictStages);

    tokio::spawn(app.engine.run(app.engine_receiver));

    tracing::info!(
        event_name = "system.server.gateway_transport_mode",
        transport_mode = if app.gateway.is_noop_transport() { "noop" } else { "gateway" },
        "gateway transport mode initialized"
    );
    app.gateway.start().await?;

    tracing::info!(event_name = "system.server.started", "orderly-server started");
    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "orderly-server stopping");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
