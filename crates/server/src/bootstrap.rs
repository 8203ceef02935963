use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use orderly_chat::events::ChatEvent;
use orderly_chat::gateway::GatewayRunner;
use orderly_chat::rest::RestChatTransport;
use orderly_core::config::{AppConfig, ConfigError, LoadOptions};
use orderly_core::domain::actor::ActorId;
use orderly_db::repositories::SqlOrderRepository;
use orderly_db::{connect_with_settings, migrations, DbPool};
use orderly_engine::{Engine, EngineConfig, EngineEvent, EngineHandle};

const ENGINE_QUEUE_CAPACITY: usize = 256;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repository: Arc<SqlOrderRepository>,
    pub transport: Arc<RestChatTransport>,
    pub engine: Engine,
    pub engine_receiver: mpsc::Receiver<EngineEvent>,
    pub handle: EngineHandle,
    pub gateway: GatewayRunner,
    pub gateway_sink: mpsc::Sender<ChatEvent>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let repository = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let transport = Arc::new(RestChatTransport::new(
        config.discord.api_base_url.clone(),
        config.discord.bot_token.clone(),
    ));

    // The bot's own id is resolved over the network later (see main); until
    // then self-event filtering matches nothing.
    let (handle, engine_receiver) = EngineHandle::channel(ENGINE_QUEUE_CAPACITY);
    let engine = Engine::new(
        transport.clone(),
        repository.clone(),
        transport.clone(),
        EngineConfig::from_app(&config, ActorId(0)),
        handle.clone(),
        config.workflow.name_tie_break,
    );

    // The gateway forwards raw chat events; a small adapter task wraps them
    // into engine events (see main).
    let (gateway_sink, gateway_events) = mpsc::channel(ENGINE_QUEUE_CAPACITY);
    let gateway = GatewayRunner::noop(gateway_sink.clone());
    spawn_gateway_adapter(gateway_events, handle.clone());

    Ok(Application {
        config,
        db_pool,
        repository,
        transport,
        engine,
        engine_receiver,
        handle,
        gateway,
        gateway_sink,
    })
}

fn spawn_gateway_adapter(
    mut events: mpsc::Receiver<ChatEvent>,
    handle: EngineHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !handle.send(EngineEvent::Chat(event)).await {
                return;
            }
        }
    })
}
