use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use orderly_chat::directory::{ActorResolver, MemberDirectory};
use orderly_chat::events::ChatEvent;
use orderly_chat::transport::{ChatTransport, SentMessage, TransportError};
use orderly_core::config::AppConfig;
use orderly_core::domain::actor::{Actor, ActorId, ChannelId, GuildId, MessageId, RoleId};
use orderly_core::domain::order::{Order, OrderId};
use orderly_core::errors::DomainError;
use orderly_core::workflow::completion::CompletionRecord;
use orderly_core::workflow::stage::StageRegistry;
use orderly_db::repositories::{OrderRepository, RepositoryError};

use crate::events::{EngineEvent, EngineHandle};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Ids and timings the engine needs at runtime, flattened out of AppConfig.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub guild: GuildId,
    pub admin_role: RoleId,
    pub admin_channel: ChannelId,
    pub worker_channel: ChannelId,
    pub bot_user: ActorId,
    pub rate_limit_backoff: Duration,
    pub pacing_delay: Duration,
    pub stale_after: chrono::Duration,
    pub reason_timeout: Duration,
    pub archive_delay: Duration,
    pub stage_ttl: chrono::Duration,
    pub purge_scan_limit: u16,
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig, bot_user: ActorId) -> Self {
        Self {
            guild: GuildId(config.discord.guild_id),
            admin_role: RoleId(config.discord.admin_role_id),
            admin_channel: ChannelId(config.discord.admin_channel_id),
            worker_channel: ChannelId(config.discord.worker_channel_id),
            bot_user,
            rate_limit_backoff: Duration::from_secs(config.workflow.rate_limit_backoff_secs),
            pacing_delay: Duration::from_secs(config.workflow.pacing_delay_secs),
            stale_after: chrono::Duration::hours(config.workflow.stale_after_hours as i64),
            reason_timeout: Duration::from_secs(config.workflow.reason_timeout_secs),
            archive_delay: Duration::from_secs(config.workflow.archive_delay_secs),
            stage_ttl: chrono::Duration::hours(config.workflow.stage_ttl_hours as i64),
            purge_scan_limit: 50,
        }
    }
}

/// A cancellation-reason prompt waiting for the customer's next message.
pub(crate) struct ReasonPrompt {
    pub(crate) order: Order,
    pub(crate) customer: Actor,
    pub(crate) generation: u64,
}

/// The order workflow runtime.
///
/// Owns every piece of shared mutable state (stage registry, processed set,
/// completion records, pending prompts and archives) and is driven by a
/// single event queue, so handlers never race each other. Handlers may
/// still interleave at await points with *future* events; lookups on keys
/// that vanished mid-handler mean the stage was resolved by an earlier event
/// and are treated as no-ops, not errors.
pub struct Engine {
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) repository: Arc<dyn OrderRepository>,
    pub(crate) directory: Arc<dyn MemberDirectory>,
    pub(crate) resolver: ActorResolver<Arc<dyn MemberDirectory>>,
    pub(crate) config: EngineConfig,
    pub(crate) handle: EngineHandle,
    pub(crate) registry: StageRegistry,
    pub(crate) processed: HashSet<OrderId>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) completions: HashMap<OrderId, CompletionRecord>,
    pub(crate) pending_prompts: HashMap<ActorId, ReasonPrompt>,
    pub(crate) pending_archives: HashMap<OrderId, u64>,
    pub(crate) assigned_work: HashMap<MessageId, ActorId>,
    pub(crate) generation: u64,
}

impl Engine {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        repository: Arc<dyn OrderRepository>,
        directory: Arc<dyn MemberDirectory>,
        config: EngineConfig,
        handle: EngineHandle,
        tie_break: orderly_core::config::NameTieBreak,
    ) -> Self {
        let resolver = ActorResolver::new(directory.clone(), config.guild.clone(), tie_break);
        Self {
            transport,
            repository,
            directory,
            resolver,
            config,
            handle,
            registry: StageRegistry::new(),
            processed: HashSet::new(),
            started_at: Utc::now(),
            completions: HashMap::new(),
            pending_prompts: HashMap::new(),
            pending_archives: HashMap::new(),
            assigned_work: HashMap::new(),
            generation: 0,
        }
    }

    /// Moves the backlog floor. Inserts created before this instant are
    /// absorbed without notifications (reconnect replay protection).
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Sets the bot's own actor id once the transport has identified itself;
    /// reactions and messages from this id are dropped before routing.
    pub fn set_bot_user(&mut self, bot_user: ActorId) {
        self.config.bot_user = bot_user;
    }

    /// Drains the queue until every sender is gone. Handler failures are
    /// logged at this boundary and never stop the loop.
    pub async fn run(mut self, mut receiver: mpsc::Receiver<EngineEvent>) {
        info!(event_name = "engine.loop.started", "order workflow engine started");
        while let Some(event) = receiver.recv().await {
            if let Err(error) = self.process(event).await {
                warn!(
                    event_name = "engine.loop.handler_failed",
                    error = %error,
                    "event handler failed; continuing"
                );
            }
        }
        info!(event_name = "engine.loop.stopped", "order workflow engine stopped");
    }

    /// Processes one event to completion. `run` drives this from the queue;
    /// tests can call it directly for deterministic sequencing.
    pub async fn process(&mut self, event: EngineEvent) -> Result<(), EngineError> {
        match event {
            EngineEvent::OrderInserted(order) => self.dispatch_new_order(order).await,
            EngineEvent::Chat(ChatEvent::ReactionAdded(reaction)) => {
                self.on_reaction(reaction).await
            }
            EngineEvent::Chat(ChatEvent::MessageCreated(message)) => {
                self.on_message(message).await
            }
            EngineEvent::Chat(ChatEvent::Unsupported { event_type }) => {
                debug!(
                    event_name = "engine.loop.unsupported_event",
                    event_type = %event_type,
                    "dropping unsupported gateway event"
                );
                Ok(())
            }
            EngineEvent::StaleSweep => self.sweep_stale().await,
            EngineEvent::EvictStages => {
                let evicted = self.registry.evict_older_than(self.config.stage_ttl, Utc::now());
                if evicted > 0 {
                    info!(
                        event_name = "engine.stages.evicted",
                        evicted,
                        "evicted abandoned stage entries"
                    );
                }
                Ok(())
            }
            EngineEvent::ArchiveDue { order_id, thread, generation } => {
                self.on_archive_due(order_id, thread, generation).await
            }
            EngineEvent::PromptTimeout { actor, generation } => {
                self.on_prompt_timeout(actor, generation).await
            }
        }
    }

    async fn on_archive_due(
        &mut self,
        order_id: OrderId,
        thread: ChannelId,
        generation: u64,
    ) -> Result<(), EngineError> {
        if self.pending_archives.get(&order_id) != Some(&generation) {
            debug!(
                event_name = "engine.archive.cancelled",
                order_id = %order_id.0,
                "archive fired for a stale generation; skipping"
            );
            return Ok(());
        }

        self.pending_archives.remove(&order_id);
        self.transport.archive_thread(&thread).await?;
        info!(
            event_name = "engine.archive.thread_archived",
            order_id = %order_id.0,
            "order thread archived"
        );
        Ok(())
    }

    async fn on_prompt_timeout(
        &mut self,
        actor: ActorId,
        generation: u64,
    ) -> Result<(), EngineError> {
        match self.pending_prompts.get(&actor) {
            Some(prompt) if prompt.generation == generation => {}
            _ => return Ok(()),
        }

        let Some(prompt) = self.pending_prompts.remove(&actor) else {
            return Ok(());
        };
        info!(
            event_name = "engine.prompt.timed_out",
            order_id = %prompt.order.id.0,
            "cancellation reason prompt expired"
        );
        self.dm_with_retry(
            &prompt.customer,
            &orderly_chat::messages::cancellation_timeout_notice(&prompt.order),
        )
        .await?;
        Ok(())
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub(crate) async fn is_admin(&self, actor: &ActorId) -> Result<bool, TransportError> {
        self.transport
            .member_has_role(&self.config.guild, actor, &self.config.admin_role)
            .await
    }

    /// One retry after the fixed backoff on a rate-limit signal; every other
    /// failure propagates.
    pub(crate) async fn dm_with_retry(
        &self,
        actor: &Actor,
        content: &str,
    ) -> Result<SentMessage, TransportError> {
        match self.transport.send_direct(actor, content).await {
            Err(TransportError::RateLimited { .. }) => {
                tokio::time::sleep(self.config.rate_limit_backoff).await;
                self.transport.send_direct(actor, content).await
            }
            other => other,
        }
    }

    pub(crate) async fn channel_send_with_retry(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageId, TransportError> {
        match self.transport.send_channel(channel, content).await {
            Err(TransportError::RateLimited { .. }) => {
                tokio::time::sleep(self.config.rate_limit_backoff).await;
                self.transport.send_channel(channel, content).await
            }
            other => other,
        }
    }

    pub(crate) async fn fresh_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        self.repository.find_by_id(order_id).await
    }

    /// Actor lookup for reactors we only know by id (claiming workers,
    /// self-assigning admins).
    pub(crate) async fn actor_by_id(&self, id: &ActorId) -> Result<Actor, TransportError> {
        Ok(self
            .directory
            .fetch_by_id(id)
            .await?
            .unwrap_or_else(|| Actor { id: id.clone(), name: format!("user-{}", id.0), is_bot: false }))
    }
}
