use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::ChatEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), GatewayError>;
    async fn next_event(&self) -> Result<Option<ChatEvent>, GatewayError>;
    async fn disconnect(&self) -> Result<(), GatewayError>;
}

/// Stays connected forever and produces nothing; the default wiring until a
/// live gateway transport is configured.
#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<ChatEvent>, GatewayError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Pumps gateway events into the engine queue.
///
/// The runner never interprets events: reactions and messages are forwarded
/// into the single consumer channel so all workflow state is touched from
/// one place. A full queue applies backpressure here, on the network side.
pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    sink: mpsc::Sender<ChatEvent>,
    reconnect_policy: ReconnectPolicy,
    noop: bool,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        sink: mpsc::Sender<ChatEvent>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, sink, reconnect_policy, noop: false }
    }

    pub fn noop(sink: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            transport: Arc::new(NoopGatewayTransport),
            sink,
            reconnect_policy: ReconnectPolicy::default(),
            noop: true,
        }
    }

    pub fn is_noop_transport(&self) -> bool {
        self.noop
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(gateway_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %gateway_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), GatewayError> {
        info!(attempt, "opening gateway connection");
        self.transport.connect().await?;
        info!(attempt, "gateway connected");

        loop {
            let Some(event) = self.transport.next_event().await? else {
                info!(attempt, "gateway stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            debug!(
                event_name = "ingress.gateway.event_received",
                event_type = event_type_name(&event),
                "received gateway event"
            );

            if self.sink.send(event).await.is_err() {
                info!("engine queue closed; stopping gateway pump");
                self.transport.disconnect().await?;
                return Ok(());
            }
        }
    }
}

fn event_type_name(event: &ChatEvent) -> &'static str {
    match event {
        ChatEvent::ReactionAdded(_) => "reaction_added",
        ChatEvent::MessageCreated(_) => "message_created",
        ChatEvent::Unsupported { .. } => "unsupported",
    }
}
