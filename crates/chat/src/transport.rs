use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use orderly_core::domain::actor::{Actor, ActorId, ChannelId, GuildId, MessageId, RoleId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("network failure: {0}")]
    Network(String),
}

/// A message as read back from channel history, enough to match an order's
/// display id during purge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub content: String,
}

/// A sent direct message. DMs land in a per-user channel the caller did not
/// choose, and follow-up reactions need both ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub message: MessageId,
}

/// Outbound chat operations the workflow needs. One implementation speaks
/// the platform REST API; tests substitute recording fakes.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_direct(
        &self,
        actor: &Actor,
        content: &str,
    ) -> Result<SentMessage, TransportError>;

    async fn send_channel(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageId, TransportError>;

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), TransportError>;

    async fn remove_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
        actor: &ActorId,
    ) -> Result<(), TransportError>;

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), TransportError>;

    async fn create_private_thread(
        &self,
        parent: &ChannelId,
        name: &str,
        participants: &[ActorId],
    ) -> Result<ChannelId, TransportError>;

    async fn archive_thread(&self, thread: &ChannelId) -> Result<(), TransportError>;

    async fn member_has_role(
        &self,
        guild: &GuildId,
        actor: &ActorId,
        role: &RoleId,
    ) -> Result<bool, TransportError>;

    async fn recent_messages(
        &self,
        channel: &ChannelId,
        limit: u16,
    ) -> Result<Vec<ChannelMessage>, TransportError>;
}

/// Discards every send; used as the default wiring before a real transport
/// is configured.
#[derive(Default)]
pub struct NoopChatTransport;

#[async_trait]
impl ChatTransport for NoopChatTransport {
    async fn send_direct(
        &self,
        _actor: &Actor,
        _content: &str,
    ) -> Result<SentMessage, TransportError> {
        Ok(SentMessage { channel: ChannelId(0), message: MessageId(0) })
    }

    async fn send_channel(
        &self,
        _channel: &ChannelId,
        _content: &str,
    ) -> Result<MessageId, TransportError> {
        Ok(MessageId(0))
    }

    async fn add_reaction(
        &self,
        _channel: &ChannelId,
        _message: &MessageId,
        _emoji: &str,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel: &ChannelId,
        _message: &MessageId,
        _emoji: &str,
        _actor: &ActorId,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn delete_message(
        &self,
        _channel: &ChannelId,
        _message: &MessageId,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn create_private_thread(
        &self,
        _parent: &ChannelId,
        _name: &str,
        _participants: &[ActorId],
    ) -> Result<ChannelId, TransportError> {
        Ok(ChannelId(0))
    }

    async fn archive_thread(&self, _thread: &ChannelId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn member_has_role(
        &self,
        _guild: &GuildId,
        _actor: &ActorId,
        _role: &RoleId,
    ) -> Result<bool, TransportError> {
        Ok(false)
    }

    async fn recent_messages(
        &self,
        _channel: &ChannelId,
        _limit: u16,
    ) -> Result<Vec<ChannelMessage>, TransportError> {
        Ok(Vec::new())
    }
}
