//! Chat platform integration
//!
//! This crate provides the guild-side interface for orderly:
//! - **Transport** (`transport`, `rest`) - outbound sends, reactions,
//!   threads, role checks over the platform REST API
//! - **Gateway** (`gateway`) - event pump with reconnection logic, feeding
//!   the engine's single queue
//! - **Events** (`events`) - reaction/message event types and emoji parsing
//! - **Messages** (`messages`) - rendering of every notification the
//!   workflow sends
//! - **Directory** (`directory`) - customer-reference resolution with a
//!   configurable name tie-break
//!
//! # Key Types
//!
//! - `ChatTransport` - trait the engine sends through
//! - `GatewayRunner` - connection loop forwarding `ChatEvent`s
//! - `ActorResolver` - username/id lookup
//! - `ReactionSignal` - the four emoji the workflow understands

pub mod directory;
pub mod events;
pub mod gateway;
pub mod messages;
pub mod rest;
pub mod transport;

pub use directory::{ActorResolver, InMemoryDirectory, MemberDirectory, ResolveError};
pub use events::{
    reaction_signal, ChatEvent, MessageCreatedEvent, ReactionAddedEvent, ReactionSignal,
    ADMIN_EMOJI, APPROVE_EMOJI, REJECT_EMOJI, WORKER_EMOJI,
};
pub use gateway::{
    GatewayError, GatewayRunner, GatewayTransport, NoopGatewayTransport, ReconnectPolicy,
};
pub use rest::RestChatTransport;
pub use transport::{ChannelMessage, ChatTransport, NoopChatTransport, SentMessage, TransportError};
