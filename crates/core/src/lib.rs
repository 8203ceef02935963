pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, NameTieBreak};
pub use domain::actor::{Actor, ActorId, ChannelId, GuildId, MessageId, RoleId};
pub use domain::order::{
    Currency, CustomerRef, ItemDetail, LineItem, Order, OrderId, OrderStatus, PaymentMethod,
};
pub use errors::{ApplicationError, DomainError};
pub use workflow::completion::{
    CompletionAction, CompletionProgress, CompletionRecord, CompletionSignal, Party,
};
pub use workflow::stage::{StageEntry, StageRegistry};
