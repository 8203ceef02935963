pub mod connection;
pub mod fixtures;
pub mod listener;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use listener::OrderFeed;
pub use repositories::{
    InMemoryOrderRepository, OrderRepository, RepositoryError, SqlOrderRepository,
};
