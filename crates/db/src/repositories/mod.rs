use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use orderly_core::domain::order::{Order, OrderId, OrderStatus};

pub mod memory;
pub mod order;

pub use memory::InMemoryOrderRepository;
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// The document store holding order records. Status is the only field the
/// bot ever writes; everything else is owned by the storefront.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn insert(&self, order: Order) -> Result<(), RepositoryError>;

    /// Returns false when no row matched `id`.
    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError>;

    async fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Orders created strictly after `watermark`, oldest first. Drives the
    /// polling insert feed.
    async fn list_created_after(
        &self,
        watermark: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;
}
