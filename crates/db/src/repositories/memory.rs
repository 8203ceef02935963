use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use orderly_core::domain::order::{Order, OrderId, OrderStatus};

use super::{OrderRepository, RepositoryError};

/// In-memory store used by tests and local wiring.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<Vec<Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_orders(orders: Vec<Order>) -> Self {
        let repo = Self::new();
        for order in orders {
            repo.insert(order).await.expect("in-memory insert cannot fail");
        }
        repo
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.lock().await;
        Ok(orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().await;
        if let Some(existing) = orders.iter_mut().find(|existing| existing.id == order.id) {
            *existing = order;
        } else {
            orders.push(order);
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.lock().await;
        match orders.iter_mut().find(|order| &order.id == id) {
            Some(order) => {
                order.status = status;
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.lock().await;
        let mut matches: Vec<Order> = orders
            .iter()
            .filter(|order| order.status == OrderStatus::Pending && order.created_at < cutoff)
            .cloned()
            .collect();
        matches.sort_by_key(|order| order.created_at);
        Ok(matches)
    }

    async fn list_created_after(
        &self,
        watermark: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.lock().await;
        let mut matches: Vec<Order> =
            orders.iter().filter(|order| order.created_at > watermark).cloned().collect();
        matches.sort_by_key(|order| order.created_at);
        Ok(matches)
    }
}
