use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use orderly_core::domain::order::Order;

use crate::repositories::OrderRepository;

/// Polling subscription over order inserts.
///
/// The feed task owns nothing but a watermark: each tick it asks the store
/// for orders created after the last one it saw and pushes them into the
/// channel. All interpretation happens on the consumer side of the channel,
/// so this task never touches workflow state.
pub struct OrderFeed {
    repository: Arc<dyn OrderRepository>,
    sender: mpsc::Sender<Order>,
    poll_interval: Duration,
    watermark: DateTime<Utc>,
}

impl OrderFeed {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        sender: mpsc::Sender<Order>,
        poll_interval: Duration,
        start_from: DateTime<Utc>,
    ) -> Self {
        Self { repository, sender, poll_interval, watermark: start_from }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.poll_once().await.is_err() {
                // Receiver dropped: the engine is gone, stop polling.
                return;
            }
        }
    }

    async fn poll_once(&mut self) -> Result<(), mpsc::error::SendError<Order>> {
        let batch = match self.repository.list_created_after(self.watermark).await {
            Ok(batch) => batch,
            Err(error) => {
                warn!(
                    event_name = "feed.orders.poll_failed",
                    error = %error,
                    "order feed poll failed; retrying on next tick"
                );
                return Ok(());
            }
        };

        for order in batch {
            if order.created_at > self.watermark {
                self.watermark = order.created_at;
            }
            debug!(
                event_name = "feed.orders.insert_observed",
                order_id = %order.id.0,
                "order insert observed"
            );
            self.sender.send(order).await?;
        }

        Ok(())
    }
}
