use chrono::Utc;
use tracing::{debug, info, warn};

use orderly_chat::directory::ResolveError;
use orderly_chat::events::{APPROVE_EMOJI, REJECT_EMOJI};
use orderly_chat::messages;
use orderly_core::domain::order::Order;
use orderly_core::workflow::stage::StageEntry;

use crate::runtime::{Engine, EngineError};

impl Engine {
    /// Handles one observed order insert: customer confirmation DM, admin
    /// channel notification, and the opening order-approval stage.
    ///
    /// Replayed inserts and backlog predating process start are absorbed via
    /// the processed set, so calling this twice for the same order sends
    /// nothing twice.
    pub(crate) async fn dispatch_new_order(&mut self, order: Order) -> Result<(), EngineError> {
        if self.processed.contains(&order.id) {
            debug!(
                event_name = "engine.dispatch.duplicate_insert",
                order_id = %order.id.0,
                "order already dispatched; ignoring"
            );
            return Ok(());
        }

        if order.created_at < self.started_at {
            debug!(
                event_name = "engine.dispatch.backlog_insert",
                order_id = %order.id.0,
                "order predates process start; ignoring"
            );
            self.processed.insert(order.id.clone());
            return Ok(());
        }

        let customer = match self.resolver.resolve(&order.customer.0).await {
            Ok(customer) => customer,
            Err(error @ (ResolveError::NotFound { .. } | ResolveError::Ambiguous { .. })) => {
                warn!(
                    event_name = "engine.dispatch.customer_unresolved",
                    order_id = %order.id.0,
                    error = %error,
                    "customer could not be resolved; alerting admins only"
                );
                self.channel_send_with_retry(
                    &self.config.admin_channel,
                    &messages::unresolved_customer_alert(&order, &order.customer.0),
                )
                .await?;
                self.processed.insert(order.id.clone());
                return Ok(());
            }
            Err(ResolveError::Transport(error)) => return Err(error.into()),
        };

        self.dm_with_retry(&customer, &messages::order_confirmation(&order)).await?;
        info!(
            event_name = "engine.dispatch.customer_notified",
            order_id = %order.id.0,
            customer_id = customer.id.0,
            "order confirmation sent"
        );

        // Space out the admin post to stay under the send rate limit.
        tokio::time::sleep(self.config.pacing_delay).await;

        let admin_message = self
            .channel_send_with_retry(
                &self.config.admin_channel,
                &messages::admin_order_notification(&order, Some(&customer)),
            )
            .await?;
        self.transport
            .add_reaction(&self.config.admin_channel, &admin_message, APPROVE_EMOJI)
            .await?;
        self.transport
            .add_reaction(&self.config.admin_channel, &admin_message, REJECT_EMOJI)
            .await?;

        self.registry.open(
            admin_message,
            StageEntry::OrderApproval { order: order.clone(), customer },
            Utc::now(),
        );
        self.processed.insert(order.id.clone());
        info!(
            event_name = "engine.dispatch.approval_stage_opened",
            order_id = %order.id.0,
            "admin approval stage opened"
        );

        Ok(())
    }

    /// Reminds customers of orders sitting in `pending` past the threshold.
    /// Each order's reminder is attempted independently; one failure never
    /// aborts the sweep.
    pub(crate) async fn sweep_stale(&mut self) -> Result<(), EngineError> {
        let cutoff = Utc::now() - self.config.stale_after;
        let stale = self.repository.list_pending_older_than(cutoff).await?;
        if stale.is_empty() {
            return Ok(());
        }

        info!(
            event_name = "engine.sweep.stale_orders_found",
            count = stale.len(),
            "sending stale order reminders"
        );

        for order in stale {
            if let Err(error) = self.remind_one(&order).await {
                warn!(
                    event_name = "engine.sweep.reminder_failed",
                    order_id = %order.id.0,
                    error = %error,
                    "stale reminder failed; continuing sweep"
                );
            }
            tokio::time::sleep(self.config.pacing_delay).await;
        }

        Ok(())
    }

    async fn remind_one(&self, order: &Order) -> Result<(), EngineError> {
        let customer = match self.resolver.resolve(&order.customer.0).await {
            Ok(customer) => customer,
            Err(error @ (ResolveError::NotFound { .. } | ResolveError::Ambiguous { .. })) => {
                debug!(
                    event_name = "engine.sweep.customer_unresolved",
                    order_id = %order.id.0,
                    error = %error,
                    "skipping reminder for unresolvable customer"
                );
                return Ok(());
            }
            Err(ResolveError::Transport(error)) => return Err(error.into()),
        };

        self.dm_with_retry(&customer, &messages::stale_reminder(order)).await?;
        Ok(())
    }
}
