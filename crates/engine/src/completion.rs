use chrono::Utc;
use tracing::{debug, info, warn};

use orderly_chat::events::{ReactionAddedEvent, ReactionSignal};
use orderly_chat::messages;
use orderly_core::domain::order::{OrderId, OrderStatus};
use orderly_core::workflow::completion::{
    CompletionAction, CompletionProgress, CompletionRecord, CompletionSignal,
};
use orderly_core::workflow::stage::StageEntry;

use crate::events::EngineEvent;
use crate::runtime::{Engine, EngineError};

impl Engine {
    /// Feeds a reaction on the thread status line into the two-party
    /// sign-off. Non-parties and contradictory signals fall out of
    /// `apply_reaction` as `Ignored`.
    pub(crate) async fn handle_completion_reaction(
        &mut self,
        event: &ReactionAddedEvent,
        signal: ReactionSignal,
        order_id: OrderId,
    ) -> Result<(), EngineError> {
        let completion_signal = match signal {
            ReactionSignal::Approve => CompletionSignal::Approve,
            ReactionSignal::Reject => CompletionSignal::Reject,
            ReactionSignal::Worker | ReactionSignal::Admin => return Ok(()),
        };

        let Some(record) = self.completions.get_mut(&order_id) else {
            // Record already finalized; drop the dangling registry entry.
            self.registry.resolve(&event.message_id);
            return Ok(());
        };

        match record.apply_reaction(&event.actor_id, completion_signal) {
            CompletionProgress::Ignored => Ok(()),
            CompletionProgress::Recorded => {
                self.refresh_status_message(&order_id).await?;
                Ok(())
            }
            CompletionProgress::Ready(action) => {
                self.refresh_status_message(&order_id).await?;
                self.finalize(&order_id, action).await
            }
        }
    }

    /// Re-posts the status line so the thread always shows current flags,
    /// re-keying the registry to the new message id.
    pub(crate) async fn refresh_status_message(
        &mut self,
        order_id: &OrderId,
    ) -> Result<(), EngineError> {
        let Some(record) = self.completions.get(order_id) else {
            return Ok(());
        };
        let thread = record.thread.clone();
        let old_message = record.status_message.clone();
        let content = messages::completion_status_line(
            &record.order_id.display(),
            &record.client,
            &record.worker,
            record.action,
            record.client_confirmed,
            record.worker_confirmed,
        );

        if let Err(error) = self.transport.delete_message(&thread, &old_message).await {
            debug!(
                event_name = "engine.completion.status_delete_miss",
                error = %error,
                "previous status message could not be deleted"
            );
        }
        let new_message = self.channel_send_with_retry(&thread, &content).await?;

        self.registry.resolve(&old_message);
        self.registry.open(
            new_message.clone(),
            StageEntry::CompletionConfirmation { order_id: order_id.clone() },
            Utc::now(),
        );
        if let Some(record) = self.completions.get_mut(order_id) {
            record.status_message = new_message;
        }

        Ok(())
    }

    /// Applies the terminal transition once both parties signed off. On a
    /// partial failure the record survives with both flags set, so the next
    /// matching reaction retries this idempotently.
    pub(crate) async fn finalize(
        &mut self,
        order_id: &OrderId,
        action: CompletionAction,
    ) -> Result<(), EngineError> {
        let Some(record) = self.completions.get(order_id).cloned() else {
            return Ok(());
        };

        if let Err(error) = self.try_finalize(&record, action).await {
            warn!(
                event_name = "engine.completion.finalize_failed",
                order_id = %order_id.0,
                error = %error,
                "finalization failed; keeping record for retry"
            );
            let notice = messages::finalize_retry_notice(&record.order_id.display());
            if let Err(notify_error) =
                self.channel_send_with_retry(&record.thread, &notice).await
            {
                warn!(
                    event_name = "engine.completion.retry_notice_failed",
                    order_id = %order_id.0,
                    error = %notify_error,
                    "could not post retry notice"
                );
            }
            return Ok(());
        }

        Ok(())
    }

    async fn try_finalize(
        &mut self,
        record: &CompletionRecord,
        action: CompletionAction,
    ) -> Result<(), EngineError> {
        let order_id = &record.order_id;
        let status = match action {
            CompletionAction::Complete => OrderStatus::Completed,
            CompletionAction::Cancel => OrderStatus::Cancelled,
        };

        let Some(order) = self.fresh_order(order_id).await? else {
            warn!(
                event_name = "engine.completion.order_missing",
                order_id = %order_id.0,
                "order vanished before finalization; dropping record"
            );
            self.registry.remove_for_order(order_id);
            self.completions.remove(order_id);
            return Ok(());
        };

        // Idempotent on retry: re-asserting a terminal status is harmless.
        self.update_status_or_warn(&order, status).await?;

        self.dm_with_retry(&record.client, &messages::completion_finalized(&order, action))
            .await?;
        self.dm_with_retry(&record.worker, &messages::completion_finalized(&order, action))
            .await?;

        // Purge scans for the display id, so it must run before the channel
        // announcement that also carries it.
        self.purge_order_messages(&order).await?;
        self.channel_send_with_retry(
            &self.config.admin_channel,
            &messages::completion_finalized(&order, action),
        )
        .await?;

        let generation = self.next_generation();
        self.pending_archives.insert(order_id.clone(), generation);
        self.handle.schedule(
            self.config.archive_delay,
            EngineEvent::ArchiveDue {
                order_id: order_id.clone(),
                thread: record.thread.clone(),
                generation,
            },
        );

        self.completions.remove(order_id);
        info!(
            event_name = "engine.completion.finalized",
            order_id = %order_id.0,
            status = status.as_str(),
            "order finalized by dual confirmation"
        );

        Ok(())
    }

    /// Best-effort purge of stage messages for a finished order: drop the
    /// registry entries, then scan recent admin/worker channel history for
    /// the display id and delete matches. Individual delete failures are
    /// logged and skipped.
    async fn purge_order_messages(
        &mut self,
        order: &orderly_core::domain::order::Order,
    ) -> Result<(), EngineError> {
        self.registry.remove_for_order(&order.id);

        let display = order.id.display();
        for channel in [self.config.admin_channel.clone(), self.config.worker_channel.clone()] {
            let history =
                self.transport.recent_messages(&channel, self.config.purge_scan_limit).await?;
            for message in history {
                if !message.content.contains(&display) {
                    continue;
                }
                if let Err(error) = self.transport.delete_message(&channel, &message.id).await {
                    debug!(
                        event_name = "engine.completion.purge_miss",
                        error = %error,
                        "stage message delete failed; skipping"
                    );
                }
            }
        }

        Ok(())
    }
}
