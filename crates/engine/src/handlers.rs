use chrono::Utc;
use tracing::{debug, info, warn};

use orderly_chat::events::{
    reaction_signal, ReactionAddedEvent, ReactionSignal, ADMIN_EMOJI, APPROVE_EMOJI, REJECT_EMOJI,
    WORKER_EMOJI,
};
use orderly_chat::messages;
use orderly_core::domain::actor::{Actor, ChannelId};
use orderly_core::domain::order::{Order, OrderStatus};
use orderly_core::workflow::stage::StageEntry;

use crate::runtime::{Engine, EngineError, ReasonPrompt};
use crate::events::EngineEvent;

impl Engine {
    /// Single dispatch point for every incoming reaction. Consults the
    /// unified stage registry; an unknown message is a silent no-op (except
    /// for the work-lock revert below).
    pub(crate) async fn on_reaction(
        &mut self,
        event: ReactionAddedEvent,
    ) -> Result<(), EngineError> {
        if event.actor_id == self.config.bot_user {
            return Ok(());
        }

        let Some(signal) = reaction_signal(&event.emoji) else {
            return Ok(());
        };

        let Some(entry) = self.registry.peek(&event.message_id).cloned() else {
            return self.maybe_revert_claimed_work(&event, signal).await;
        };

        debug!(
            event_name = "engine.router.reaction_routed",
            stage = entry.stage_name(),
            order_id = %entry.order_id().0,
            actor_id = event.actor_id.0,
            "routing reaction to stage handler"
        );

        match entry {
            StageEntry::OrderApproval { order, customer } => {
                self.handle_order_approval(&event, signal, order, customer).await
            }
            StageEntry::PaymentConfirmation { order, customer } => {
                self.handle_payment_confirmation(&event, signal, order, customer).await
            }
            StageEntry::PaymentVerification { order, customer } => {
                self.handle_payment_verification(&event, signal, order, customer).await
            }
            StageEntry::AdminDecision { order, customer } => {
                self.handle_admin_decision(&event, signal, order, customer).await
            }
            StageEntry::WorkAssignment { order, customer } => {
                self.handle_work_assignment(&event, signal, order, customer).await
            }
            StageEntry::CompletionConfirmation { order_id } => {
                self.handle_completion_reaction(&event, signal, order_id).await
            }
        }
    }

    /// A claimed work post stays locked to its first claimant: reactions
    /// from anyone else are retracted so the post never looks co-assigned.
    async fn maybe_revert_claimed_work(
        &self,
        event: &ReactionAddedEvent,
        signal: ReactionSignal,
    ) -> Result<(), EngineError> {
        let Some(assigned) = self.assigned_work.get(&event.message_id) else {
            return Ok(());
        };
        if assigned == &event.actor_id || signal != ReactionSignal::Approve {
            return Ok(());
        }

        self.transport
            .remove_reaction(&event.channel_id, &event.message_id, &event.emoji, &event.actor_id)
            .await?;
        info!(
            event_name = "engine.work.claim_reverted",
            actor_id = event.actor_id.0,
            "reverted claim reaction on already-assigned work"
        );
        Ok(())
    }

    /// Stage: admin approves or rejects a fresh order.
    async fn handle_order_approval(
        &mut self,
        event: &ReactionAddedEvent,
        signal: ReactionSignal,
        order: Order,
        customer: Actor,
    ) -> Result<(), EngineError> {
        if !self.is_admin(&event.actor_id).await? {
            return Ok(());
        }

        let Some(fresh) = self.fresh_order(&order.id).await? else {
            self.registry.resolve(&event.message_id);
            return Ok(());
        };
        if fresh.status != OrderStatus::Pending {
            self.registry.resolve(&event.message_id);
            return Ok(());
        }

        match signal {
            ReactionSignal::Approve => {
                if !self.update_status_or_warn(&order, OrderStatus::AwaitingPayment).await? {
                    self.registry.resolve(&event.message_id);
                    return Ok(());
                }
                self.registry.resolve(&event.message_id);

                let mut order = fresh;
                order.status = OrderStatus::AwaitingPayment;

                let sent =
                    self.dm_with_retry(&customer, &messages::payment_instructions(&order)).await?;
                self.transport.add_reaction(&sent.channel, &sent.message, APPROVE_EMOJI).await?;
                self.transport.add_reaction(&sent.channel, &sent.message, REJECT_EMOJI).await?;

                self.registry.open(
                    sent.message,
                    StageEntry::PaymentConfirmation { order: order.clone(), customer },
                    Utc::now(),
                );
                info!(
                    event_name = "engine.stage.order_approved",
                    order_id = %order.id.0,
                    "order approved; awaiting payment"
                );
            }
            ReactionSignal::Reject => {
                if !self.update_status_or_warn(&order, OrderStatus::Cancelled).await? {
                    self.registry.resolve(&event.message_id);
                    return Ok(());
                }
                self.registry.remove_for_order(&order.id);

                self.dm_with_retry(&customer, &messages::order_cancelled_notice(&order)).await?;
                self.channel_send_with_retry(
                    &self.config.admin_channel,
                    &messages::admin_cancellation_notice(&order),
                )
                .await?;
                // Retire the approval post itself; the stage is over.
                if let Err(error) =
                    self.transport.delete_message(&event.channel_id, &event.message_id).await
                {
                    debug!(
                        event_name = "engine.stage.purge_miss",
                        error = %error,
                        "could not delete approval message"
                    );
                }
                info!(
                    event_name = "engine.stage.order_rejected",
                    order_id = %order.id.0,
                    "order rejected and cancelled"
                );
            }
            ReactionSignal::Worker | ReactionSignal::Admin => {}
        }

        Ok(())
    }

    /// Stage: the customer self-reports payment (or asks to cancel). Only
    /// the order's customer counts here.
    async fn handle_payment_confirmation(
        &mut self,
        event: &ReactionAddedEvent,
        signal: ReactionSignal,
        order: Order,
        customer: Actor,
    ) -> Result<(), EngineError> {
        if event.actor_id != customer.id {
            return Ok(());
        }

        match signal {
            ReactionSignal::Approve => {
                let Some(fresh) = self.fresh_order(&order.id).await? else {
                    self.registry.resolve(&event.message_id);
                    return Ok(());
                };
                if fresh.status != OrderStatus::AwaitingPayment {
                    self.registry.resolve(&event.message_id);
                    return Ok(());
                }

                let admin_message = self
                    .channel_send_with_retry(
                        &self.config.admin_channel,
                        &messages::payment_reported(&fresh, &customer),
                    )
                    .await?;
                self.transport
                    .add_reaction(&self.config.admin_channel, &admin_message, APPROVE_EMOJI)
                    .await?;
                self.transport
                    .add_reaction(&self.config.admin_channel, &admin_message, REJECT_EMOJI)
                    .await?;

                self.registry.resolve(&event.message_id);
                self.registry.open(
                    admin_message,
                    StageEntry::PaymentVerification { order: fresh, customer },
                    Utc::now(),
                );
                info!(
                    event_name = "engine.stage.payment_reported",
                    order_id = %order.id.0,
                    "payment self-report forwarded for verification"
                );
            }
            ReactionSignal::Reject => {
                // Cancellation request: ask for a reason, bounded wait. The
                // stage entry stays open; no transition has happened yet.
                self.dm_with_retry(&customer, &messages::cancellation_reason_prompt(&order))
                    .await?;

                let generation = self.next_generation();
                self.pending_prompts.insert(
                    customer.id.clone(),
                    ReasonPrompt { order: order.clone(), customer: customer.clone(), generation },
                );
                self.handle.schedule(
                    self.config.reason_timeout,
                    EngineEvent::PromptTimeout { actor: customer.id.clone(), generation },
                );
                info!(
                    event_name = "engine.stage.cancellation_prompted",
                    order_id = %order.id.0,
                    "cancellation reason prompt opened"
                );
            }
            ReactionSignal::Worker | ReactionSignal::Admin => {}
        }

        Ok(())
    }

    /// Stage: admin verifies (or disputes) a self-reported payment.
    async fn handle_payment_verification(
        &mut self,
        event: &ReactionAddedEvent,
        signal: ReactionSignal,
        order: Order,
        customer: Actor,
    ) -> Result<(), EngineError> {
        if !self.is_admin(&event.actor_id).await? {
            return Ok(());
        }

        let Some(fresh) = self.fresh_order(&order.id).await? else {
            self.registry.resolve(&event.message_id);
            return Ok(());
        };
        if fresh.status != OrderStatus::AwaitingPayment {
            self.registry.resolve(&event.message_id);
            return Ok(());
        }

        match signal {
            ReactionSignal::Approve => {
                if !self.update_status_or_warn(&order, OrderStatus::PaymentConfirmed).await? {
                    self.registry.resolve(&event.message_id);
                    return Ok(());
                }
                self.registry.resolve(&event.message_id);

                let mut order = fresh;
                order.status = OrderStatus::PaymentConfirmed;

                self.dm_with_retry(&customer, &messages::payment_confirmed_notice(&order)).await?;

                let prompt = self
                    .channel_send_with_retry(
                        &self.config.admin_channel,
                        &messages::admin_decision_prompt(&order),
                    )
                    .await?;
                self.transport
                    .add_reaction(&self.config.admin_channel, &prompt, WORKER_EMOJI)
                    .await?;
                self.transport
                    .add_reaction(&self.config.admin_channel, &prompt, ADMIN_EMOJI)
                    .await?;

                self.registry.open(
                    prompt,
                    StageEntry::AdminDecision { order: order.clone(), customer },
                    Utc::now(),
                );
                info!(
                    event_name = "engine.stage.payment_verified",
                    order_id = %order.id.0,
                    "payment confirmed; admin decision pending"
                );
            }
            ReactionSignal::Reject => {
                // Payment did not arrive: stay in awaiting_payment and hand
                // the customer a fresh confirmation message to react on.
                self.update_status_or_warn(&order, OrderStatus::AwaitingPayment).await?;
                self.registry.resolve(&event.message_id);

                let sent =
                    self.dm_with_retry(&customer, &messages::payment_not_confirmed(&order)).await?;
                self.transport.add_reaction(&sent.channel, &sent.message, APPROVE_EMOJI).await?;
                self.transport.add_reaction(&sent.channel, &sent.message, REJECT_EMOJI).await?;

                self.registry.open(
                    sent.message,
                    StageEntry::PaymentConfirmation { order: fresh, customer },
                    Utc::now(),
                );
                info!(
                    event_name = "engine.stage.payment_disputed",
                    order_id = %order.id.0,
                    "payment not confirmed; awaiting re-submission"
                );
            }
            ReactionSignal::Worker | ReactionSignal::Admin => {}
        }

        Ok(())
    }

    /// Stage: admin routes the paid order to the worker channel or takes it
    /// themselves.
    async fn handle_admin_decision(
        &mut self,
        event: &ReactionAddedEvent,
        signal: ReactionSignal,
        order: Order,
        customer: Actor,
    ) -> Result<(), EngineError> {
        if !self.is_admin(&event.actor_id).await? {
            return Ok(());
        }

        let Some(fresh) = self.fresh_order(&order.id).await? else {
            self.registry.resolve(&event.message_id);
            return Ok(());
        };
        if fresh.status != OrderStatus::PaymentConfirmed {
            self.registry.resolve(&event.message_id);
            return Ok(());
        }

        match signal {
            ReactionSignal::Worker => {
                let post = self
                    .channel_send_with_retry(
                        &self.config.worker_channel,
                        &messages::work_assignment_post(&fresh),
                    )
                    .await?;
                self.transport
                    .add_reaction(&self.config.worker_channel, &post, APPROVE_EMOJI)
                    .await?;

                self.registry.resolve(&event.message_id);
                self.registry.open(
                    post,
                    StageEntry::WorkAssignment { order: fresh, customer },
                    Utc::now(),
                );
                info!(
                    event_name = "engine.stage.work_posted",
                    order_id = %order.id.0,
                    "order posted to worker channel"
                );
            }
            ReactionSignal::Admin => {
                if !self.update_status_or_warn(&order, OrderStatus::Processing).await? {
                    self.registry.resolve(&event.message_id);
                    return Ok(());
                }
                self.registry.resolve(&event.message_id);

                let admin = self.actor_by_id(&event.actor_id).await?;
                let mut order = fresh;
                order.status = OrderStatus::Processing;
                self.open_order_thread(&order, customer, admin).await?;
                info!(
                    event_name = "engine.stage.admin_self_assigned",
                    order_id = %order.id.0,
                    "admin self-assigned; order processing"
                );
            }
            ReactionSignal::Approve | ReactionSignal::Reject => {}
        }

        Ok(())
    }

    /// Stage: first non-bot member to react claims the work.
    async fn handle_work_assignment(
        &mut self,
        event: &ReactionAddedEvent,
        signal: ReactionSignal,
        order: Order,
        customer: Actor,
    ) -> Result<(), EngineError> {
        if signal != ReactionSignal::Approve {
            return Ok(());
        }

        let worker = self.actor_by_id(&event.actor_id).await?;
        if worker.is_bot {
            return Ok(());
        }

        let Some(fresh) = self.fresh_order(&order.id).await? else {
            self.registry.resolve(&event.message_id);
            return Ok(());
        };
        if fresh.status != OrderStatus::PaymentConfirmed {
            self.registry.resolve(&event.message_id);
            return Ok(());
        }

        if !self.update_status_or_warn(&order, OrderStatus::Processing).await? {
            self.registry.resolve(&event.message_id);
            return Ok(());
        }

        // Lock the post to this claimant; later reactions are reverted.
        self.registry.resolve(&event.message_id);
        self.assigned_work.insert(event.message_id.clone(), event.actor_id.clone());

        let mut order = fresh;
        order.status = OrderStatus::Processing;
        self.open_order_thread(&order, customer, worker).await?;
        info!(
            event_name = "engine.stage.work_claimed",
            order_id = %order.id.0,
            worker_id = event.actor_id.0,
            "work claimed; order processing"
        );

        Ok(())
    }

    /// Creates the dedicated order thread and arms the dual-confirmation
    /// protocol with both flags clear.
    pub(crate) async fn open_order_thread(
        &mut self,
        order: &Order,
        client: Actor,
        worker: Actor,
    ) -> Result<ChannelId, EngineError> {
        let thread = self
            .transport
            .create_private_thread(
                &self.config.admin_channel,
                &messages::thread_name(order),
                &[client.id.clone(), worker.id.clone()],
            )
            .await?;

        self.channel_send_with_retry(&thread, &messages::thread_intro(order, &client, &worker))
            .await?;
        let status_message = self
            .channel_send_with_retry(
                &thread,
                &messages::completion_status_line(
                    &order.id.display(),
                    &client,
                    &worker,
                    None,
                    false,
                    false,
                ),
            )
            .await?;

        let record = orderly_core::workflow::completion::CompletionRecord::new(
            order.id.clone(),
            client,
            worker,
            thread.clone(),
            status_message.clone(),
        );
        self.completions.insert(order.id.clone(), record);
        self.registry.open(
            status_message,
            StageEntry::CompletionConfirmation { order_id: order.id.clone() },
            Utc::now(),
        );
        // A fresh sign-off supersedes any archive still in flight.
        self.pending_archives.remove(&order.id);

        Ok(thread)
    }

    /// Writes the transition, tolerating a vanished row (logged, no crash).
    pub(crate) async fn update_status_or_warn(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> Result<bool, EngineError> {
        let updated = self.repository.update_status(&order.id, status).await?;
        if !updated {
            warn!(
                event_name = "engine.store.missing_order",
                order_id = %order.id.0,
                status = status.as_str(),
                "status update matched no row; dropping stage"
            );
        }
        Ok(updated)
    }
}
