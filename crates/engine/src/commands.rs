use tracing::info;

use orderly_chat::events::MessageCreatedEvent;
use orderly_chat::messages;
use orderly_core::domain::order::{OrderId, OrderStatus};

use crate::runtime::{Engine, EngineError};

/// Text commands understood inside the guild. Everything else a human types
/// is noise, except while a cancellation-reason prompt is pending for them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `!complete` inside an order thread: restart the sign-off status line.
    Complete,
    /// `!status <order-id> <status>`: admin-only manual override.
    StatusOverride { order_id: String, status: String },
}

pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.trim().split_whitespace();
    match parts.next()? {
        "!complete" => Some(Command::Complete),
        "!status" => {
            let order_id = parts.next()?.to_string();
            let status = parts.next()?.to_string();
            Some(Command::StatusOverride { order_id, status })
        }
        _ => None,
    }
}

impl Engine {
    pub(crate) async fn on_message(
        &mut self,
        event: MessageCreatedEvent,
    ) -> Result<(), EngineError> {
        if event.actor_id == self.config.bot_user {
            return Ok(());
        }

        // A pending reason prompt consumes the author's next message whole.
        if self.pending_prompts.contains_key(&event.actor_id) {
            return self.capture_cancellation_reason(&event).await;
        }

        match parse_command(&event.content) {
            Some(Command::Complete) => self.restart_sign_off(&event).await,
            Some(Command::StatusOverride { order_id, status }) => {
                self.override_status(&event, order_id, status).await
            }
            None => Ok(()),
        }
    }

    async fn capture_cancellation_reason(
        &mut self,
        event: &MessageCreatedEvent,
    ) -> Result<(), EngineError> {
        let Some(prompt) = self.pending_prompts.remove(&event.actor_id) else {
            return Ok(());
        };

        self.channel_send_with_retry(
            &self.config.admin_channel,
            &messages::cancellation_reason_received(
                &prompt.order,
                &prompt.customer,
                event.content.trim(),
            ),
        )
        .await?;
        info!(
            event_name = "engine.prompt.reason_captured",
            order_id = %prompt.order.id.0,
            "cancellation reason forwarded to admins"
        );
        Ok(())
    }

    /// `!complete` in an order thread re-posts the sign-off status line (and
    /// cancels a pending archive, since the order is active again).
    async fn restart_sign_off(&mut self, event: &MessageCreatedEvent) -> Result<(), EngineError> {
        let order_id = self
            .completions
            .values()
            .find(|record| record.thread == event.channel_id)
            .map(|record| record.order_id.clone());
        let Some(order_id) = order_id else {
            return Ok(());
        };

        self.pending_archives.remove(&order_id);
        self.refresh_status_message(&order_id).await?;
        info!(
            event_name = "engine.completion.sign_off_restarted",
            order_id = %order_id.0,
            "sign-off status line re-posted on request"
        );
        Ok(())
    }

    /// Role-gated manual override. Non-admins are ignored silently; an
    /// unknown status value gets the enumerated list back.
    async fn override_status(
        &mut self,
        event: &MessageCreatedEvent,
        order_ref: String,
        status_raw: String,
    ) -> Result<(), EngineError> {
        if !self.is_admin(&event.actor_id).await? {
            return Ok(());
        }

        let Some(status) = OrderStatus::parse(&status_raw) else {
            self.channel_send_with_retry(
                &event.channel_id,
                &messages::unknown_status_reply(&status_raw),
            )
            .await?;
            return Ok(());
        };

        let order_id = OrderId(order_ref.clone());
        let Some(order) = self.fresh_order(&order_id).await? else {
            self.channel_send_with_retry(
                &event.channel_id,
                &messages::order_not_found_reply(&order_ref),
            )
            .await?;
            return Ok(());
        };

        self.repository.update_status(&order_id, status).await?;
        self.channel_send_with_retry(
            &event.channel_id,
            &messages::status_override_reply(&order.id.display(), order.status, status),
        )
        .await?;
        info!(
            event_name = "engine.commands.status_overridden",
            order_id = %order_id.0,
            from = order.status.as_str(),
            to = status.as_str(),
            "order status manually overridden"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command, Command};

    #[test]
    fn parses_complete_and_status_commands() {
        assert_eq!(parse_command("!complete"), Some(Command::Complete));
        assert_eq!(
            parse_command("  !status ord-1 cancelled "),
            Some(Command::StatusOverride {
                order_id: "ord-1".to_string(),
                status: "cancelled".to_string(),
            })
        );
    }

    #[test]
    fn ignores_noise_and_malformed_commands() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command("!status ord-1"), None);
        assert_eq!(parse_command(""), None);
    }
}
