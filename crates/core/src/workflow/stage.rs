use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, MessageId};
use crate::domain::order::{Order, OrderId};

/// One point in the workflow where a human reaction advances or halts an
/// order. A sent message is registered under exactly one stage; the variant
/// carries the payload its handler needs to interpret a reaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StageEntry {
    /// Admin channel post asking for initial approval. Only opened when the
    /// customer resolved; unresolved customers get an alert with no
    /// reaction affordances.
    OrderApproval { order: Order, customer: Actor },
    /// Customer DM with payment instructions; only the customer's reaction
    /// counts.
    PaymentConfirmation { order: Order, customer: Actor },
    /// Admin channel post asking to verify a self-reported payment.
    PaymentVerification { order: Order, customer: Actor },
    /// Admin channel prompt deciding between worker hand-off and
    /// self-assignment.
    AdminDecision { order: Order, customer: Actor },
    /// Worker channel post; the first non-bot claimant wins.
    WorkAssignment { order: Order, customer: Actor },
    /// Thread status line of the dual-confirmation protocol; the payload
    /// lives in the completion record keyed by order id.
    CompletionConfirmation { order_id: OrderId },
}

impl StageEntry {
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::OrderApproval { .. } => "order_approval",
            Self::PaymentConfirmation { .. } => "payment_confirmation",
            Self::PaymentVerification { .. } => "payment_verification",
            Self::AdminDecision { .. } => "admin_decision",
            Self::WorkAssignment { .. } => "work_assignment",
            Self::CompletionConfirmation { .. } => "completion_confirmation",
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::OrderApproval { order, .. }
            | Self::PaymentConfirmation { order, .. }
            | Self::PaymentVerification { order, .. }
            | Self::AdminDecision { order, .. }
            | Self::WorkAssignment { order, .. } => &order.id,
            Self::CompletionConfirmation { order_id } => order_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct StageRecord {
    entry: StageEntry,
    opened_at: DateTime<Utc>,
}

/// In-memory mapping from sent message ids to workflow stages.
///
/// A message id is present in at most one stage at a time: `open` replaces
/// any prior registration and `resolve` retires the entry when its stage
/// concludes. Abandoned entries (a stage nobody ever reacted to) are bounded
/// by `evict_older_than`, which the runtime drives on a timer.
#[derive(Clone, Debug, Default)]
pub struct StageRegistry {
    entries: HashMap<MessageId, StageRecord>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, message_id: MessageId, entry: StageEntry, now: DateTime<Utc>) {
        self.entries.insert(message_id, StageRecord { entry, opened_at: now });
    }

    /// Removes and returns the stage registered for `message_id`. A missing
    /// key means the stage was already resolved by an earlier event.
    pub fn resolve(&mut self, message_id: &MessageId) -> Option<StageEntry> {
        self.entries.remove(message_id).map(|record| record.entry)
    }

    pub fn peek(&self, message_id: &MessageId) -> Option<&StageEntry> {
        self.entries.get(message_id).map(|record| &record.entry)
    }

    pub fn message_ids_for_order(&self, order_id: &OrderId) -> Vec<MessageId> {
        self.entries
            .iter()
            .filter(|(_, record)| record.entry.order_id() == order_id)
            .map(|(message_id, _)| message_id.clone())
            .collect()
    }

    /// Drops every stage referencing `order_id`, returning the retired
    /// message ids so the caller can delete the messages themselves.
    pub fn remove_for_order(&mut self, order_id: &OrderId) -> Vec<MessageId> {
        let ids = self.message_ids_for_order(order_id);
        for message_id in &ids {
            self.entries.remove(message_id);
        }
        ids
    }

    /// TTL sweep: evicts entries opened more than `ttl` before `now`.
    pub fn evict_older_than(&mut self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - ttl;
        let before = self.entries.len();
        self.entries.retain(|_, record| record.opened_at > cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::actor::{Actor, ActorId, MessageId};
    use crate::domain::order::{
        Currency, CustomerRef, ItemDetail, LineItem, Order, OrderId, OrderStatus, PaymentMethod,
    };

    use super::{StageEntry, StageRegistry};

    fn order(id: &str) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId(id.to_string()),
            items: vec![LineItem {
                name: "Gil".to_string(),
                detail: ItemDetail::GilCurrency { millions: 10 },
                quantity: 1,
                unit_price: Decimal::new(1500, 2),
            }],
            currency: Currency::Brl,
            total: Decimal::new(1500, 2),
            payment_method: PaymentMethod::Pix,
            customer: CustomerRef("ana".to_string()),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn customer() -> Actor {
        Actor { id: ActorId(7), name: "ana".to_string(), is_bot: false }
    }

    #[test]
    fn open_then_resolve_retires_the_entry() {
        let mut registry = StageRegistry::new();
        registry.open(
            MessageId(1),
            StageEntry::OrderApproval { order: order("ord-1"), customer: customer() },
            Utc::now(),
        );

        let entry = registry.resolve(&MessageId(1)).expect("entry should exist");
        assert_eq!(entry.stage_name(), "order_approval");
        assert!(registry.resolve(&MessageId(1)).is_none(), "second resolve sees nothing");
        assert!(registry.is_empty());
    }

    #[test]
    fn message_id_lives_in_at_most_one_stage() {
        let mut registry = StageRegistry::new();
        registry.open(
            MessageId(1),
            StageEntry::OrderApproval { order: order("ord-1"), customer: customer() },
            Utc::now(),
        );
        registry.open(
            MessageId(1),
            StageEntry::PaymentVerification { order: order("ord-1"), customer: customer() },
            Utc::now(),
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.peek(&MessageId(1)).expect("entry").stage_name(),
            "payment_verification"
        );
    }

    #[test]
    fn remove_for_order_returns_all_stage_messages_of_that_order() {
        let mut registry = StageRegistry::new();
        let now = Utc::now();
        registry.open(
            MessageId(1),
            StageEntry::OrderApproval { order: order("ord-1"), customer: customer() },
            now,
        );
        registry.open(
            MessageId(2),
            StageEntry::AdminDecision { order: order("ord-1"), customer: customer() },
            now,
        );
        registry.open(
            MessageId(3),
            StageEntry::WorkAssignment { order: order("ord-2"), customer: customer() },
            now,
        );

        let mut removed = registry.remove_for_order(&OrderId("ord-1".to_string()));
        removed.sort_by_key(|id| id.0);
        assert_eq!(removed, vec![MessageId(1), MessageId(2)]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ttl_sweep_evicts_only_stale_entries() {
        let mut registry = StageRegistry::new();
        let now = Utc::now();
        registry.open(
            MessageId(1),
            StageEntry::OrderApproval { order: order("ord-1"), customer: customer() },
            now - Duration::hours(100),
        );
        registry.open(
            MessageId(2),
            StageEntry::CompletionConfirmation { order_id: OrderId("ord-2".to_string()) },
            now,
        );

        let evicted = registry.evict_older_than(Duration::hours(72), now);
        assert_eq!(evicted, 1);
        assert!(registry.peek(&MessageId(1)).is_none());
        assert!(registry.peek(&MessageId(2)).is_some());
    }
}
