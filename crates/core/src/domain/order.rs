use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    /// Short id shown to humans in channel posts and thread names, e.g. `#A1B2C3`.
    /// The storefront generates long document ids; only the tail is readable.
    pub fn display(&self) -> String {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(6)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("#{}", tail.to_ascii_uppercase())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Usd,
    Brl,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Usd => "$",
            Self::Brl => "R$ ",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Brl => "BRL",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Boleto,
    Pix,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Card => "Credit Card",
            Self::Boleto => "Boleto",
            Self::Pix => "PIX",
        }
    }
}

/// Category-specific attributes of a line item. The storefront sells
/// character-leveling runs, in-game currency, and a catch-all for
/// everything else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ItemDetail {
    Leveling { start_level: u32, end_level: u32, job: String },
    GilCurrency { millions: u32 },
    Generic,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub detail: ItemDetail,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// How the storefront recorded the customer: either a platform username or a
/// raw numeric id, both opaque strings until resolution time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    PaymentConfirmed,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "awaiting_payment" => Some(Self::AwaitingPayment),
            "payment_confirmed" => Some(Self::PaymentConfirmed),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::AwaitingPayment,
        Self::PaymentConfirmed,
        Self::Processing,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub items: Vec<LineItem>,
    pub currency: Currency,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub customer: CustomerRef,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (&self.status, next),
            (OrderStatus::Pending, OrderStatus::AwaitingPayment)
                | (OrderStatus::AwaitingPayment, OrderStatus::PaymentConfirmed)
                | (OrderStatus::PaymentConfirmed, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Completed)
        ) || (!self.status.is_terminal() && next == OrderStatus::Cancelled)
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        Currency, CustomerRef, ItemDetail, LineItem, Order, OrderId, OrderStatus, PaymentMethod,
    };

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId("doc-9f3ka1b2c3".to_string()),
            items: vec![LineItem {
                name: "Leveling 50-60".to_string(),
                detail: ItemDetail::Leveling {
                    start_level: 50,
                    end_level: 60,
                    job: "Dragoon".to_string(),
                },
                quantity: 1,
                unit_price: Decimal::new(2500, 2),
            }],
            currency: Currency::Usd,
            total: Decimal::new(2500, 2),
            payment_method: PaymentMethod::Pix,
            customer: CustomerRef("lucas#0001".to_string()),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn allows_valid_lifecycle_transition() {
        let mut order = order(OrderStatus::Pending);
        order.transition_to(OrderStatus::AwaitingPayment).expect("pending -> awaiting_payment");
        assert_eq!(order.status, OrderStatus::AwaitingPayment);
    }

    #[test]
    fn blocks_transition_that_skips_payment() {
        let mut order = order(OrderStatus::Pending);
        let error = order
            .transition_to(OrderStatus::Processing)
            .expect_err("pending -> processing should fail");
        assert!(matches!(
            error,
            crate::errors::DomainError::InvalidStatusTransition { .. }
        ));
    }

    #[test]
    fn cancellation_is_reachable_from_any_non_terminal_state() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::AwaitingPayment,
            OrderStatus::PaymentConfirmed,
            OrderStatus::Processing,
        ] {
            let mut order = order(status);
            order.transition_to(OrderStatus::Cancelled).expect("cancel from non-terminal");
        }
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        for status in [OrderStatus::Completed, OrderStatus::Cancelled] {
            let order = order(status);
            for next in OrderStatus::ALL {
                assert!(!order.can_transition_to(next), "{status:?} -> {next:?} must be blocked");
            }
        }
    }

    #[test]
    fn display_id_is_uppercased_tail_of_document_id() {
        assert_eq!(OrderId("doc-9f3ka1b2c3".to_string()).display(), "#A1B2C3");
        assert_eq!(OrderId("ab".to_string()).display(), "#AB");
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }
}
