//! Message rendering for every notification the workflow sends.
//!
//! All functions are pure: order in, chat-markdown string out. Wording and
//! layout follow the storefront's customer-facing copy.

use orderly_core::domain::actor::Actor;
use orderly_core::domain::order::{
    Currency, ItemDetail, LineItem, Order, OrderStatus, PaymentMethod,
};
use orderly_core::workflow::completion::CompletionAction;

use crate::events::{ADMIN_EMOJI, APPROVE_EMOJI, REJECT_EMOJI, WORKER_EMOJI};

fn price(currency: Currency, amount: rust_decimal::Decimal) -> String {
    format!("{}{amount:.2}", currency.symbol())
}

/// Groups thousands with dots, the storefront's locale convention:
/// `1234` becomes `1.234`.
fn grouped(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

fn item_lines(order: &Order, item: &LineItem) -> Vec<String> {
    let mut lines = vec![format!("🎯 **{}**", item.name)];

    match &item.detail {
        ItemDetail::Leveling { start_level, end_level, job } => {
            lines.push(format!("• Level: {start_level} → {end_level}"));
            lines.push(format!("• Job: {job}"));
        }
        ItemDetail::GilCurrency { millions } => {
            lines.push(format!("• Amount: {} million gil", grouped(u64::from(*millions))));
        }
        ItemDetail::Generic => {}
    }

    lines.push(format!("• Quantity: {}x", item.quantity));
    lines.push(format!("• Price: {}", price(order.currency, item.unit_price)));
    lines
}

fn order_summary(order: &Order) -> String {
    let mut lines = vec!["**Order Details:**".to_string()];
    for item in &order.items {
        lines.push(String::new());
        lines.extend(item_lines(order, item));
    }
    lines.push(String::new());
    lines.push("💰 **Payment Summary:**".to_string());
    lines.push(format!("• Method: {}", order.payment_method.label()));
    lines.push(format!("• Total: {}", price(order.currency, order.total)));
    lines.join("\n")
}

pub fn order_confirmation(order: &Order) -> String {
    [
        "🎮 **New Order Confirmed!**".to_string(),
        format!("📦 **Order Number:** {}", order.id.display()),
        String::new(),
        order_summary(order),
        String::new(),
        "📝 **Next Steps:**".to_string(),
        "1. We will send payment instructions shortly".to_string(),
        "2. Your order starts as soon as payment is confirmed".to_string(),
        "3. Keep your account active so we can reach you".to_string(),
        String::new(),
        "❓ **Need Help?**".to_string(),
        "Message us here any time.".to_string(),
    ]
    .join("\n")
}

pub fn admin_order_notification(order: &Order, customer: Option<&Actor>) -> String {
    let customer_line = match customer {
        Some(actor) => format!("👤 Customer: {} ({})", actor.name, actor.mention()),
        None => "👤 Customer: *unresolved*".to_string(),
    };

    let mut lines = vec![
        format!("📬 **New order {}**", order.id.display()),
        customer_line,
        String::new(),
        order_summary(order),
    ];

    if customer.is_some() {
        lines.push(String::new());
        lines.push(format!(
            "React {APPROVE_EMOJI} to approve and send payment instructions, {REJECT_EMOJI} to reject."
        ));
    }

    lines.join("\n")
}

pub fn unresolved_customer_alert(order: &Order, identifier: &str) -> String {
    format!(
        "⚠️ Could not resolve customer `{identifier}` for order {}. \
         No confirmation was sent; handle this order manually.",
        order.id.display()
    )
}

pub fn payment_instructions(order: &Order) -> String {
    let method_lines = match order.payment_method {
        PaymentMethod::Pix => vec![
            "Pay with **PIX** using the key we registered for the shop.".to_string(),
            "The transfer completes instantly.".to_string(),
        ],
        PaymentMethod::Boleto => vec![
            "A **Boleto** slip will be issued to your e-mail address.".to_string(),
            "Settlement can take up to two business days.".to_string(),
        ],
        PaymentMethod::Card => vec![
            "Complete the **Credit Card** checkout from your order page.".to_string(),
        ],
    };

    let mut lines = vec![
        format!("✅ Your order {} was approved!", order.id.display()),
        String::new(),
        format!(
            "💳 **Payment:** {} · {}",
            order.payment_method.label(),
            price(order.currency, order.total)
        ),
    ];
    lines.extend(method_lines);
    lines.push(String::new());
    lines.push(format!(
        "React {APPROVE_EMOJI} here once you have paid, or {REJECT_EMOJI} to request cancellation."
    ));
    lines.join("\n")
}

pub fn payment_reported(order: &Order, customer: &Actor) -> String {
    format!(
        "💰 {} reports payment for order {} ({}, {}).\n\
         React {APPROVE_EMOJI} to confirm receipt, {REJECT_EMOJI} if the payment has not arrived.",
        customer.mention(),
        order.id.display(),
        order.payment_method.label(),
        price(order.currency, order.total)
    )
}

pub fn payment_not_confirmed(order: &Order) -> String {
    format!(
        "❌ We could not confirm your payment for order {} yet. \
         Please double-check the transfer and react {APPROVE_EMOJI} on the payment message again.",
        order.id.display()
    )
}

pub fn payment_confirmed_notice(order: &Order) -> String {
    format!(
        "✅ Payment confirmed for order {}! We are preparing to start your order.",
        order.id.display()
    )
}

pub fn admin_decision_prompt(order: &Order) -> String {
    format!(
        "📋 Order {} is paid. React {WORKER_EMOJI} to post it to the worker channel \
         or {ADMIN_EMOJI} to take it yourself.",
        order.id.display()
    )
}

pub fn work_assignment_post(order: &Order) -> String {
    format!(
        "🛠️ **Work available: order {}**\n\n{}\n\nReact {APPROVE_EMOJI} to claim it. \
         First reaction wins.",
        order.id.display(),
        order_summary(order)
    )
}

pub fn thread_name(order: &Order) -> String {
    format!("order-{}", order.id.display().trim_start_matches('#').to_ascii_lowercase())
}

pub fn thread_intro(order: &Order, client: &Actor, worker: &Actor) -> String {
    format!(
        "🧵 Order {} is now in progress.\n\
         Client: {} · Worker: {}\n\n\
         When the work is done, both of you react {APPROVE_EMOJI} on the status message below \
         to close the order, or {REJECT_EMOJI} to cancel it. You can also type `!complete` \
         here to restart the sign-off.",
        order.id.display(),
        client.mention(),
        worker.mention()
    )
}

pub fn completion_status_line(
    order_display: &str,
    client: &Actor,
    worker: &Actor,
    action: Option<CompletionAction>,
    client_confirmed: bool,
    worker_confirmed: bool,
) -> String {
    let action_label = match action {
        None => "completion or cancellation",
        Some(CompletionAction::Complete) => "**completion**",
        Some(CompletionAction::Cancel) => "**cancellation**",
    };
    let flag = |confirmed: bool| if confirmed { APPROVE_EMOJI } else { "⬜" };

    format!(
        "📊 Sign-off for order {order_display} ({action_label})\n\
         {} client {} · {} worker {}",
        flag(client_confirmed),
        client.mention(),
        flag(worker_confirmed),
        worker.mention()
    )
}

pub fn completion_finalized(order: &Order, action: CompletionAction) -> String {
    match action {
        CompletionAction::Complete => format!(
            "🎉 Order {} is complete! Thank you for your business.",
            order.id.display()
        ),
        CompletionAction::Cancel => format!(
            "🚫 Order {} was cancelled by agreement of both parties.",
            order.id.display()
        ),
    }
}

pub fn finalize_retry_notice(order_display: &str) -> String {
    format!(
        "⚠️ Closing order {order_display} failed partway. \
         React {APPROVE_EMOJI} on the status message again to retry."
    )
}

pub fn stale_reminder(order: &Order) -> String {
    format!(
        "⏰ Reminder: your order {} is still awaiting approval. \
         It was placed over a day ago; we will get to it as soon as possible.",
        order.id.display()
    )
}

pub fn order_cancelled_notice(order: &Order) -> String {
    format!(
        "🚫 Your order {} was cancelled. If this is unexpected, contact us here.",
        order.id.display()
    )
}

pub fn admin_cancellation_notice(order: &Order) -> String {
    format!("🚫 Order {} was rejected and cancelled.", order.id.display())
}

pub fn cancellation_reason_prompt(order: &Order) -> String {
    format!(
        "📝 You asked to cancel order {}. Reply here with a short reason within \
         the next few minutes so we can process it.",
        order.id.display()
    )
}

pub fn cancellation_reason_received(order: &Order, customer: &Actor, reason: &str) -> String {
    format!(
        "📮 {} requests cancellation of order {}: {reason}",
        customer.mention(),
        order.id.display()
    )
}

pub fn cancellation_timeout_notice(order: &Order) -> String {
    format!(
        "⌛ We did not receive a cancellation reason for order {} in time. \
         The order is unchanged; react {REJECT_EMOJI} again if you still want to cancel.",
        order.id.display()
    )
}

pub fn status_override_reply(order_display: &str, from: OrderStatus, to: OrderStatus) -> String {
    format!("🔧 Order {order_display}: status changed `{}` → `{}`.", from.as_str(), to.as_str())
}

pub fn unknown_status_reply(value: &str) -> String {
    let valid: Vec<&str> = OrderStatus::ALL.iter().map(OrderStatus::as_str).collect();
    format!("❌ Unknown status `{value}`. Valid statuses: `{}`.", valid.join("`, `"))
}

pub fn order_not_found_reply(identifier: &str) -> String {
    format!("❌ No order matches `{identifier}`.")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use orderly_core::domain::actor::{Actor, ActorId};
    use orderly_core::domain::order::{
        Currency, CustomerRef, ItemDetail, LineItem, Order, OrderId, OrderStatus, PaymentMethod,
    };
    use orderly_core::workflow::completion::CompletionAction;

    use super::{
        admin_order_notification, completion_status_line, grouped, order_confirmation,
        payment_instructions, thread_name, unknown_status_reply,
    };

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId("doc-x9a1b2c3".to_string()),
            items: vec![
                LineItem {
                    name: "Leveling 60-70".to_string(),
                    detail: ItemDetail::Leveling {
                        start_level: 60,
                        end_level: 70,
                        job: "White Mage".to_string(),
                    },
                    quantity: 1,
                    unit_price: Decimal::new(3_500, 2),
                },
                LineItem {
                    name: "Gil".to_string(),
                    detail: ItemDetail::GilCurrency { millions: 1250 },
                    quantity: 2,
                    unit_price: Decimal::new(2_000, 2),
                },
            ],
            currency: Currency::Brl,
            total: Decimal::new(7_500, 2),
            payment_method: PaymentMethod::Pix,
            customer: CustomerRef("joana".to_string()),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn confirmation_renders_display_id_items_and_totals() {
        let text = order_confirmation(&order());
        assert!(text.contains("#A1B2C3"));
        assert!(text.contains("Level: 60 → 70"));
        assert!(text.contains("Job: White Mage"));
        assert!(text.contains("1.250 million gil"));
        assert!(text.contains("Method: PIX"));
        assert!(text.contains("Total: R$ 75.00"));
        assert!(text.contains("Next Steps"));
    }

    #[test]
    fn grouped_uses_dot_separators() {
        assert_eq!(grouped(7), "7");
        assert_eq!(grouped(1_250), "1.250");
        assert_eq!(grouped(12_345_678), "12.345.678");
    }

    #[test]
    fn admin_notification_only_offers_reactions_for_resolved_customers() {
        let order = order();
        let actor = Actor { id: ActorId(5), name: "joana".to_string(), is_bot: false };

        let with_customer = admin_order_notification(&order, Some(&actor));
        assert!(with_customer.contains("React ✅"));
        assert!(with_customer.contains("<@5>"));

        let without_customer = admin_order_notification(&order, None);
        assert!(!without_customer.contains("React ✅"));
        assert!(without_customer.contains("*unresolved*"));
    }

    #[test]
    fn payment_instructions_follow_the_payment_method() {
        let mut order = order();
        assert!(payment_instructions(&order).contains("PIX"));

        order.payment_method = PaymentMethod::Boleto;
        assert!(payment_instructions(&order).contains("Boleto"));

        order.payment_method = PaymentMethod::Card;
        assert!(payment_instructions(&order).contains("Credit Card"));
    }

    #[test]
    fn thread_name_is_lowercased_display_id() {
        assert_eq!(thread_name(&order()), "order-a1b2c3");
    }

    #[test]
    fn status_line_tracks_flags_and_action() {
        let client = Actor { id: ActorId(1), name: "c".to_string(), is_bot: false };
        let worker = Actor { id: ActorId(2), name: "w".to_string(), is_bot: false };

        let line = completion_status_line(
            "#A1B2C3",
            &client,
            &worker,
            Some(CompletionAction::Complete),
            true,
            false,
        );
        assert!(line.contains("**completion**"));
        assert!(line.contains("✅ client"));
        assert!(line.contains("⬜ worker"));
    }

    #[test]
    fn unknown_status_reply_enumerates_valid_values() {
        let reply = unknown_status_reply("shipped");
        assert!(reply.contains("`shipped`"));
        assert!(reply.contains("`pending`"));
        assert!(reply.contains("`cancelled`"));
    }
}
