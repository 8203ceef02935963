use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use orderly_core::domain::order::{
    Currency, CustomerRef, ItemDetail, LineItem, Order, OrderId, OrderStatus, PaymentMethod,
};

use crate::repositories::{OrderRepository, RepositoryError};

/// Demo orders covering each item category and payment method, timestamped
/// in ascending creation order so the insert feed sees them in sequence.
pub fn demo_orders() -> Vec<Order> {
    let base = Utc::now();

    let order = |id: &str,
                 minutes_ago: i64,
                 items: Vec<LineItem>,
                 currency: Currency,
                 total: Decimal,
                 payment_method: PaymentMethod,
                 customer: &str| {
        let created = base - Duration::minutes(minutes_ago);
        Order {
            id: OrderId(id.to_string()),
            items,
            currency,
            total,
            payment_method,
            customer: CustomerRef(customer.to_string()),
            status: OrderStatus::Pending,
            created_at: created,
            updated_at: created,
        }
    };

    vec![
        order(
            "demo-ord-7aa001",
            30,
            vec![LineItem {
                name: "Leveling 50-70".to_string(),
                detail: ItemDetail::Leveling {
                    start_level: 50,
                    end_level: 70,
                    job: "Paladin".to_string(),
                },
                quantity: 1,
                unit_price: Decimal::new(3_999, 2),
            }],
            Currency::Usd,
            Decimal::new(3_999, 2),
            PaymentMethod::Card,
            "ravenna",
        ),
        order(
            "demo-ord-7bb002",
            20,
            vec![LineItem {
                name: "Gil".to_string(),
                detail: ItemDetail::GilCurrency { millions: 20 },
                quantity: 1,
                unit_price: Decimal::new(8_900, 2),
            }],
            Currency::Brl,
            Decimal::new(8_900, 2),
            PaymentMethod::Pix,
            "487112233445566778",
        ),
        order(
            "demo-ord-7cc003",
            10,
            vec![
                LineItem {
                    name: "Weekly raid clear".to_string(),
                    detail: ItemDetail::Generic,
                    quantity: 4,
                    unit_price: Decimal::new(1_250, 2),
                },
                LineItem {
                    name: "Gil".to_string(),
                    detail: ItemDetail::GilCurrency { millions: 5 },
                    quantity: 1,
                    unit_price: Decimal::new(2_300, 2),
                },
            ],
            Currency::Brl,
            Decimal::new(7_300, 2),
            PaymentMethod::Boleto,
            "marcos",
        ),
    ]
}

pub async fn seed_demo_orders<R>(repository: &R) -> Result<usize, RepositoryError>
where
    R: OrderRepository + ?Sized,
{
    let orders = demo_orders();
    let count = orders.len();
    for order in orders {
        repository.insert(order).await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use crate::repositories::{InMemoryOrderRepository, OrderRepository};

    use super::{demo_orders, seed_demo_orders};

    #[tokio::test]
    async fn seeding_is_idempotent_on_order_ids() {
        let repo = InMemoryOrderRepository::new();
        let first = seed_demo_orders(&repo).await.expect("first seed");
        let second = seed_demo_orders(&repo).await.expect("second seed");
        assert_eq!(first, second);

        for order in demo_orders() {
            let found = repo.find_by_id(&order.id).await.expect("find");
            assert!(found.is_some(), "order {} should be present", order.id.0);
        }
    }

    #[test]
    fn demo_orders_are_created_in_ascending_order() {
        let orders = demo_orders();
        for pair in orders.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }
}
