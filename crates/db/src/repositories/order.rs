use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use orderly_core::domain::order::{
    Currency, CustomerRef, LineItem, Order, OrderId, OrderStatus, PaymentMethod,
};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_currency(value: &str) -> Result<Currency, RepositoryError> {
    match value {
        "usd" => Ok(Currency::Usd),
        "brl" => Ok(Currency::Brl),
        other => Err(RepositoryError::Decode(format!("unknown currency `{other}`"))),
    }
}

fn currency_as_str(currency: &Currency) -> &'static str {
    match currency {
        Currency::Usd => "usd",
        Currency::Brl => "brl",
    }
}

fn parse_payment_method(value: &str) -> Result<PaymentMethod, RepositoryError> {
    match value {
        "card" => Ok(PaymentMethod::Card),
        "boleto" => Ok(PaymentMethod::Boleto),
        "pix" => Ok(PaymentMethod::Pix),
        other => Err(RepositoryError::Decode(format!("unknown payment method `{other}`"))),
    }
}

fn payment_method_as_str(method: &PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "card",
        PaymentMethod::Boleto => "boleto",
        PaymentMethod::Pix => "pix",
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let items_json: String =
        row.try_get("items").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency_str: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_str: String =
        row.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payment_str: String =
        row.try_get("payment_method").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer: String =
        row.try_get("customer").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let items: Vec<LineItem> = serde_json::from_str(&items_json)
        .map_err(|e| RepositoryError::Decode(format!("items column: {e}")))?;
    let total: Decimal = total_str
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("invalid total `{total_str}`")))?;
    let status = OrderStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_str}`")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at column: {e}")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("updated_at column: {e}")))?;

    Ok(Order {
        id: OrderId(id),
        items,
        currency: parse_currency(&currency_str)?,
        total,
        payment_method: parse_payment_method(&payment_str)?,
        customer: CustomerRef(customer),
        status,
        created_at,
        updated_at,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, items, currency, total, payment_method, customer, status,
                    created_at, updated_at
             FROM orders WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_string(&order.items)
            .map_err(|e| RepositoryError::Decode(format!("items column: {e}")))?;

        sqlx::query(
            "INSERT INTO orders (id, items, currency, total, payment_method, customer,
                                 status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 items = excluded.items,
                 currency = excluded.currency,
                 total = excluded.total,
                 payment_method = excluded.payment_method,
                 customer = excluded.customer,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&order.id.0)
        .bind(items_json)
        .bind(currency_as_str(&order.currency))
        .bind(order.total.to_string())
        .bind(payment_method_as_str(&order.payment_method))
        .bind(&order.customer.0)
        .bind(order.status.as_str())
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, items, currency, total, payment_method, customer, status,
                    created_at, updated_at
             FROM orders
             WHERE status = 'pending' AND created_at < ?
             ORDER BY created_at ASC",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect::<Result<Vec<_>, _>>()
    }

    async fn list_created_after(
        &self,
        watermark: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, items, currency, total, payment_method, customer, status,
                    created_at, updated_at
             FROM orders
             WHERE created_at > ?
             ORDER BY created_at ASC",
        )
        .bind(watermark.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect::<Result<Vec<_>, _>>()
    }
}
