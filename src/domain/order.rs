//! Order aggregate: header, line items, append-only history.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decimal_string;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    /// Set only by the refund workflow, never by a direct status update.
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Direct update-status policy: pending and processing may swap,
    /// otherwise only forward along pending → processing → shipped →
    /// delivered. `Refunded` is reserved for the refund workflow.
    pub fn can_transition(self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, target) {
            (Pending, Processing) | (Processing, Pending) => true,
            (Pending, Shipped) | (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    /// Selling tenant: the merchant fulfilling this order.
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    #[serde(with = "decimal_string")]
    pub subtotal: Decimal,
    #[serde(with = "decimal_string")]
    pub taxes: Decimal,
    #[serde(with = "decimal_string")]
    pub shipping: Decimal,
    #[serde(with = "decimal_string")]
    pub discount: Decimal,
    #[serde(with = "decimal_string")]
    pub total_amount: Decimal,
    pub shipping_address: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// Product owner at order time. Frozen: reassigning the product
    /// later does not rewrite history.
    pub product_owner_tenant_id: Uuid,
    pub quantity: i32,
    #[serde(with = "decimal_string")]
    pub price: Decimal,
    #[serde(with = "decimal_string::option")]
    pub custom_profit_percentage: Option<Decimal>,
    #[serde(with = "decimal_string::option")]
    pub custom_selling_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub description: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// `subtotal + taxes + shipping − discount`; rejects a negative result.
pub fn compute_total(
    subtotal: Decimal,
    taxes: Decimal,
    shipping: Decimal,
    discount: Decimal,
) -> Result<Decimal, ApiError> {
    let total = subtotal + taxes + shipping - discount;
    if total < Decimal::ZERO {
        return Err(ApiError::Validation(
            "total_amount cannot be negative".into(),
        ));
    }
    Ok(total)
}

/// `ORD-YYYYMMDD-NNNN`. `seq` is 1-based within the UTC day.
pub fn order_number(day: NaiveDate, seq: i64) -> String {
    format!("ORD-{}-{:04}", day.format("%Y%m%d"), seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_components_sum() {
        let total = compute_total(
            Decimal::new(240, 0),
            Decimal::new(15, 0),
            Decimal::new(10, 0),
            Decimal::new(5, 0),
        )
        .unwrap();
        assert_eq!(total, Decimal::new(260, 0));
    }

    #[test]
    fn negative_total_is_rejected() {
        let err = compute_total(
            Decimal::new(10, 0),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::new(50, 0),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn order_number_format() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(order_number(day, 1), "ORD-20250307-0001");
        assert_eq!(order_number(day, 42), "ORD-20250307-0042");
        assert_eq!(order_number(day, 10000), "ORD-20250307-10000");
    }

    #[test]
    fn pending_processing_swap_allowed() {
        assert!(OrderStatus::Pending.can_transition(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition(OrderStatus::Pending));
    }

    #[test]
    fn shipped_moves_only_forward() {
        assert!(OrderStatus::Shipped.can_transition(OrderStatus::Delivered));
        assert!(!OrderStatus::Shipped.can_transition(OrderStatus::Processing));
        assert!(!OrderStatus::Shipped.can_transition(OrderStatus::Pending));
    }

    #[test]
    fn refunded_is_never_a_direct_target() {
        for from in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(!from.can_transition(OrderStatus::Refunded));
        }
    }

    #[test]
    fn terminal_states_stay_put() {
        assert!(!OrderStatus::Delivered.can_transition(OrderStatus::Shipped));
        assert!(!OrderStatus::Refunded.can_transition(OrderStatus::Pending));
    }
}
