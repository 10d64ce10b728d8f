//! Catalog reference view. Full product CRUD lives in the catalog
//! service; orders and payments only need this slice.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decimal_string;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    /// Owning tenant; the catalog entry belongs here even when other
    /// tenants resell it.
    pub tenant_id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(with = "decimal_string")]
    pub base_price: Decimal,
    #[serde(with = "decimal_string")]
    pub profit_percentage: Decimal,
    pub is_public: bool,
    pub quantity: i32,
    pub total_sold: i32,
    pub total_reviews: i32,
    /// Rounded average rating, two decimal places.
    #[serde(with = "decimal_string")]
    pub total_ratings: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn selling_price(&self) -> Decimal {
        selling_price(self.base_price, self.profit_percentage)
    }
}

/// `base × (1 + pct/100)`, rounded to cents.
pub fn selling_price(base: Decimal, profit_percentage: Decimal) -> Decimal {
    (base * (Decimal::ONE + profit_percentage / Decimal::ONE_HUNDRED)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selling_price_applies_margin() {
        assert_eq!(
            selling_price(Decimal::new(100, 0), Decimal::new(20, 0)),
            Decimal::new(120, 0)
        );
        assert_eq!(
            selling_price(Decimal::new(999, 2), Decimal::new(50, 0)),
            Decimal::new(1499, 2)
        );
    }

    #[test]
    fn zero_margin_is_base_price() {
        assert_eq!(
            selling_price(Decimal::new(4200, 2), Decimal::ZERO),
            Decimal::new(4200, 2)
        );
    }
}
