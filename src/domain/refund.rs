//! Refund workflow: request state machine plus the executed refund
//! record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{decimal_string, random_ref};
use crate::domain::payment::PaymentMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundRequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RefundRequestStatus {
    /// pending → approved | rejected; approved → completed.
    pub fn can_transition(self, target: RefundRequestStatus) -> bool {
        use RefundRequestStatus::*;
        matches!(
            (self, target),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Completed)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, RefundRequestStatus::Pending | RefundRequestStatus::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefundRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub status: RefundRequestStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Refund {
    pub id: Uuid,
    pub refund_request_id: Uuid,
    #[serde(with = "decimal_string")]
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub transaction_ref: String,
    pub status: RefundStatus,
    pub refunded_at: DateTime<Utc>,
}

pub fn new_refund_ref() -> String {
    random_ref("REF")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_flow() {
        use RefundRequestStatus::*;
        assert!(Pending.can_transition(Approved));
        assert!(Pending.can_transition(Rejected));
        assert!(Approved.can_transition(Completed));
        assert!(!Approved.can_transition(Approved));
        assert!(!Rejected.can_transition(Approved));
        assert!(!Completed.can_transition(Pending));
    }

    #[test]
    fn open_states() {
        assert!(RefundRequestStatus::Pending.is_open());
        assert!(RefundRequestStatus::Approved.is_open());
        assert!(!RefundRequestStatus::Rejected.is_open());
        assert!(!RefundRequestStatus::Completed.is_open());
    }

    #[test]
    fn refund_ref_shape() {
        let r = new_refund_ref();
        assert!(r.starts_with("REF-"));
        assert_eq!(r.len(), 20);
    }
}
