//! Payment records and the transition guard shared by the verify,
//! webhook, and COD-confirm paths.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{decimal_string, random_ref};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Chapa,
    Cod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// A payment in one of these states blocks a new payment on the
    /// same order.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Completed
        )
    }

    /// Forward-only state machine. Webhook redelivery and concurrent
    /// verify calls both funnel through this check, so a transition
    /// that does not move forward is simply not applied.
    pub fn can_transition(self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, target) {
            (Pending, Processing) => true,
            (Pending | Processing, Completed | Failed | Cancelled) => true,
            (Completed, Refunded) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    #[serde(with = "decimal_string")]
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub tx_ref: String,
    /// Gateway verify response, stored verbatim.
    pub verification_data: Option<serde_json::Value>,
    /// Last webhook payload, stored verbatim.
    pub webhook_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentHistory {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub old_status: Option<PaymentStatus>,
    pub new_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

pub fn new_tx_ref() -> String {
    random_ref("TX")
}

/// Map a webhook `event`/`status` pair onto a target payment status.
/// Unknown events are acknowledged without a transition.
pub fn webhook_target_status(event: &str, status: &str) -> Option<PaymentStatus> {
    match event {
        "charge.success" => Some(PaymentStatus::Completed),
        "charge.failed" | "charge.cancelled" => Some(PaymentStatus::Failed),
        "charge.refunded" => Some(PaymentStatus::Refunded),
        _ => match status {
            "success" => Some(PaymentStatus::Completed),
            "failed" | "cancelled" => Some(PaymentStatus::Failed),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_ref_shape() {
        let r = new_tx_ref();
        assert!(r.starts_with("TX-"));
        assert_eq!(r.len(), 19);
    }

    #[test]
    fn open_states_block_new_payments() {
        assert!(PaymentStatus::Pending.is_open());
        assert!(PaymentStatus::Processing.is_open());
        assert!(PaymentStatus::Completed.is_open());
        assert!(!PaymentStatus::Failed.is_open());
        assert!(!PaymentStatus::Cancelled.is_open());
        assert!(!PaymentStatus::Refunded.is_open());
    }

    #[test]
    fn completed_only_moves_to_refunded() {
        assert!(PaymentStatus::Completed.can_transition(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Completed.can_transition(PaymentStatus::Completed));
        assert!(!PaymentStatus::Completed.can_transition(PaymentStatus::Failed));
        assert!(!PaymentStatus::Completed.can_transition(PaymentStatus::Pending));
    }

    #[test]
    fn terminal_failures_accept_nothing() {
        for terminal in [PaymentStatus::Failed, PaymentStatus::Cancelled, PaymentStatus::Refunded] {
            for target in [
                PaymentStatus::Pending,
                PaymentStatus::Processing,
                PaymentStatus::Completed,
                PaymentStatus::Failed,
                PaymentStatus::Refunded,
                PaymentStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition(target), "{terminal:?} -> {target:?}");
            }
        }
    }

    #[test]
    fn webhook_event_mapping() {
        assert_eq!(
            webhook_target_status("charge.success", "success"),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            webhook_target_status("charge.failed", ""),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            webhook_target_status("charge.cancelled", ""),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            webhook_target_status("charge.refunded", ""),
            Some(PaymentStatus::Refunded)
        );
        assert_eq!(webhook_target_status("charge.pending", "unknown"), None);
    }

    #[test]
    fn webhook_falls_back_to_status_field() {
        assert_eq!(
            webhook_target_status("", "success"),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            webhook_target_status("payout.success", "failed"),
            Some(PaymentStatus::Failed)
        );
    }
}
