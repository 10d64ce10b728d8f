//! Domain events, published after each write transaction commits and
//! persisted by the activity sink.

use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::order::OrderStatus;
use crate::domain::payment::{PaymentMethod, PaymentStatus};
use crate::domain::refund::RefundRequestStatus;

#[derive(Debug, Clone)]
pub enum DomainEvent {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderItemsReplaced {
        order_id: Uuid,
        item_count: usize,
    },
    DeliveryConfirmed {
        order_id: Uuid,
    },
    PaymentInitiated {
        payment_id: Uuid,
        order_id: Uuid,
        method: PaymentMethod,
        tx_ref: String,
    },
    PaymentStatusChanged {
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    WebhookIgnored {
        tx_ref: String,
        event: String,
    },
    RefundRequested {
        refund_request_id: Uuid,
        order_id: Uuid,
    },
    RefundDecided {
        refund_request_id: Uuid,
        status: RefundRequestStatus,
    },
    RefundExecuted {
        refund_id: Uuid,
        refund_request_id: Uuid,
        transaction_ref: String,
    },
    ReviewCreated {
        review_id: Uuid,
        product_id: Uuid,
        rating: i16,
    },
    ReviewDeleted {
        review_id: Uuid,
        product_id: Uuid,
    },
    ProductCreated {
        product_id: Uuid,
    },
    ProductListed {
        product_id: Uuid,
        listing_tenant_id: Uuid,
    },
    ApiKeyCreated {
        api_key_id: Uuid,
    },
    ApiKeyRevoked {
        api_key_id: Uuid,
    },
}

impl DomainEvent {
    pub fn action(&self) -> &'static str {
        use DomainEvent::*;
        match self {
            OrderCreated { .. } => "order.created",
            OrderStatusChanged { .. } => "order.status_changed",
            OrderItemsReplaced { .. } => "order.items_replaced",
            DeliveryConfirmed { .. } => "order.delivery_confirmed",
            PaymentInitiated { .. } => "payment.initiated",
            PaymentStatusChanged { .. } => "payment.status_changed",
            WebhookIgnored { .. } => "payment.webhook_ignored",
            RefundRequested { .. } => "refund.requested",
            RefundDecided { .. } => "refund.decided",
            RefundExecuted { .. } => "refund.executed",
            ReviewCreated { .. } => "review.created",
            ReviewDeleted { .. } => "review.deleted",
            ProductCreated { .. } => "product.created",
            ProductListed { .. } => "product.listed",
            ApiKeyCreated { .. } => "api_key.created",
            ApiKeyRevoked { .. } => "api_key.revoked",
        }
    }

    pub fn details(&self) -> Value {
        use DomainEvent::*;
        match self {
            OrderCreated {
                order_id,
                order_number,
                total_amount,
            } => json!({
                "order_id": order_id,
                "order_number": order_number,
                "total_amount": format!("{:.2}", total_amount),
            }),
            OrderStatusChanged { order_id, from, to } => json!({
                "order_id": order_id,
                "from": from.as_str(),
                "to": to.as_str(),
            }),
            OrderItemsReplaced {
                order_id,
                item_count,
            } => json!({ "order_id": order_id, "item_count": item_count }),
            DeliveryConfirmed { order_id } => json!({ "order_id": order_id }),
            PaymentInitiated {
                payment_id,
                order_id,
                method,
                tx_ref,
            } => json!({
                "payment_id": payment_id,
                "order_id": order_id,
                "method": method,
                "tx_ref": tx_ref,
            }),
            PaymentStatusChanged {
                payment_id,
                from,
                to,
            } => json!({
                "payment_id": payment_id,
                "from": from.as_str(),
                "to": to.as_str(),
            }),
            WebhookIgnored { tx_ref, event } => {
                json!({ "tx_ref": tx_ref, "event": event })
            }
            RefundRequested {
                refund_request_id,
                order_id,
            } => json!({
                "refund_request_id": refund_request_id,
                "order_id": order_id,
            }),
            RefundDecided {
                refund_request_id,
                status,
            } => json!({
                "refund_request_id": refund_request_id,
                "status": status,
            }),
            RefundExecuted {
                refund_id,
                refund_request_id,
                transaction_ref,
            } => json!({
                "refund_id": refund_id,
                "refund_request_id": refund_request_id,
                "transaction_ref": transaction_ref,
            }),
            ReviewCreated {
                review_id,
                product_id,
                rating,
            } => json!({
                "review_id": review_id,
                "product_id": product_id,
                "rating": rating,
            }),
            ReviewDeleted {
                review_id,
                product_id,
            } => json!({ "review_id": review_id, "product_id": product_id }),
            ProductCreated { product_id } => json!({ "product_id": product_id }),
            ProductListed {
                product_id,
                listing_tenant_id,
            } => json!({
                "product_id": product_id,
                "listing_tenant_id": listing_tenant_id,
            }),
            ApiKeyCreated { api_key_id } => json!({ "api_key_id": api_key_id }),
            ApiKeyRevoked { api_key_id } => json!({ "api_key_id": api_key_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_are_dotted() {
        let event = DomainEvent::OrderStatusChanged {
            order_id: Uuid::new_v4(),
            from: OrderStatus::Pending,
            to: OrderStatus::Processing,
        };
        assert_eq!(event.action(), "order.status_changed");
        assert_eq!(event.details()["from"], "pending");
        assert_eq!(event.details()["to"], "processing");
    }

    #[test]
    fn amounts_render_with_two_digits() {
        let event = DomainEvent::OrderCreated {
            order_id: Uuid::new_v4(),
            order_number: "ORD-20250307-0001".into(),
            total_amount: Decimal::new(240, 0),
        };
        assert_eq!(event.details()["total_amount"], "240.00");
    }
}
