//! Payment engine: initiation, synchronous verification, webhook
//! ingestion, and COD confirmation.
//!
//! All three completion paths converge on [`apply_transition`], which
//! re-reads the payment under a row lock and applies the forward-only
//! state machine. Success side effects run inside the same transaction,
//! so webhook redelivery cannot double-apply them.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::events::DomainEvent;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::{
    new_tx_ref, webhook_target_status, Payment, PaymentHistory, PaymentMethod, PaymentStatus,
};
use crate::domain::tenant::User;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{InitializeRequest, VerifyOutcome, CURRENCY};
use crate::services::{activity, Page, Paginated};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub phone_number: Option<String>,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    pub payment_id: Uuid,
    pub tx_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentDetail {
    #[serde(flatten)]
    pub payment: Payment,
    pub history: Vec<PaymentHistory>,
}

/// Webhook processing result; always acknowledged with 200 upstream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookAck {
    Success { message: String },
    Error { message: String },
}

async fn fetch_order(state: &AppState, id: Uuid) -> ApiResult<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("order"))
}

fn authorize_payment_actor(ctx: &AuthContext, order: &Order) -> ApiResult<()> {
    let is_buyer = ctx.user_id().is_some() && ctx.user_id() == order.user_id;
    if is_buyer || ctx.is_staff_of(order.tenant_id) {
        Ok(())
    } else {
        Err(ApiError::not_found("order"))
    }
}

/// Split a display name into the first/last pair the gateway wants.
fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or("Customer").to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, if last.is_empty() { "-".into() } else { last })
}

pub async fn initiate(
    state: &AppState,
    ctx: &AuthContext,
    input: InitiatePayment,
) -> ApiResult<InitiatedPayment> {
    let order = fetch_order(state, input.order_id).await?;
    authorize_payment_actor(ctx, &order)?;

    if order.total_amount <= Decimal::ZERO {
        return Err(ApiError::Validation(
            "order total must be positive to take payment".into(),
        ));
    }
    let open_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM payments WHERE order_id = $1 \
         AND status IN ('pending', 'processing', 'completed'))",
    )
    .bind(order.id)
    .fetch_one(&state.db)
    .await?;
    if open_exists {
        return Err(ApiError::Conflict(
            "order already has a payment in flight or completed".into(),
        ));
    }

    let tx_ref = new_tx_ref();
    let checkout_url = match input.method {
        PaymentMethod::Chapa => {
            let (email, full_name) = buyer_contact(state, &order).await?;
            let (first_name, last_name) = split_name(&full_name);
            // Gateway call happens before any row exists: a declined or
            // unreachable gateway must not leave a dangling payment.
            let session = state
                .gateway
                .initialize(&InitializeRequest {
                    amount: format!("{:.2}", order.total_amount),
                    currency: CURRENCY.into(),
                    email,
                    first_name,
                    last_name,
                    tx_ref: tx_ref.clone(),
                    callback_url: format!(
                        "{}/payments/chapa_webhook",
                        state.config.callback_base_url.trim_end_matches('/')
                    ),
                    return_url: input.return_url.clone(),
                    phone_number: input.phone_number.clone(),
                    customization: None,
                })
                .await?;
            Some(session.checkout_url)
        }
        PaymentMethod::Cod => None,
    };

    let mut tx = state.db.begin().await?;
    let payment = sqlx::query_as::<_, Payment>(
        "INSERT INTO payments (id, order_id, amount, method, status, tx_ref) \
         VALUES ($1, $2, $3, $4, 'pending', $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(order.id)
    .bind(order.total_amount)
    .bind(input.method)
    .bind(&tx_ref)
    .fetch_one(&mut *tx)
    .await?;
    insert_history(&mut tx, payment.id, None, PaymentStatus::Pending).await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::PaymentInitiated {
            payment_id: payment.id,
            order_id: order.id,
            method: input.method,
            tx_ref: tx_ref.clone(),
        },
    )
    .await;

    Ok(InitiatedPayment {
        payment_id: payment.id,
        tx_ref,
        checkout_url,
    })
}

/// Buyer email/name for the gateway, falling back to the selling
/// tenant's contact for anonymous orders.
async fn buyer_contact(state: &AppState, order: &Order) -> ApiResult<(String, String)> {
    if let Some(user_id) = order.user_id {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&state.db)
            .await?;
        return Ok((user.email, user.full_name));
    }
    let (email, name): (String, String) =
        sqlx::query_as("SELECT email, name FROM tenants WHERE id = $1")
            .bind(order.tenant_id)
            .fetch_one(&state.db)
            .await?;
    Ok((email, name))
}

async fn insert_history(
    conn: &mut PgConnection,
    payment_id: Uuid,
    old_status: Option<PaymentStatus>,
    new_status: PaymentStatus,
) -> ApiResult<()> {
    sqlx::query(
        "INSERT INTO payment_history (id, payment_id, old_status, new_status) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(payment_id)
    .bind(old_status)
    .bind(new_status)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Re-read the payment under a row lock and move it to `target` if the
/// state machine allows. On entry into `completed`, the success side
/// effects run in the same transaction: the order moves to
/// `processing` (never downgraded) and each line item's quantity is
/// added to its product's `total_sold`.
///
/// Returns `Some((old, new))` when a transition was applied, `None`
/// when the payment was already at or past `target` (idempotent
/// redelivery, concurrent verify).
pub async fn apply_transition(
    state: &AppState,
    payment_id: Uuid,
    target: PaymentStatus,
    verification_data: Option<Value>,
    webhook_data: Option<Value>,
) -> ApiResult<Option<(PaymentStatus, PaymentStatus)>> {
    let mut tx = state.db.begin().await?;
    let payment =
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .fetch_one(&mut *tx)
            .await?;

    if !payment.status.can_transition(target) {
        tx.rollback().await?;
        return Ok(None);
    }

    sqlx::query(
        "UPDATE payments SET status = $2, \
         verification_data = COALESCE($3, verification_data), \
         webhook_data = COALESCE($4, webhook_data), \
         updated_at = NOW() WHERE id = $1",
    )
    .bind(payment_id)
    .bind(target)
    .bind(verification_data)
    .bind(webhook_data)
    .execute(&mut *tx)
    .await?;
    insert_history(&mut tx, payment_id, Some(payment.status), target).await?;

    if target == PaymentStatus::Completed {
        apply_success_side_effects(&mut tx, &payment).await?;
    }
    tx.commit().await?;
    Ok(Some((payment.status, target)))
}

/// Runs at most once per payment: the caller only reaches here when the
/// status actually moved to `completed` under the row lock.
async fn apply_success_side_effects(conn: &mut PgConnection, payment: &Payment) -> ApiResult<()> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(payment.order_id)
        .fetch_one(&mut *conn)
        .await?;
    if order.status == OrderStatus::Pending {
        sqlx::query("UPDATE orders SET status = 'processing', updated_at = NOW() WHERE id = $1")
            .bind(order.id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT INTO order_history (id, order_id, status, description) \
             VALUES ($1, $2, 'processing', 'Payment completed')",
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .execute(&mut *conn)
        .await?;
    }

    let items: Vec<(Uuid, i32)> =
        sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .fetch_all(&mut *conn)
            .await?;
    for (product_id, quantity) in items {
        sqlx::query(
            "UPDATE products SET total_sold = total_sold + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn fetch_by_tx_ref(state: &AppState, tx_ref: &str) -> ApiResult<Option<Payment>> {
    Ok(
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE tx_ref = $1")
            .bind(tx_ref)
            .fetch_optional(&state.db)
            .await?,
    )
}

pub async fn verify(state: &AppState, ctx: &AuthContext, tx_ref: &str) -> ApiResult<PaymentDetail> {
    let payment = fetch_by_tx_ref(state, tx_ref)
        .await?
        .ok_or_else(|| ApiError::not_found("payment"))?;
    let order = fetch_order(state, payment.order_id).await?;
    authorize_payment_actor(ctx, &order)?;

    // Already settled: verifying again is a read.
    if matches!(
        payment.status,
        PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Refunded | PaymentStatus::Cancelled
    ) {
        return detail(state, payment.id).await;
    }

    let verification = state.gateway.verify(tx_ref).await?;
    let target = match verification.outcome {
        VerifyOutcome::Success => Some(PaymentStatus::Completed),
        VerifyOutcome::Failed => Some(PaymentStatus::Failed),
        VerifyOutcome::Pending => None,
    };
    if let Some(target) = target {
        if let Some((from, to)) =
            apply_transition(state, payment.id, target, Some(verification.raw.clone()), None)
                .await?
        {
            activity::record(
                state,
                Some(ctx),
                &DomainEvent::PaymentStatusChanged {
                    payment_id: payment.id,
                    from,
                    to,
                },
            )
            .await;
        }
    } else {
        // Keep the gateway reply even when nothing moved.
        sqlx::query("UPDATE payments SET verification_data = $2, updated_at = NOW() WHERE id = $1")
            .bind(payment.id)
            .bind(&verification.raw)
            .execute(&state.db)
            .await?;
    }
    detail(state, payment.id).await
}

/// Webhook ingestion. Unauthenticated transport; the payload signature
/// is the credential. Every outcome is acknowledged with 200 so the
/// gateway never enters a retry storm.
pub async fn ingest_webhook(
    state: &AppState,
    raw_body: &[u8],
    signatures: &[&str],
) -> WebhookAck {
    if state.config.signature_enforcement
        && !crate::gateway::verify_webhook_signature(
            &state.config.webhook_secret,
            raw_body,
            signatures,
        )
    {
        tracing::warn!("webhook rejected: signature mismatch");
        return WebhookAck::Error {
            message: "invalid signature".into(),
        };
    }

    let payload: Value = match serde_json::from_slice(raw_body) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(%err, "webhook rejected: unparseable body");
            return WebhookAck::Error {
                message: "invalid payload".into(),
            };
        }
    };
    let tx_ref = payload
        .get("tx_ref")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match process_webhook(state, &payload, &tx_ref, &event, &status).await {
        Ok(ack) => ack,
        Err(err) => {
            // Internal failures are swallowed into a 200 ack.
            tracing::error!(%err, tx_ref, "webhook processing failed");
            WebhookAck::Error {
                message: "processing failed".into(),
            }
        }
    }
}

async fn process_webhook(
    state: &AppState,
    payload: &Value,
    tx_ref: &str,
    event: &str,
    status: &str,
) -> ApiResult<WebhookAck> {
    let Some(payment) = fetch_by_tx_ref(state, tx_ref).await? else {
        tracing::warn!(tx_ref, "webhook for unknown tx_ref acknowledged");
        return Ok(WebhookAck::Error {
            message: "unknown tx_ref".into(),
        });
    };

    let Some(target) = webhook_target_status(event, status) else {
        tracing::info!(tx_ref, event, "webhook event ignored");
        activity::record(
            state,
            None,
            &DomainEvent::WebhookIgnored {
                tx_ref: tx_ref.to_string(),
                event: event.to_string(),
            },
        )
        .await;
        return Ok(WebhookAck::Success {
            message: "event ignored".into(),
        });
    };

    match apply_transition(state, payment.id, target, None, Some(payload.clone())).await? {
        Some((from, to)) => {
            activity::record(
                state,
                None,
                &DomainEvent::PaymentStatusChanged {
                    payment_id: payment.id,
                    from,
                    to,
                },
            )
            .await;
            Ok(WebhookAck::Success {
                message: format!("payment {}", to.as_str()),
            })
        }
        None => Ok(WebhookAck::Success {
            message: "already processed".into(),
        }),
    }
}

/// Tenant staff marks a cash-on-delivery payment as collected.
pub async fn confirm_cod(
    state: &AppState,
    ctx: &AuthContext,
    payment_id: Uuid,
) -> ApiResult<PaymentDetail> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(payment_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("payment"))?;
    let order = fetch_order(state, payment.order_id).await?;
    ctx.require_staff_of(order.tenant_id)?;

    if payment.method != PaymentMethod::Cod {
        return Err(ApiError::Validation(
            "only cash-on-delivery payments can be confirmed manually".into(),
        ));
    }
    if !matches!(
        payment.status,
        PaymentStatus::Pending | PaymentStatus::Processing
    ) {
        return Err(ApiError::Conflict(format!(
            "payment is {} and cannot be confirmed",
            payment.status.as_str()
        )));
    }

    if let Some((from, to)) =
        apply_transition(state, payment.id, PaymentStatus::Completed, None, None).await?
    {
        activity::record(
            state,
            Some(ctx),
            &DomainEvent::PaymentStatusChanged {
                payment_id: payment.id,
                from,
                to,
            },
        )
        .await;
    }
    detail(state, payment.id).await
}

async fn detail(state: &AppState, payment_id: Uuid) -> ApiResult<PaymentDetail> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(payment_id)
        .fetch_one(&state.db)
        .await?;
    let history = sqlx::query_as::<_, PaymentHistory>(
        "SELECT * FROM payment_history WHERE payment_id = $1 ORDER BY created_at ASC",
    )
    .bind(payment_id)
    .fetch_all(&state.db)
    .await?;
    Ok(PaymentDetail { payment, history })
}

pub async fn get_payment(
    state: &AppState,
    ctx: &AuthContext,
    payment_id: Uuid,
) -> ApiResult<PaymentDetail> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(payment_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("payment"))?;
    let order = fetch_order(state, payment.order_id).await?;
    authorize_payment_actor(ctx, &order)?;
    detail(state, payment.id).await
}

/// Payments for orders the acting tenant sells; admins see everything.
pub async fn list_payments(
    state: &AppState,
    ctx: &AuthContext,
    tenant_id: Option<Uuid>,
    page: Page,
) -> ApiResult<Paginated<Payment>> {
    if ctx.is_admin() && tenant_id.is_none() {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(&state.db)
            .await?;
        let results = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&state.db)
        .await?;
        return Ok(Paginated::new(count, page, results));
    }

    let tenant_id = ctx.acting_tenant(tenant_id)?;
    ctx.require_staff_of(tenant_id)?;
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments p JOIN orders o ON o.id = p.order_id \
         WHERE o.tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_one(&state.db)
    .await?;
    let results = sqlx::query_as::<_, Payment>(
        "SELECT p.* FROM payments p JOIN orders o ON o.id = p.order_id \
         WHERE o.tenant_id = $1 ORDER BY p.created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(tenant_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Paginated::new(count, page, results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_handles_shapes() {
        assert_eq!(split_name("Abebe Bikila"), ("Abebe".into(), "Bikila".into()));
        assert_eq!(split_name("Cher"), ("Cher".into(), "-".into()));
        assert_eq!(
            split_name("Ana Maria de Souza"),
            ("Ana".into(), "Maria de Souza".into())
        );
        assert_eq!(split_name(""), ("Customer".into(), "-".into()));
    }
}
