//! Refund workflow: request → approve/reject → execute.

use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::events::DomainEvent;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::domain::refund::{new_refund_ref, Refund, RefundRequest, RefundRequestStatus};
use crate::error::{ApiError, ApiResult};
use crate::services::{activity, Page, Paginated};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequestDetail {
    #[serde(flatten)]
    pub request: RefundRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund: Option<Refund>,
}

async fn fetch_order(state: &AppState, id: Uuid) -> ApiResult<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("order"))
}

async fn fetch_request(state: &AppState, id: Uuid) -> ApiResult<RefundRequest> {
    sqlx::query_as::<_, RefundRequest>("SELECT * FROM refund_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("refund request"))
}

/// Buyer opens a refund request against a delivered, paid order.
pub async fn create_request(
    state: &AppState,
    ctx: &AuthContext,
    order_id: Uuid,
    reason: String,
) -> ApiResult<RefundRequest> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Forbidden("refund requests require a user account".into()))?;
    let order = fetch_order(state, order_id).await?;
    if order.user_id != Some(user_id) {
        return Err(ApiError::Forbidden(
            "only the buyer can request a refund".into(),
        ));
    }
    if order.status != OrderStatus::Delivered {
        return Err(ApiError::Conflict(
            "refunds are only available for delivered orders".into(),
        ));
    }
    if reason.trim().is_empty() {
        return Err(ApiError::Validation("a reason is required".into()));
    }

    let mut tx = state.db.begin().await?;
    let paid: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM payments WHERE order_id = $1 AND status = 'completed')",
    )
    .bind(order_id)
    .fetch_one(&mut *tx)
    .await?;
    if !paid {
        return Err(ApiError::Conflict(
            "order has no completed payment to refund".into(),
        ));
    }
    let open_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM refund_requests WHERE order_id = $1 \
         AND status IN ('pending', 'approved'))",
    )
    .bind(order_id)
    .fetch_one(&mut *tx)
    .await?;
    if open_exists {
        return Err(ApiError::Conflict(
            "a refund request is already open for this order".into(),
        ));
    }

    let request = sqlx::query_as::<_, RefundRequest>(
        "INSERT INTO refund_requests (id, order_id, user_id, reason, status) \
         VALUES ($1, $2, $3, $4, 'pending') RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(user_id)
    .bind(reason.trim())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::RefundRequested {
            refund_request_id: request.id,
            order_id,
        },
    )
    .await;

    Ok(request)
}

/// Approval cascades: request → approved, payment → refunded,
/// order → refunded, all in one transaction.
pub async fn approve(
    state: &AppState,
    ctx: &AuthContext,
    request_id: Uuid,
    admin_notes: Option<String>,
) -> ApiResult<RefundRequest> {
    let request = fetch_request(state, request_id).await?;
    let order = fetch_order(state, request.order_id).await?;
    ctx.require_staff_of(order.tenant_id)?;

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, RefundRequest>(
        "SELECT * FROM refund_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_one(&mut *tx)
    .await?;
    if !current.status.can_transition(RefundRequestStatus::Approved) {
        return Err(ApiError::Conflict(format!(
            "refund request is already {:?}",
            current.status
        )));
    }

    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE order_id = $1 AND status = 'completed' \
         ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
    )
    .bind(request.order_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        ApiError::Conflict("order no longer has a completed payment".into())
    })?;

    let updated = sqlx::query_as::<_, RefundRequest>(
        "UPDATE refund_requests SET status = 'approved', admin_notes = $2, updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(request_id)
    .bind(&admin_notes)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE payments SET status = 'refunded', updated_at = NOW() WHERE id = $1")
        .bind(payment.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO payment_history (id, payment_id, old_status, new_status) \
         VALUES ($1, $2, $3, 'refunded')",
    )
    .bind(Uuid::new_v4())
    .bind(payment.id)
    .bind(PaymentStatus::Completed)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE orders SET status = 'refunded', updated_at = NOW() WHERE id = $1")
        .bind(order.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO order_history (id, order_id, status, description, user_id) \
         VALUES ($1, $2, 'refunded', 'Refund request approved', $3)",
    )
    .bind(Uuid::new_v4())
    .bind(order.id)
    .bind(ctx.user_id())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::RefundDecided {
            refund_request_id: request_id,
            status: RefundRequestStatus::Approved,
        },
    )
    .await;

    Ok(updated)
}

pub async fn reject(
    state: &AppState,
    ctx: &AuthContext,
    request_id: Uuid,
    admin_notes: Option<String>,
) -> ApiResult<RefundRequest> {
    let request = fetch_request(state, request_id).await?;
    let order = fetch_order(state, request.order_id).await?;
    ctx.require_staff_of(order.tenant_id)?;

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, RefundRequest>(
        "SELECT * FROM refund_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_one(&mut *tx)
    .await?;
    if !current.status.can_transition(RefundRequestStatus::Rejected) {
        return Err(ApiError::Conflict(format!(
            "refund request is already {:?}",
            current.status
        )));
    }
    let updated = sqlx::query_as::<_, RefundRequest>(
        "UPDATE refund_requests SET status = 'rejected', admin_notes = $2, updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(request_id)
    .bind(&admin_notes)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::RefundDecided {
            refund_request_id: request_id,
            status: RefundRequestStatus::Rejected,
        },
    )
    .await;

    Ok(updated)
}

/// Process an approved request into an executed refund. The gateway
/// call runs first; if it fails the request stays `approved` and can be
/// retried.
pub async fn execute(
    state: &AppState,
    ctx: &AuthContext,
    request_id: Uuid,
) -> ApiResult<Refund> {
    let request = fetch_request(state, request_id).await?;
    let order = fetch_order(state, request.order_id).await?;
    ctx.require_staff_of(order.tenant_id)?;

    if request.status != RefundRequestStatus::Approved {
        return Err(ApiError::Conflict(format!(
            "refund request must be approved, is {:?}",
            request.status
        )));
    }

    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE order_id = $1 AND status = 'refunded' \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(request.order_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::Conflict("no refunded payment found for this order".into()))?;

    if payment.method == PaymentMethod::Chapa {
        state
            .gateway
            .refund(&payment.tx_ref, payment.amount, &request.reason)
            .await?;
    }

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, RefundRequest>(
        "SELECT * FROM refund_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_one(&mut *tx)
    .await?;
    if !current.status.can_transition(RefundRequestStatus::Completed) {
        return Err(ApiError::Conflict(
            "refund request was already processed".into(),
        ));
    }
    let refund = sqlx::query_as::<_, Refund>(
        "INSERT INTO refunds (id, refund_request_id, amount, method, transaction_ref, status) \
         VALUES ($1, $2, $3, $4, $5, 'completed') RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(request_id)
    .bind(payment.amount)
    .bind(payment.method)
    .bind(new_refund_ref())
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE refund_requests SET status = 'completed', updated_at = NOW() WHERE id = $1",
    )
    .bind(request_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::RefundExecuted {
            refund_id: refund.id,
            refund_request_id: request_id,
            transaction_ref: refund.transaction_ref.clone(),
        },
    )
    .await;

    Ok(refund)
}

pub async fn get_request(
    state: &AppState,
    ctx: &AuthContext,
    request_id: Uuid,
) -> ApiResult<RefundRequestDetail> {
    let request = fetch_request(state, request_id).await?;
    let order = fetch_order(state, request.order_id).await?;
    let is_requester = ctx.user_id() == Some(request.user_id);
    if !is_requester && !ctx.is_staff_of(order.tenant_id) {
        return Err(ApiError::not_found("refund request"));
    }
    let refund = sqlx::query_as::<_, Refund>(
        "SELECT * FROM refunds WHERE refund_request_id = $1",
    )
    .bind(request_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(RefundRequestDetail { request, refund })
}

/// Staff see requests against their tenant's orders; customers see
/// their own.
pub async fn list_requests(
    state: &AppState,
    ctx: &AuthContext,
    page: Page,
) -> ApiResult<Paginated<RefundRequest>> {
    if ctx.is_admin() {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refund_requests")
            .fetch_one(&state.db)
            .await?;
        let results = sqlx::query_as::<_, RefundRequest>(
            "SELECT * FROM refund_requests ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&state.db)
        .await?;
        return Ok(Paginated::new(count, page, results));
    }

    if let (Some(tenant_id), true) = (ctx.tenant_id, ctx.role == crate::domain::tenant::Role::Owner)
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refund_requests r JOIN orders o ON o.id = r.order_id \
             WHERE o.tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&state.db)
        .await?;
        let results = sqlx::query_as::<_, RefundRequest>(
            "SELECT r.* FROM refund_requests r JOIN orders o ON o.id = r.order_id \
             WHERE o.tenant_id = $1 ORDER BY r.created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&state.db)
        .await?;
        return Ok(Paginated::new(count, page, results));
    }

    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Forbidden("no refund scope on this principal".into()))?;
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM refund_requests WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&state.db)
            .await?;
    let results = sqlx::query_as::<_, RefundRequest>(
        "SELECT * FROM refund_requests WHERE user_id = $1 \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Paginated::new(count, page, results))
}
