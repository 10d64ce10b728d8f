//! Order lifecycle: creation with per-day numbering, guarded status
//! transitions, line-item replacement, and the tenant-scoped query
//! surface.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::events::DomainEvent;
use crate::domain::order::{compute_total, order_number, Order, OrderHistory, OrderItem, OrderStatus};
use crate::domain::payment::PaymentStatus;
use crate::domain::product::Product;
use crate::error::{ApiError, ApiResult};
use crate::services::{activity, Page, Paginated};
use crate::state::AppState;

/// Advisory-lock class for the per-day order sequence.
const ORDER_SEQ_LOCK_CLASS: i32 = 0x4f52;

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price snapshot; defaults to the product's current selling price.
    pub price: Option<Decimal>,
    pub custom_profit_percentage: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Selling tenant; defaults to the caller's tenant.
    pub tenant_id: Option<Uuid>,
    pub items: Vec<NewOrderItem>,
    pub taxes: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub shipping_address: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOrder {
    pub taxes: Option<Decimal>,
    pub shipping: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub notes: Option<String>,
    pub shipping_address: Option<Value>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderHistory>,
}

/// Which slice of the order table a listing looks at.
#[derive(Debug, Clone, Copy)]
pub enum OrderScope {
    /// Every order; admin only.
    All,
    /// Orders the user placed.
    Buyer(Uuid),
    /// Orders the tenant sells.
    SellingTenant(Uuid),
    /// Orders containing a line item owned by the tenant.
    ProductOwner(Uuid),
    /// A tenant's view of one customer, on either side of the basket.
    Customer { tenant_id: Uuid, customer_id: Uuid },
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

struct ResolvedItem {
    product_id: Uuid,
    owner_tenant_id: Uuid,
    quantity: i32,
    price: Decimal,
    custom_profit_percentage: Option<Decimal>,
    custom_selling_price: Option<Decimal>,
}

/// Fetch each product, check the selling tenant may sell it, snapshot
/// prices and the owner tenant. Returns the items plus the subtotal.
async fn resolve_items(
    conn: &mut PgConnection,
    selling_tenant: Uuid,
    items: &[NewOrderItem],
) -> ApiResult<(Vec<ResolvedItem>, Decimal)> {
    if items.is_empty() {
        return Err(ApiError::Validation(
            "order requires at least one line item".into(),
        ));
    }
    let mut resolved = Vec::with_capacity(items.len());
    let mut subtotal = Decimal::ZERO;
    for item in items {
        if item.quantity < 1 {
            return Err(ApiError::Validation("quantity must be at least 1".into()));
        }
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(item.product_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::not_found("product"))?;

        if product.tenant_id != selling_tenant {
            let listed: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM product_listings WHERE product_id = $1 AND tenant_id = $2)",
            )
            .bind(product.id)
            .bind(selling_tenant)
            .fetch_one(&mut *conn)
            .await?;
            if !product.is_public || !listed {
                return Err(ApiError::Validation(format!(
                    "product {} is not sellable by this tenant",
                    product.id
                )));
            }
        }

        let price = item.price.unwrap_or_else(|| product.selling_price());
        if price < Decimal::ZERO {
            return Err(ApiError::Validation("item price cannot be negative".into()));
        }
        let custom_selling_price = item.custom_profit_percentage.map(|pct| {
            (price * (Decimal::ONE + pct / Decimal::ONE_HUNDRED)).round_dp(2)
        });
        let effective = custom_selling_price.unwrap_or(price);
        subtotal += effective * Decimal::from(item.quantity);

        resolved.push(ResolvedItem {
            product_id: product.id,
            owner_tenant_id: product.tenant_id,
            quantity: item.quantity,
            price,
            custom_profit_percentage: item.custom_profit_percentage,
            custom_selling_price,
        });
    }
    Ok((resolved, subtotal))
}

async fn insert_items(
    conn: &mut PgConnection,
    order_id: Uuid,
    resolved: &[ResolvedItem],
) -> ApiResult<Vec<OrderItem>> {
    let mut rows = Vec::with_capacity(resolved.len());
    for item in resolved {
        let row = sqlx::query_as::<_, OrderItem>(
            "INSERT INTO order_items \
             (id, order_id, product_id, product_owner_tenant_id, quantity, price, \
              custom_profit_percentage, custom_selling_price) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.owner_tenant_id)
        .bind(item.quantity)
        .bind(item.price)
        .bind(item.custom_profit_percentage)
        .bind(item.custom_selling_price)
        .fetch_one(&mut *conn)
        .await?;
        rows.push(row);
    }
    Ok(rows)
}

async fn append_history(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
    description: &str,
    user_id: Option<Uuid>,
) -> ApiResult<OrderHistory> {
    let row = sqlx::query_as::<_, OrderHistory>(
        "INSERT INTO order_history (id, order_id, status, description, user_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(status)
    .bind(description)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn create_order(
    state: &AppState,
    ctx: &AuthContext,
    input: NewOrder,
) -> ApiResult<OrderDetail> {
    let selling_tenant = match input.tenant_id {
        Some(tenant_id) => tenant_id,
        None => ctx.tenant_id.ok_or_else(|| {
            ApiError::Validation("selling tenant is required for this caller".into())
        })?,
    };

    let mut tx = state.db.begin().await?;
    let (resolved, subtotal) = resolve_items(&mut tx, selling_tenant, &input.items).await?;
    let total = compute_total(subtotal, input.taxes, input.shipping, input.discount)?;

    // Per-day sequence: the advisory lock serializes concurrent
    // creators so count+1 cannot collide.
    let now = Utc::now();
    let day = now.date_naive();
    let day_start = day.and_time(NaiveTime::MIN).and_utc();
    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(ORDER_SEQ_LOCK_CLASS)
        .bind(day.num_days_from_ce())
        .execute(&mut *tx)
        .await?;
    let today_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE created_at >= $1")
        .bind(day_start)
        .fetch_one(&mut *tx)
        .await?;
    let number = order_number(day, today_count + 1);

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders \
         (id, order_number, tenant_id, user_id, status, subtotal, taxes, shipping, discount, \
          total_amount, shipping_address, notes) \
         VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $9, $10, $11) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&number)
    .bind(selling_tenant)
    .bind(ctx.user_id())
    .bind(subtotal)
    .bind(input.taxes)
    .bind(input.shipping)
    .bind(input.discount)
    .bind(total)
    .bind(&input.shipping_address)
    .bind(&input.notes)
    .fetch_one(&mut *tx)
    .await?;

    let items = insert_items(&mut tx, order.id, &resolved).await?;
    let history = append_history(
        &mut tx,
        order.id,
        OrderStatus::Pending,
        "Order created",
        ctx.user_id(),
    )
    .await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::OrderCreated {
            order_id: order.id,
            order_number: order.order_number.clone(),
            total_amount: order.total_amount,
        },
    )
    .await;

    Ok(OrderDetail {
        order,
        items,
        history: vec![history],
    })
}

async fn load_detail(state: &AppState, order: Order) -> ApiResult<OrderDetail> {
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order.id)
        .fetch_all(&state.db)
        .await?;
    let history = sqlx::query_as::<_, OrderHistory>(
        "SELECT * FROM order_history WHERE order_id = $1 ORDER BY created_at ASC",
    )
    .bind(order.id)
    .fetch_all(&state.db)
    .await?;
    Ok(OrderDetail {
        order,
        items,
        history,
    })
}

async fn fetch_order(state: &AppState, id: Uuid) -> ApiResult<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("order"))
}

/// Buyer, selling-tenant staff, staff of any item's owner tenant, or
/// admin may read an order.
async fn authorize_read(state: &AppState, ctx: &AuthContext, order: &Order) -> ApiResult<()> {
    if ctx.is_admin()
        || ctx.user_id().is_some() && ctx.user_id() == order.user_id
        || ctx.is_staff_of(order.tenant_id)
    {
        return Ok(());
    }
    if let Some(tenant_id) = ctx.tenant_id {
        let owns_item: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM order_items \
             WHERE order_id = $1 AND product_owner_tenant_id = $2)",
        )
        .bind(order.id)
        .bind(tenant_id)
        .fetch_one(&state.db)
        .await?;
        if owns_item && ctx.is_staff_of(tenant_id) {
            return Ok(());
        }
    }
    Err(ApiError::not_found("order"))
}

pub async fn get_order(state: &AppState, ctx: &AuthContext, id: Uuid) -> ApiResult<OrderDetail> {
    let order = fetch_order(state, id).await?;
    authorize_read(state, ctx, &order).await?;
    load_detail(state, order).await
}

pub async fn update_order(
    state: &AppState,
    ctx: &AuthContext,
    id: Uuid,
    input: UpdateOrder,
) -> ApiResult<OrderDetail> {
    let order = fetch_order(state, id).await?;
    ctx.require_staff_of(order.tenant_id)?;

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    let taxes = input.taxes.unwrap_or(current.taxes);
    let shipping = input.shipping.unwrap_or(current.shipping);
    let discount = input.discount.unwrap_or(current.discount);
    let total = compute_total(current.subtotal, taxes, shipping, discount)?;

    let status_change = match input.status {
        Some(target) if target != current.status => {
            if !current.status.can_transition(target) {
                return Err(ApiError::Conflict(format!(
                    "invalid status transition {} -> {}",
                    current.status.as_str(),
                    target.as_str()
                )));
            }
            Some(target)
        }
        _ => None,
    };
    let status = status_change.unwrap_or(current.status);

    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET taxes = $2, shipping = $3, discount = $4, total_amount = $5, \
         notes = COALESCE($6, notes), shipping_address = COALESCE($7, shipping_address), \
         status = $8, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(taxes)
    .bind(shipping)
    .bind(discount)
    .bind(total)
    .bind(&input.notes)
    .bind(&input.shipping_address)
    .bind(status)
    .fetch_one(&mut *tx)
    .await?;
    if let Some(target) = status_change {
        let note = format!(
            "Status changed from {} to {}",
            current.status.as_str(),
            target.as_str()
        );
        append_history(&mut tx, id, target, &note, ctx.user_id()).await?;
    }
    tx.commit().await?;

    if let Some(target) = status_change {
        activity::record(
            state,
            Some(ctx),
            &DomainEvent::OrderStatusChanged {
                order_id: id,
                from: current.status,
                to: target,
            },
        )
        .await;
    }

    load_detail(state, updated).await
}

pub async fn replace_items(
    state: &AppState,
    ctx: &AuthContext,
    id: Uuid,
    items: Vec<NewOrderItem>,
) -> ApiResult<OrderDetail> {
    let order = fetch_order(state, id).await?;
    ctx.require_staff_of(order.tenant_id)?;

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if current.status != OrderStatus::Pending {
        return Err(ApiError::Conflict(
            "line items can only be replaced while the order is pending".into(),
        ));
    }
    let has_completed_payment: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM payments WHERE order_id = $1 AND status = $2)",
    )
    .bind(id)
    .bind(PaymentStatus::Completed)
    .fetch_one(&mut *tx)
    .await?;
    if has_completed_payment {
        return Err(ApiError::Conflict(
            "line items cannot change after a completed payment".into(),
        ));
    }

    let (resolved, subtotal) = resolve_items(&mut tx, current.tenant_id, &items).await?;
    let total = compute_total(subtotal, current.taxes, current.shipping, current.discount)?;

    sqlx::query("DELETE FROM order_items WHERE order_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let rows = insert_items(&mut tx, id, &resolved).await?;
    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET subtotal = $2, total_amount = $3, updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(subtotal)
    .bind(total)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::OrderItemsReplaced {
            order_id: id,
            item_count: rows.len(),
        },
    )
    .await;

    load_detail(state, updated).await
}

pub async fn update_status(
    state: &AppState,
    ctx: &AuthContext,
    id: Uuid,
    target: OrderStatus,
    description: Option<String>,
) -> ApiResult<OrderDetail> {
    let order = fetch_order(state, id).await?;
    ctx.require_staff_of(order.tenant_id)?;

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if !current.status.can_transition(target) {
        return Err(ApiError::Conflict(format!(
            "invalid status transition {} -> {}",
            current.status.as_str(),
            target.as_str()
        )));
    }
    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(target)
    .fetch_one(&mut *tx)
    .await?;
    let note = description.unwrap_or_else(|| {
        format!(
            "Status changed from {} to {}",
            current.status.as_str(),
            target.as_str()
        )
    });
    append_history(&mut tx, id, target, &note, ctx.user_id()).await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::OrderStatusChanged {
            order_id: id,
            from: current.status,
            to: target,
        },
    )
    .await;

    load_detail(state, updated).await
}

pub async fn confirm_delivery(
    state: &AppState,
    ctx: &AuthContext,
    id: Uuid,
    feedback: Option<String>,
) -> ApiResult<OrderDetail> {
    let order = fetch_order(state, id).await?;
    if ctx.user_id().is_none() || ctx.user_id() != order.user_id {
        return Err(ApiError::Forbidden(
            "only the buyer can confirm delivery".into(),
        ));
    }

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if !matches!(current.status, OrderStatus::Shipped | OrderStatus::Processing) {
        return Err(ApiError::Conflict(format!(
            "cannot confirm delivery from status {}",
            current.status.as_str()
        )));
    }
    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = 'delivered', updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    let note = match feedback {
        Some(f) if !f.trim().is_empty() => format!("Delivery confirmed by buyer: {f}"),
        _ => "Delivery confirmed by buyer".to_string(),
    };
    append_history(&mut tx, id, OrderStatus::Delivered, &note, ctx.user_id()).await?;
    tx.commit().await?;

    activity::record(state, Some(ctx), &DomainEvent::DeliveryConfirmed { order_id: id }).await;

    load_detail(state, updated).await
}

fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: OrderScope) {
    match scope {
        OrderScope::All => {
            qb.push("TRUE");
        }
        OrderScope::Buyer(user_id) => {
            qb.push("o.user_id = ").push_bind(user_id);
        }
        OrderScope::SellingTenant(tenant_id) => {
            qb.push("o.tenant_id = ").push_bind(tenant_id);
        }
        OrderScope::ProductOwner(tenant_id) => {
            qb.push(
                "EXISTS (SELECT 1 FROM order_items oi \
                 WHERE oi.order_id = o.id AND oi.product_owner_tenant_id = ",
            )
            .push_bind(tenant_id)
            .push(")");
        }
        OrderScope::Customer {
            tenant_id,
            customer_id,
        } => {
            qb.push("(o.tenant_id = ")
                .push_bind(tenant_id)
                .push(
                    " OR EXISTS (SELECT 1 FROM order_items oi \
                     WHERE oi.order_id = o.id AND oi.product_owner_tenant_id = ",
                )
                .push_bind(tenant_id)
                .push(")) AND o.user_id = ")
                .push_bind(customer_id);
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND o.status = ").push_bind(status);
    }
    if let Some(start) = filter.start {
        qb.push(" AND o.created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND o.created_at <= ").push_bind(end);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search.trim());
        qb.push(" AND (o.order_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(email) = &filter.user_email {
        qb.push(" AND u.email ILIKE ").push_bind(format!("%{}%", email.trim()));
    }
    if let Some(name) = &filter.user_name {
        qb.push(" AND u.full_name ILIKE ").push_bind(format!("%{}%", name.trim()));
    }
}

pub async fn list_orders(
    state: &AppState,
    scope: OrderScope,
    filter: &OrderFilter,
    page: Page,
) -> ApiResult<Paginated<Order>> {
    let mut count_qb = QueryBuilder::new(
        "SELECT COUNT(*) FROM orders o LEFT JOIN users u ON u.id = o.user_id WHERE ",
    );
    push_scope(&mut count_qb, scope);
    push_filter(&mut count_qb, filter);
    let count: i64 = count_qb.build_query_scalar().fetch_one(&state.db).await?;

    let mut rows_qb = QueryBuilder::new(
        "SELECT o.* FROM orders o LEFT JOIN users u ON u.id = o.user_id WHERE ",
    );
    push_scope(&mut rows_qb, scope);
    push_filter(&mut rows_qb, filter);
    rows_qb
        .push(" ORDER BY o.created_at DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let results = rows_qb
        .build_query_as::<Order>()
        .fetch_all(&state.db)
        .await?;

    Ok(Paginated::new(count, page, results))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBreakdown {
    pub pending: i64,
    pub processing: i64,
    pub shipped: i64,
    pub delivered: i64,
    pub refunded: i64,
}

impl StatusBreakdown {
    fn set(&mut self, status: OrderStatus, count: i64) {
        match status {
            OrderStatus::Pending => self.pending = count,
            OrderStatus::Processing => self.processing = count,
            OrderStatus::Shipped => self.shipped = count,
            OrderStatus::Delivered => self.delivered = count,
            OrderStatus::Refunded => self.refunded = count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueBuckets {
    #[serde(with = "crate::domain::decimal_string")]
    pub from_owned_products: Decimal,
    #[serde(with = "crate::domain::decimal_string")]
    pub from_resold_products: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantStatistics {
    pub total_selling_orders: i64,
    pub status_breakdown: StatusBreakdown,
    pub total_product_orders: i64,
    pub owned_and_sold: i64,
    pub owned_but_sold_by_others: i64,
    pub sold_but_owned_by_others: i64,
    pub revenue: RevenueBuckets,
}

const RANGE_GUARD: &str =
    " AND ($2::timestamptz IS NULL OR o.created_at >= $2) \
      AND ($3::timestamptz IS NULL OR o.created_at <= $3)";

pub async fn tenant_statistics(
    state: &AppState,
    ctx: &AuthContext,
    tenant_id: Uuid,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> ApiResult<TenantStatistics> {
    ctx.require_staff_of(tenant_id)?;

    let breakdown_rows: Vec<(OrderStatus, i64)> = sqlx::query_as(&format!(
        "SELECT o.status, COUNT(*) FROM orders o WHERE o.tenant_id = $1{RANGE_GUARD} \
         GROUP BY o.status"
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;
    let mut status_breakdown = StatusBreakdown::default();
    let mut total_selling_orders = 0;
    for (status, count) in breakdown_rows {
        total_selling_orders += count;
        status_breakdown.set(status, count);
    }

    let total_product_orders: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(DISTINCT o.id) FROM orders o \
         JOIN order_items oi ON oi.order_id = o.id \
         WHERE oi.product_owner_tenant_id = $1{RANGE_GUARD}"
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await?;

    let owned_and_sold: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM orders o WHERE o.tenant_id = $1{RANGE_GUARD} \
         AND EXISTS (SELECT 1 FROM order_items oi \
                     WHERE oi.order_id = o.id AND oi.product_owner_tenant_id = $1)"
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await?;

    let owned_but_sold_by_others: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(DISTINCT o.id) FROM orders o \
         JOIN order_items oi ON oi.order_id = o.id \
         WHERE o.tenant_id <> $1 AND oi.product_owner_tenant_id = $1{RANGE_GUARD}"
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await?;

    let sold_but_owned_by_others: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM orders o WHERE o.tenant_id = $1{RANGE_GUARD} \
         AND EXISTS (SELECT 1 FROM order_items oi \
                     WHERE oi.order_id = o.id AND oi.product_owner_tenant_id <> $1)"
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await?;

    // Order-level sums: a mixed basket lands in both buckets. Kept for
    // behavioral parity with the historical reports.
    let from_owned_products: Decimal = sqlx::query_scalar(&format!(
        "SELECT COALESCE(SUM(o.total_amount), 0) FROM orders o \
         WHERE o.tenant_id = $1{RANGE_GUARD} \
         AND EXISTS (SELECT 1 FROM order_items oi \
                     WHERE oi.order_id = o.id AND oi.product_owner_tenant_id = $1)"
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await?;

    let from_resold_products: Decimal = sqlx::query_scalar(&format!(
        "SELECT COALESCE(SUM(o.total_amount), 0) FROM orders o \
         WHERE o.tenant_id = $1{RANGE_GUARD} \
         AND EXISTS (SELECT 1 FROM order_items oi \
                     WHERE oi.order_id = o.id AND oi.product_owner_tenant_id <> $1)"
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await?;

    Ok(TenantStatistics {
        total_selling_orders,
        status_breakdown,
        total_product_orders,
        owned_and_sold,
        owned_but_sold_by_others,
        sold_but_owned_by_others,
        revenue: RevenueBuckets {
            from_owned_products,
            from_resold_products,
        },
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SellerBreakdown {
    pub tenant_id: Uuid,
    pub orders: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductStatistics {
    pub product_id: Uuid,
    pub quantity_sold: i64,
    pub order_count: i64,
    pub by_seller: Vec<SellerBreakdown>,
    pub by_status: StatusBreakdown,
}

pub async fn product_statistics(
    state: &AppState,
    ctx: &AuthContext,
    product_id: Uuid,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> ApiResult<ProductStatistics> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("product"))?;

    // Visible to the owner, any tenant that listed or sold it, and
    // admins.
    if !ctx.is_admin() {
        let tenant_id = ctx
            .tenant_id
            .ok_or_else(|| ApiError::Forbidden("no tenant scope on this principal".into()))?;
        ctx.require_staff_of(tenant_id)?;
        if tenant_id != product.tenant_id {
            let related: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM product_listings \
                              WHERE product_id = $1 AND tenant_id = $2) \
                 OR EXISTS(SELECT 1 FROM order_items oi \
                           JOIN orders o ON o.id = oi.order_id \
                           WHERE oi.product_id = $1 AND o.tenant_id = $2)",
            )
            .bind(product_id)
            .bind(tenant_id)
            .fetch_one(&state.db)
            .await?;
            if !related {
                return Err(ApiError::Forbidden(
                    "product statistics are limited to related tenants".into(),
                ));
            }
        }
    }

    let totals: (Option<i64>, i64) = sqlx::query_as(&format!(
        "SELECT SUM(oi.quantity)::bigint, COUNT(DISTINCT o.id) \
         FROM order_items oi JOIN orders o ON o.id = oi.order_id \
         WHERE oi.product_id = $1{RANGE_GUARD}"
    ))
    .bind(product_id)
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await?;

    let seller_rows: Vec<(Uuid, i64, Option<i64>)> = sqlx::query_as(&format!(
        "SELECT o.tenant_id, COUNT(DISTINCT o.id), SUM(oi.quantity)::bigint \
         FROM order_items oi JOIN orders o ON o.id = oi.order_id \
         WHERE oi.product_id = $1{RANGE_GUARD} GROUP BY o.tenant_id"
    ))
    .bind(product_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    let status_rows: Vec<(OrderStatus, i64)> = sqlx::query_as(&format!(
        "SELECT o.status, COUNT(DISTINCT o.id) \
         FROM order_items oi JOIN orders o ON o.id = oi.order_id \
         WHERE oi.product_id = $1{RANGE_GUARD} GROUP BY o.status"
    ))
    .bind(product_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;
    let mut by_status = StatusBreakdown::default();
    for (status, count) in status_rows {
        by_status.set(status, count);
    }

    Ok(ProductStatistics {
        product_id,
        quantity_sold: totals.0.unwrap_or(0),
        order_count: totals.1,
        by_seller: seller_rows
            .into_iter()
            .map(|(tenant_id, orders, quantity)| SellerBreakdown {
                tenant_id,
                orders,
                quantity: quantity.unwrap_or(0),
            })
            .collect(),
        by_status,
    })
}
