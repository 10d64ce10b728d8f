//! Order endpoints: thin adapters over [`crate::services::orders`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::decimal_string;
use crate::domain::order::Order;
use crate::error::{ApiError, ApiResult};
use crate::http::params::{parse_date_range, parse_order_status, ListQuery};
use crate::services::orders::{
    self, NewOrder, NewOrderItem, OrderDetail, OrderScope, ProductStatistics, TenantStatistics,
    UpdateOrder,
};
use crate::services::Paginated;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(default, with = "decimal_string::option")]
    pub price: Option<Decimal>,
    #[serde(default, with = "decimal_string::option")]
    pub custom_profit_percentage: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub tenant_id: Option<Uuid>,
    pub items: Vec<CreateOrderItemRequest>,
    #[serde(default, with = "decimal_string::option")]
    pub taxes: Option<Decimal>,
    #[serde(default, with = "decimal_string::option")]
    pub shipping: Option<Decimal>,
    #[serde(default, with = "decimal_string::option")]
    pub discount: Option<Decimal>,
    pub shipping_address: Option<Value>,
    pub notes: Option<String>,
}

fn to_new_order(req: CreateOrderRequest) -> NewOrder {
    NewOrder {
        tenant_id: req.tenant_id,
        items: req
            .items
            .into_iter()
            .map(|i| NewOrderItem {
                product_id: i.product_id,
                quantity: i.quantity,
                price: i.price,
                custom_profit_percentage: i.custom_profit_percentage,
            })
            .collect(),
        taxes: req.taxes.unwrap_or_default(),
        shipping: req.shipping.unwrap_or_default(),
        discount: req.discount.unwrap_or_default(),
        shipping_address: req.shipping_address,
        notes: req.notes,
    }
}

pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderDetail>)> {
    let detail = orders::create_order(&state, &ctx, to_new_order(req)).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Default listing: admins see everything, tenant staff their sales,
/// customers their own orders.
pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Order>>> {
    let scope = if ctx.is_admin() {
        OrderScope::All
    } else if let Some(tenant_id) = ctx.tenant_id.filter(|t| ctx.is_staff_of(*t)) {
        OrderScope::SellingTenant(tenant_id)
    } else {
        OrderScope::Buyer(
            ctx.user_id()
                .ok_or_else(|| ApiError::Forbidden("no order scope on this principal".into()))?,
        )
    };
    let page = query.pagination();
    let filter = query.order_filter()?;
    Ok(Json(orders::list_orders(&state, scope, &filter, page).await?))
}

pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(orders::get_order(&state, &ctx, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    #[serde(default, with = "decimal_string::option")]
    pub taxes: Option<Decimal>,
    #[serde(default, with = "decimal_string::option")]
    pub shipping: Option<Decimal>,
    #[serde(default, with = "decimal_string::option")]
    pub discount: Option<Decimal>,
    pub notes: Option<String>,
    pub shipping_address: Option<Value>,
    pub status: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOrderRequest>,
) -> ApiResult<Json<OrderDetail>> {
    let input = UpdateOrder {
        taxes: req.taxes,
        shipping: req.shipping,
        discount: req.discount,
        notes: req.notes,
        shipping_address: req.shipping_address,
        status: req.status.as_deref().map(parse_order_status).transpose()?,
    };
    Ok(Json(orders::update_order(&state, &ctx, id, input).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReplaceItemsRequest {
    pub items: Vec<CreateOrderItemRequest>,
}

pub async fn replace_items(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplaceItemsRequest>,
) -> ApiResult<Json<OrderDetail>> {
    let items = req
        .items
        .into_iter()
        .map(|i| NewOrderItem {
            product_id: i.product_id,
            quantity: i.quantity,
            price: i.price,
            custom_profit_percentage: i.custom_profit_percentage,
        })
        .collect();
    Ok(Json(orders::replace_items(&state, &ctx, id, items).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub description: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<OrderDetail>> {
    let target = parse_order_status(&req.status)?;
    Ok(Json(
        orders::update_status(&state, &ctx, id, target, req.description).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmDeliveryRequest {
    pub feedback: Option<String>,
}

pub async fn confirm_delivery(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    body: Option<Json<ConfirmDeliveryRequest>>,
) -> ApiResult<Json<OrderDetail>> {
    let feedback = body.and_then(|Json(b)| b.feedback);
    Ok(Json(
        orders::confirm_delivery(&state, &ctx, id, feedback).await?,
    ))
}

pub async fn my_orders(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Order>>> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Forbidden("my-orders requires a user account".into()))?;
    let page = query.pagination();
    let filter = query.order_filter()?;
    Ok(Json(
        orders::list_orders(&state, OrderScope::Buyer(user_id), &filter, page).await?,
    ))
}

pub async fn tenant_sales(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Order>>> {
    let tenant_id = ctx.acting_tenant(query.tenant_id)?;
    ctx.require_staff_of(tenant_id)?;
    let page = query.pagination();
    let filter = query.order_filter()?;
    Ok(Json(
        orders::list_orders(&state, OrderScope::SellingTenant(tenant_id), &filter, page).await?,
    ))
}

pub async fn tenant_product_orders(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Order>>> {
    let tenant_id = ctx.acting_tenant(query.tenant_id)?;
    ctx.require_staff_of(tenant_id)?;
    let page = query.pagination();
    let filter = query.order_filter()?;
    Ok(Json(
        orders::list_orders(&state, OrderScope::ProductOwner(tenant_id), &filter, page).await?,
    ))
}

/// A tenant's full view of one customer: orders it sold to them plus
/// orders containing its products. Staff only.
pub async fn customer_orders(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Order>>> {
    let tenant_id = ctx.acting_tenant(query.tenant_id)?;
    ctx.require_staff_of(tenant_id)?;
    let customer_id = query
        .customer_id
        .ok_or_else(|| ApiError::Validation("customer_id is required".into()))?;
    let page = query.pagination();
    let filter = query.order_filter()?;
    let scope = OrderScope::Customer {
        tenant_id,
        customer_id,
    };
    Ok(Json(orders::list_orders(&state, scope, &filter, page).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub tenant_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn tenant_statistics(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<StatisticsQuery>,
) -> ApiResult<Json<TenantStatistics>> {
    let tenant_id = ctx.acting_tenant(query.tenant_id)?;
    let (start, end) =
        parse_date_range(query.start_date.as_deref(), query.end_date.as_deref())?;
    Ok(Json(
        orders::tenant_statistics(&state, &ctx, tenant_id, start, end).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ProductStatisticsQuery {
    pub product_id: Uuid,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn product_statistics(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ProductStatisticsQuery>,
) -> ApiResult<Json<ProductStatistics>> {
    let (start, end) =
        parse_date_range(query.start_date.as_deref(), query.end_date.as_deref())?;
    Ok(Json(
        orders::product_statistics(&state, &ctx, query.product_id, start, end).await?,
    ))
}
